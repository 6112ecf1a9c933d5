//! Role storage: the async store trait, the in-memory store, and a TTL cache
//! decorator.
//!
//! # Purpose
//! `RoleStore` is the seam between the permission engine and wherever role
//! definitions actually live. `MemoryRoleStore` is the reference
//! implementation backing tests and the declarative loader;
//! `CachedRoleStore` wraps any store with per-role TTL caching for deployments
//! where the backend is remote.
use crate::errors::{StoreError, StoreResult};
use crate::role::{Policy, Role, validate_role_name};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_role(&self, name: &str) -> StoreResult<Role>;
    async fn list_roles(&self) -> StoreResult<Vec<Role>>;
    async fn save_role(&self, role: Role) -> StoreResult<()>;
    async fn delete_role(&self, name: &str) -> StoreResult<()>;
}

/// In-memory role store.
///
/// Values are cloned on the way in and out so callers can never alias the
/// stored definitions.
#[derive(Default)]
pub struct MemoryRoleStore {
    roles: RwLock<HashMap<String, Role>>,
}

impl MemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from an already-validated policy.
    pub fn from_policy(policy: &Policy) -> Self {
        let roles = policy
            .roles()
            .map(|role| (role.name.clone(), role.clone()))
            .collect();
        Self {
            roles: RwLock::new(roles),
        }
    }

    pub async fn len(&self) -> usize {
        self.roles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.roles.read().await.is_empty()
    }
}

fn validate_role(role: &Role) -> StoreResult<()> {
    validate_role_name(&role.name)?;
    for permission in &role.permissions {
        if permission.resource.is_empty() || permission.action.is_empty() {
            return Err(StoreError::InvalidPermission(permission.as_string()));
        }
    }
    Ok(())
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn get_role(&self, name: &str) -> StoreResult<Role> {
        self.roles
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::RoleNotFound(name.to_string()))
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        Ok(self.roles.read().await.values().cloned().collect())
    }

    /// Upsert; validation runs before the write lock is taken so a bad role
    /// never mutates the map.
    async fn save_role(&self, role: Role) -> StoreResult<()> {
        validate_role(&role)?;
        self.roles.write().await.insert(role.name.clone(), role);
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> StoreResult<()> {
        self.roles
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::RoleNotFound(name.to_string()))
    }
}

struct CachedRole {
    role: Role,
    expires_at: Instant,
}

/// TTL cache in front of another store.
///
/// Each role carries its own expiry. Writes and deletes go to the backend
/// first and evict the cached entry afterwards, so a failed backend write
/// never leaves a phantom entry in the cache.
pub struct CachedRoleStore<S> {
    inner: Arc<S>,
    ttl: Duration,
    entries: DashMap<String, CachedRole>,
}

impl<S: RoleStore> CachedRoleStore<S> {
    pub fn new(inner: Arc<S>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn invalidate(&self, name: &str) {
        self.entries.remove(name);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl<S: RoleStore> RoleStore for CachedRoleStore<S> {
    async fn get_role(&self, name: &str) -> StoreResult<Role> {
        if let Some(entry) = self.entries.get(name) {
            if entry.expires_at > Instant::now() {
                return Ok(entry.role.clone());
            }
        }
        let role = self.inner.get_role(name).await?;
        self.entries.insert(
            name.to_string(),
            CachedRole {
                role: role.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(role)
    }

    /// Listing always hits the backend; the cache only serves point lookups.
    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        self.inner.list_roles().await
    }

    async fn save_role(&self, role: Role) -> StoreResult<()> {
        let name = role.name.clone();
        self.inner.save_role(role).await?;
        self.entries.remove(&name);
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> StoreResult<()> {
        self.inner.delete_role(name).await?;
        self.entries.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::Permission;

    fn viewer() -> Role {
        Role::new("viewer").with_permissions(vec![Permission::new("configs", "read")])
    }

    #[tokio::test]
    async fn save_and_get_roundtrip() {
        let store = MemoryRoleStore::new();
        store.save_role(viewer()).await.expect("save");
        let fetched = store.get_role("viewer").await.expect("get");
        assert_eq!(fetched, viewer());
    }

    #[tokio::test]
    async fn get_returns_a_copy() {
        let store = MemoryRoleStore::new();
        store.save_role(viewer()).await.expect("save");
        let mut fetched = store.get_role("viewer").await.expect("get");
        fetched.permissions.push(Permission::new("configs", "write"));
        let again = store.get_role("viewer").await.expect("get again");
        assert_eq!(again.permissions.len(), 1);
    }

    #[tokio::test]
    async fn get_unknown_role() {
        let store = MemoryRoleStore::new();
        let err = store.get_role("ghost").await.expect_err("missing");
        assert!(matches!(err, StoreError::RoleNotFound(_)));
    }

    #[tokio::test]
    async fn save_rejects_invalid_name() {
        let store = MemoryRoleStore::new();
        let err = store
            .save_role(Role::new("bad name"))
            .await
            .expect_err("whitespace name");
        assert!(matches!(err, StoreError::InvalidRoleName(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn save_rejects_empty_permission_segment() {
        let store = MemoryRoleStore::new();
        let role = Role::new("viewer").with_permissions(vec![Permission::new("", "read")]);
        let err = store.save_role(role).await.expect_err("empty resource");
        assert!(matches!(err, StoreError::InvalidPermission(_)));
    }

    #[tokio::test]
    async fn save_is_upsert() {
        let store = MemoryRoleStore::new();
        store.save_role(viewer()).await.expect("save");
        let updated =
            Role::new("viewer").with_permissions(vec![Permission::new("configs", "write")]);
        store.save_role(updated.clone()).await.expect("resave");
        assert_eq!(store.get_role("viewer").await.expect("get"), updated);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn delete_role() {
        let store = MemoryRoleStore::new();
        store.save_role(viewer()).await.expect("save");
        store.delete_role("viewer").await.expect("delete");
        let err = store.delete_role("viewer").await.expect_err("already gone");
        assert!(matches!(err, StoreError::RoleNotFound(_)));
    }

    #[tokio::test]
    async fn from_policy_seeds_roles() {
        let mut policy = Policy::new();
        policy.add_role(viewer()).expect("add viewer");
        policy.add_role(Role::new("editor")).expect("add editor");
        let store = MemoryRoleStore::from_policy(&policy);
        assert_eq!(store.len().await, 2);
        store.get_role("viewer").await.expect("viewer seeded");
    }

    #[tokio::test]
    async fn cached_store_serves_from_cache_within_ttl() {
        let inner = Arc::new(MemoryRoleStore::new());
        inner.save_role(viewer()).await.expect("save");
        let cached = CachedRoleStore::new(inner.clone(), Duration::from_secs(60));
        cached.get_role("viewer").await.expect("prime cache");

        // Mutate the backend behind the cache's back; the stale copy should
        // still be served until eviction.
        inner.delete_role("viewer").await.expect("delete behind");
        cached.get_role("viewer").await.expect("still cached");
        cached.invalidate("viewer");
        let err = cached.get_role("viewer").await.expect_err("cache evicted");
        assert!(matches!(err, StoreError::RoleNotFound(_)));
    }

    #[tokio::test]
    async fn cached_store_expires_entries() {
        let inner = Arc::new(MemoryRoleStore::new());
        inner.save_role(viewer()).await.expect("save");
        let cached = CachedRoleStore::new(inner.clone(), Duration::from_millis(10));
        cached.get_role("viewer").await.expect("prime cache");
        inner.delete_role("viewer").await.expect("delete behind");
        tokio::time::sleep(Duration::from_millis(30)).await;
        let err = cached.get_role("viewer").await.expect_err("entry expired");
        assert!(matches!(err, StoreError::RoleNotFound(_)));
    }

    #[tokio::test]
    async fn cached_store_write_evicts() {
        let inner = Arc::new(MemoryRoleStore::new());
        inner.save_role(viewer()).await.expect("save");
        let cached = CachedRoleStore::new(inner.clone(), Duration::from_secs(60));
        cached.get_role("viewer").await.expect("prime cache");

        let updated =
            Role::new("viewer").with_permissions(vec![Permission::new("configs", "write")]);
        cached.save_role(updated.clone()).await.expect("save through");
        assert_eq!(cached.get_role("viewer").await.expect("get"), updated);
    }

    #[tokio::test]
    async fn cached_store_delete_evicts() {
        let inner = Arc::new(MemoryRoleStore::new());
        inner.save_role(viewer()).await.expect("save");
        let cached = CachedRoleStore::new(inner.clone(), Duration::from_secs(60));
        cached.get_role("viewer").await.expect("prime cache");
        cached.delete_role("viewer").await.expect("delete");
        let err = cached.get_role("viewer").await.expect_err("gone");
        assert!(matches!(err, StoreError::RoleNotFound(_)));
    }
}
