//! Permission resolution over the role inheritance graph.
//!
//! # Purpose
//! `PermissionEngine` answers "may this identity do X" by combining the
//! identity's direct permission claims with the permissions reachable through
//! its roles and their ancestors.
//!
//! # Caching
//! Resolved per-role permission sets are memoized by role name. The cache is
//! a plain read-write lock around a map; concurrent first resolutions of the
//! same role may duplicate work, and the last writer wins. Callers that
//! mutate role definitions must call [`PermissionEngine::invalidate_cache`].
//!
//! # Cycles
//! Stored role graphs are normally acyclic (the policy layer rejects cycles
//! at write time), but resolution still terminates on a cyclic graph: a
//! per-call seen set truncates the walk at the first repeated role and a
//! warning is logged. Each role in the cycle still contributes its own
//! directly attached permissions.
use crate::identity::Identity;
use crate::permission::Permission;
use crate::store::RoleStore;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

pub struct PermissionEngine {
    store: Arc<dyn RoleStore>,
    cache: RwLock<HashMap<String, Vec<Permission>>>,
}

impl PermissionEngine {
    pub fn new(store: Arc<dyn RoleStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the identity holds a permission granting `target`.
    ///
    /// Direct permission claims are scanned first (unparseable entries are
    /// skipped), then the resolved permissions of each declared role. `None`
    /// is never authorized.
    pub async fn check_permission(
        &self,
        identity: Option<&Identity>,
        target: &Permission,
    ) -> bool {
        let Some(identity) = identity else {
            return false;
        };
        for raw in &identity.permissions {
            if let Ok(held) = raw.parse::<Permission>() {
                if held.matches(target) {
                    return true;
                }
            }
        }
        for role in &identity.roles {
            let mut seen = HashSet::new();
            let resolved = self.resolve_role(role, &mut seen).await;
            if resolved.iter().any(|held| held.matches(target)) {
                return true;
            }
        }
        false
    }

    /// Convenience form of [`check_permission`](Self::check_permission) for a
    /// resource/action pair.
    pub async fn check(
        &self,
        identity: Option<&Identity>,
        resource: &str,
        action: &str,
    ) -> bool {
        self.check_permission(identity, &Permission::new(resource, action))
            .await
    }

    /// Whether the identity holds `target` directly or through inheritance.
    ///
    /// Walks the parent graph with one store lookup per distinct role; a
    /// lookup failure terminates that branch without failing the check.
    pub async fn check_role(&self, identity: Option<&Identity>, target: &str) -> bool {
        let Some(identity) = identity else {
            return false;
        };
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = identity.roles.clone();
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if current == target {
                return true;
            }
            if let Ok(role) = self.store.get_role(&current).await {
                stack.extend(role.parents.iter().cloned());
            }
        }
        false
    }

    /// Every permission string the identity effectively holds, in first-seen
    /// order, deduplicated by exact string. Direct claims come before
    /// role-derived permissions.
    pub async fn user_permissions(&self, identity: Option<&Identity>) -> Vec<String> {
        let Some(identity) = identity else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut emitted: HashSet<String> = HashSet::new();
        for raw in &identity.permissions {
            if emitted.insert(raw.clone()) {
                out.push(raw.clone());
            }
        }
        for role in &identity.roles {
            let mut seen = HashSet::new();
            for permission in self.resolve_role(role, &mut seen).await {
                let raw = permission.as_string();
                if emitted.insert(raw.clone()) {
                    out.push(raw);
                }
            }
        }
        out
    }

    /// The inheritance closure of the identity's declared roles, in
    /// first-seen order. Roles the store cannot resolve are kept in the
    /// result but not expanded.
    pub async fn user_roles(&self, identity: Option<&Identity>) -> Vec<String> {
        let Some(identity) = identity else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = identity.roles.iter().cloned().collect();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Ok(role) = self.store.get_role(&current).await {
                queue.extend(role.parents.iter().cloned());
            }
            out.push(current);
        }
        out
    }

    /// Drop every memoized resolution. Must be called after role mutations.
    pub fn invalidate_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn cached(&self, name: &str) -> Option<Vec<Permission>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Resolve a role's effective permissions, parents included.
    ///
    /// The memo cache is consulted before the seen set so a role already
    /// resolved in an earlier call is never mistaken for a cycle. The guard
    /// is dropped before any await point.
    fn resolve_role<'a>(
        &'a self,
        name: &'a str,
        seen: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Vec<Permission>> {
        Box::pin(async move {
            if let Some(cached) = self.cached(name) {
                return cached;
            }
            if !seen.insert(name.to_string()) {
                tracing::warn!(role = %name, "role inheritance cycle; truncating resolution");
                return Vec::new();
            }
            let role = match self.store.get_role(name).await {
                Ok(role) => role,
                Err(err) => {
                    tracing::debug!(role = %name, error = %err, "role lookup failed during resolution");
                    return Vec::new();
                }
            };
            let mut permissions = role.permissions.clone();
            for parent in &role.parents {
                for inherited in self.resolve_role(parent, seen).await {
                    if !permissions.contains(&inherited) {
                        permissions.push(inherited);
                    }
                }
            }
            self.cache
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(name.to_string(), permissions.clone());
            permissions
        })
    }
}
