//! Role definitions and the in-process policy collection.
//!
//! # Purpose
//! A `Role` bundles permissions with optional parent roles (inheritance).
//! `Policy` is the writable in-process collection of roles and the single
//! authoritative place where inheritance cycles are rejected; the read-time
//! resolver in the engine only tolerates cycles defensively.
//!
//! # Key invariants
//! - Role names are non-empty and contain no whitespace.
//! - Permission strings are `resource:action` with both segments non-empty.
//! - A role accepted by `Policy` is never its own (in)direct ancestor.
use crate::errors::{StoreError, StoreResult};
use crate::permission::Permission;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Named, inheritable bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: Vec::new(),
            parents: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_parents(mut self, parents: Vec<String>) -> Self {
        self.parents = parents;
        self
    }

    /// Build a validated role from raw permission strings.
    pub fn parse(
        name: impl Into<String>,
        permissions: &[String],
        parents: Vec<String>,
    ) -> StoreResult<Self> {
        let name = name.into();
        validate_role_name(&name)?;
        let mut parsed = Vec::with_capacity(permissions.len());
        for raw in permissions {
            parsed.push(raw.parse::<Permission>()?);
        }
        Ok(Self {
            name,
            permissions: parsed,
            parents,
        })
    }
}

pub fn validate_role_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(StoreError::InvalidRoleName(name.to_string()));
    }
    Ok(())
}

/// In-process collection of roles with write-time structural validation.
///
/// Not shared across threads; callers that need concurrent access seed a
/// `RoleStore` from the validated policy instead.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    roles: HashMap<String, Role>,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new role, rejecting duplicates, bad names, and cycles.
    pub fn add_role(&mut self, role: Role) -> StoreResult<()> {
        validate_role_name(&role.name)?;
        if self.roles.contains_key(&role.name) {
            return Err(StoreError::RoleAlreadyExists(role.name));
        }
        self.check_cycle(&role)?;
        self.roles.insert(role.name.clone(), role);
        Ok(())
    }

    /// Replace an existing role, re-validating the inheritance graph.
    pub fn update_role(&mut self, role: Role) -> StoreResult<()> {
        validate_role_name(&role.name)?;
        if !self.roles.contains_key(&role.name) {
            return Err(StoreError::RoleNotFound(role.name));
        }
        self.check_cycle(&role)?;
        self.roles.insert(role.name.clone(), role);
        Ok(())
    }

    pub fn remove_role(&mut self, name: &str) -> StoreResult<Role> {
        self.roles
            .remove(name)
            .ok_or_else(|| StoreError::RoleNotFound(name.to_string()))
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Depth-first walk of the candidate's ancestors; reaching the candidate
    /// itself means the write would introduce a cycle. The visited set keeps
    /// the walk terminating even if stored roles already form a cycle among
    /// themselves.
    fn check_cycle(&self, candidate: &Role) -> StoreResult<()> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = candidate.parents.iter().map(String::as_str).collect();
        while let Some(current) = stack.pop() {
            if current == candidate.name {
                return Err(StoreError::CyclicInheritance(candidate.name.clone()));
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(parent) = self.roles.get(current) {
                stack.extend(parent.parents.iter().map(String::as_str));
            }
        }
        Ok(())
    }
}
