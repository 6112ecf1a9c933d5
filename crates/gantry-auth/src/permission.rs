//! Permission value type and wildcard matching.
//!
//! # Purpose
//! Defines the `resource:action` capability string used throughout the auth
//! core. Either segment may be the wildcard `*`.
//!
//! # Key invariants
//! - Permission strings are `resource:action` with both segments non-empty.
//! - Matching is a pure function; permissions are immutable values.
use crate::errors::StoreError;
use serde::{Deserialize, Serialize};

/// Capability granting an action on a resource.
///
/// A permission with `*` in either segment acts as a grant over every value
/// of that segment: `deployments:*` covers all actions on deployments, and
/// `*:read` covers reading any resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub action: String,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Whether this permission grants the target.
    ///
    /// Wildcards apply on the granting side only: `*:read` grants
    /// `configs:read`, but holding `configs:read` does not satisfy a check
    /// for `*:read`.
    pub fn matches(&self, target: &Permission) -> bool {
        (self.resource == target.resource || self.resource == "*")
            && (self.action == target.action || self.action == "*")
    }

    pub fn as_string(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }
}

impl std::str::FromStr for Permission {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (resource, action) = value
            .split_once(':')
            .ok_or_else(|| StoreError::InvalidPermission(value.to_string()))?;
        if resource.is_empty() || action.is_empty() {
            return Err(StoreError::InvalidPermission(value.to_string()));
        }
        Ok(Self::new(resource, action))
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        let parsed: Permission = "deployments:read".parse().expect("parse permission");
        assert_eq!(parsed.resource, "deployments");
        assert_eq!(parsed.action, "read");
        assert_eq!(parsed.to_string(), "deployments:read");
    }

    #[test]
    fn parse_rejects_missing_separator() {
        let err = "deployments".parse::<Permission>().expect_err("no colon");
        assert!(matches!(err, StoreError::InvalidPermission(_)));
    }

    #[test]
    fn parse_rejects_empty_segments() {
        assert!(":read".parse::<Permission>().is_err());
        assert!("deployments:".parse::<Permission>().is_err());
        assert!(":".parse::<Permission>().is_err());
    }

    #[test]
    fn exact_match() {
        let held = Permission::new("configs", "read");
        assert!(held.matches(&Permission::new("configs", "read")));
        assert!(!held.matches(&Permission::new("configs", "write")));
        assert!(!held.matches(&Permission::new("deployments", "read")));
    }

    #[test]
    fn wildcard_resource() {
        let held = Permission::new("*", "read");
        assert!(held.matches(&Permission::new("anything", "read")));
        assert!(!held.matches(&Permission::new("anything", "write")));
    }

    #[test]
    fn wildcard_action() {
        let held = Permission::new("deployments", "*");
        assert!(held.matches(&Permission::new("deployments", "delete")));
        assert!(!held.matches(&Permission::new("configs", "delete")));
    }

    #[test]
    fn full_wildcard() {
        let held = Permission::new("*", "*");
        assert!(held.matches(&Permission::new("executions", "cancel")));
    }

    #[test]
    fn wildcard_is_not_symmetric() {
        let held = Permission::new("configs", "read");
        assert!(!held.matches(&Permission::new("*", "read")));
    }
}
