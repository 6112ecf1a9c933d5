//! Gantry authn/authz core shared by the control plane and API services.
//!
//! # Purpose
//! Centralizes bearer-token validation (symmetric secrets and JWKS-backed
//! RSA keys), RBAC permission resolution with role inheritance, and the tower
//! middleware that gates every API operation.
//!
//! # How it fits
//! Services build a [`TokenValidator`] and [`PermissionEngine`] (directly or
//! through the declarative [`AuthLoader`]) and attach the
//! [`AuthenticationLayer`]/[`AuthorizationLayer`] pairs to their routers.
//! Handlers read the validated [`Identity`] from the request extensions.
//!
//! # Key invariants
//! - Permission strings follow the `resource:action` pattern; `*` wildcards
//!   apply on the granting side only.
//! - Role inheritance graphs accepted by [`Policy`] are acyclic; resolution
//!   still terminates if a store is seeded with a cycle out-of-band.
//! - A request without a usable identity is rejected with 401, an identity
//!   failing a requirement with 403; bodies are `{"error": "<message>"}`.
//!
//! # Important configuration
//! - Issuer/audience values must match between token issuer and validator.
//! - JWKS endpoints must be reachable over HTTPS in declarative config.
//!
//! # Examples
//! ```rust
//! use gantry_auth::Permission;
//!
//! let held: Permission = "deployments:*".parse().unwrap();
//! assert!(held.matches(&Permission::new("deployments", "read")));
//! ```
//!
//! # Common pitfalls
//! - Mutating roles without calling `PermissionEngine::invalidate_cache`
//!   serves stale resolutions.
//! - Layer ordering matters: authorization layers must run after an
//!   authentication layer has attached the identity.

mod engine;
mod errors;
mod identity;
mod jwks;
mod keys;
mod loader;
mod middleware;
mod permission;
mod role;
mod store;
mod telemetry;
mod token;

pub use engine::PermissionEngine;
pub use errors::{AuthError, AuthResult, StoreError, StoreResult};
pub use identity::Identity;
pub use jwks::{Jwk, JwkSet, decoding_key_from_rsa};
pub use keys::KeyCache;
pub use loader::{
    AuthDeclarations, AuthLoader, AuthRegistry, LoaderError, MiddlewareDecl, MiddlewareEntry,
    MiddlewareKind, ProviderDecl, ProviderMethod, RoleDecl,
};
pub use middleware::{
    AuthMode, AuthPredicate, Authentication, AuthenticationLayer, Authorization,
    AuthorizationLayer, ResourceExtractor, current_identity, extract_token,
};
pub use permission::Permission;
pub use role::{Policy, Role, validate_role_name};
pub use store::{CachedRoleStore, MemoryRoleStore, RoleStore};
pub use telemetry::init_tracing;
pub use token::{TokenValidator, ValidatorConfig};
