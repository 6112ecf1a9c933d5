//! Declarative construction of validators, the engine, and middleware.
//!
//! # Purpose
//! Upstream tooling emits provider, role, and middleware declarations; this
//! module turns a batch of them into live objects: one [`TokenValidator`] per
//! provider, a shared [`PermissionEngine`] over a seeded role store, and named
//! middleware layers ready for router wiring. Declarations are plain serde
//! structs, so they load equally well from YAML files and embedded config.
//!
//! Requirements that need code (resource extractors, custom predicates) are
//! not declarable here; those layers are constructed directly against the
//! registry's engine.
use crate::engine::PermissionEngine;
use crate::errors::StoreError;
use crate::jwks::{Jwk, decoding_key_from_rsa};
use crate::middleware::{AuthMode, AuthenticationLayer, AuthorizationLayer};
use crate::permission::Permission;
use crate::role::{Policy, Role};
use crate::store::MemoryRoleStore;
use crate::token::{TokenValidator, ValidatorConfig};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("duplicate provider: {0}")]
    DuplicateProvider(String),
    #[error("duplicate role: {0}")]
    DuplicateRole(String),
    #[error("duplicate middleware: {0}")]
    DuplicateMiddleware(String),
    #[error("provider {0}: secret method requires a secret")]
    MissingSecret(String),
    #[error("provider {0}: jwks method requires a jwks_url")]
    MissingJwksUrl(String),
    #[error("provider {0}: jwks_url must use https")]
    InsecureJwksUrl(String),
    #[error("provider {name}: bad static key: {reason}")]
    InvalidStaticKey { name: String, reason: String },
    #[error("middleware {0}: unknown provider {1}")]
    UnknownProvider(String, String),
    #[error("middleware {name}: {reason}")]
    InvalidMiddleware { name: String, reason: String },
    #[error(transparent)]
    InvalidRole(#[from] StoreError),
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMethod {
    /// Symmetric secret, `HS*` tokens.
    Secret,
    /// Remote key set, `RS*` tokens.
    Jwks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDecl {
    pub name: String,
    pub method: ProviderMethod,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub jwks_url: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub roles_claim: Option<String>,
    #[serde(default)]
    pub permissions_claim: Option<String>,
    /// RSA keys pinned in configuration; entries without a `kid` become the
    /// provider's default key.
    #[serde(default)]
    pub static_keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDecl {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiddlewareKind {
    Authenticate,
    Authorize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareDecl {
    pub name: String,
    pub kind: MiddlewareKind,
    /// Provider the layer validates against; mandatory for `authenticate`.
    #[serde(default)]
    pub provider: Option<String>,
    /// `false` turns an `authenticate` layer into optional mode.
    #[serde(default = "default_required")]
    pub required: bool,
    /// Kind-specific settings: `permission`, `any_of`, `all_of`, `role`,
    /// `any_of_roles` for `authorize`.
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

fn default_required() -> bool {
    true
}

/// A full declaration batch, typically one configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthDeclarations {
    #[serde(default)]
    pub providers: Vec<ProviderDecl>,
    #[serde(default)]
    pub roles: Vec<RoleDecl>,
    #[serde(default)]
    pub middleware: Vec<MiddlewareDecl>,
}

impl AuthDeclarations {
    pub fn from_yaml(raw: &str) -> Result<Self, LoaderError> {
        Ok(serde_yaml::from_str(raw)?)
    }
}

/// A middleware declaration resolved into a live layer.
#[derive(Clone)]
pub enum MiddlewareEntry {
    Authentication(AuthenticationLayer),
    Authorization(AuthorizationLayer),
}

/// Everything a server needs to wire auth into its router.
pub struct AuthRegistry {
    validators: HashMap<String, Arc<TokenValidator>>,
    engine: Arc<PermissionEngine>,
    store: Arc<MemoryRoleStore>,
    middleware: HashMap<String, MiddlewareEntry>,
}

impl AuthRegistry {
    pub fn validator(&self, name: &str) -> Option<&Arc<TokenValidator>> {
        self.validators.get(name)
    }

    pub fn engine(&self) -> &Arc<PermissionEngine> {
        &self.engine
    }

    pub fn role_store(&self) -> &Arc<MemoryRoleStore> {
        &self.store
    }

    pub fn middleware(&self, name: &str) -> Option<&MiddlewareEntry> {
        self.middleware.get(name)
    }

    pub fn authentication(&self, name: &str) -> Option<AuthenticationLayer> {
        match self.middleware.get(name)? {
            MiddlewareEntry::Authentication(layer) => Some(layer.clone()),
            MiddlewareEntry::Authorization(_) => None,
        }
    }

    pub fn authorization(&self, name: &str) -> Option<AuthorizationLayer> {
        match self.middleware.get(name)? {
            MiddlewareEntry::Authorization(layer) => Some(layer.clone()),
            MiddlewareEntry::Authentication(_) => None,
        }
    }
}

#[derive(Default)]
pub struct AuthLoader;

impl AuthLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn load(&self, decls: AuthDeclarations) -> Result<AuthRegistry, LoaderError> {
        reject_duplicates(
            decls.providers.iter().map(|p| p.name.as_str()),
            LoaderError::DuplicateProvider,
        )?;
        reject_duplicates(
            decls.roles.iter().map(|r| r.name.as_str()),
            LoaderError::DuplicateRole,
        )?;
        reject_duplicates(
            decls.middleware.iter().map(|m| m.name.as_str()),
            LoaderError::DuplicateMiddleware,
        )?;

        // Roles pass through Policy so format and cycle validation happen
        // before anything is seeded.
        let mut policy = Policy::new();
        for decl in &decls.roles {
            let role = Role::parse(decl.name.clone(), &decl.permissions, decl.parents.clone())?;
            policy.add_role(role)?;
        }
        let store = Arc::new(MemoryRoleStore::from_policy(&policy));
        let store_for_engine: Arc<dyn crate::store::RoleStore> = store.clone();
        let engine = Arc::new(PermissionEngine::new(store_for_engine));

        let mut validators = HashMap::new();
        for decl in &decls.providers {
            let validator = build_validator(decl)?;
            validators.insert(decl.name.clone(), Arc::new(validator));
        }

        let mut middleware = HashMap::new();
        for decl in &decls.middleware {
            let entry = build_middleware(decl, &validators, &engine)?;
            middleware.insert(decl.name.clone(), entry);
        }

        tracing::info!(
            providers = validators.len(),
            roles = policy.len(),
            middleware = middleware.len(),
            "auth registry loaded"
        );
        Ok(AuthRegistry {
            validators,
            engine,
            store,
            middleware,
        })
    }
}

fn reject_duplicates<'a>(
    names: impl Iterator<Item = &'a str>,
    err: fn(String) -> LoaderError,
) -> Result<(), LoaderError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(err(name.to_string()));
        }
    }
    Ok(())
}

fn build_validator(decl: &ProviderDecl) -> Result<TokenValidator, LoaderError> {
    let mut config = match decl.method {
        ProviderMethod::Secret => {
            let secret = decl
                .secret
                .as_ref()
                .ok_or_else(|| LoaderError::MissingSecret(decl.name.clone()))?;
            ValidatorConfig::symmetric(secret.clone())
        }
        ProviderMethod::Jwks => {
            let url = decl
                .jwks_url
                .as_ref()
                .ok_or_else(|| LoaderError::MissingJwksUrl(decl.name.clone()))?;
            if !url.starts_with("https://") {
                return Err(LoaderError::InsecureJwksUrl(decl.name.clone()));
            }
            ValidatorConfig::jwks(url.clone())
        }
    };
    config.issuer = decl.issuer.clone();
    config.audience = decl.audience.clone();
    if let Some(claim) = &decl.roles_claim {
        config.roles_claim = claim.clone();
    }
    config.permissions_claim = decl.permissions_claim.clone();
    for jwk in &decl.static_keys {
        let key = decoding_key_from_rsa(jwk).map_err(|err| LoaderError::InvalidStaticKey {
            name: decl.name.clone(),
            reason: err.to_string(),
        })?;
        match &jwk.kid {
            Some(kid) => {
                config.static_keys.insert(kid.clone(), key);
            }
            None => config.default_key = Some(key),
        }
    }
    Ok(TokenValidator::new(config))
}

fn build_middleware(
    decl: &MiddlewareDecl,
    validators: &HashMap<String, Arc<TokenValidator>>,
    engine: &Arc<PermissionEngine>,
) -> Result<MiddlewareEntry, LoaderError> {
    match decl.kind {
        MiddlewareKind::Authenticate => {
            let provider = decl.provider.as_ref().ok_or_else(|| {
                LoaderError::InvalidMiddleware {
                    name: decl.name.clone(),
                    reason: "authenticate requires a provider".to_string(),
                }
            })?;
            let validator = validators.get(provider).ok_or_else(|| {
                LoaderError::UnknownProvider(decl.name.clone(), provider.clone())
            })?;
            let mode = if decl.required {
                AuthMode::Required
            } else {
                AuthMode::Optional
            };
            Ok(MiddlewareEntry::Authentication(
                AuthenticationLayer::with_mode(validator.clone(), mode),
            ))
        }
        MiddlewareKind::Authorize => {
            let layer = authorize_layer(decl, engine)?;
            Ok(MiddlewareEntry::Authorization(layer))
        }
    }
}

fn authorize_layer(
    decl: &MiddlewareDecl,
    engine: &Arc<PermissionEngine>,
) -> Result<AuthorizationLayer, LoaderError> {
    let invalid = |reason: &str| LoaderError::InvalidMiddleware {
        name: decl.name.clone(),
        reason: reason.to_string(),
    };
    if let Some(value) = decl.config.get("permission") {
        let raw = value.as_str().ok_or_else(|| invalid("permission must be a string"))?;
        let permission = parse_permission(decl, raw)?;
        return Ok(AuthorizationLayer::permission(engine.clone(), permission));
    }
    if let Some(value) = decl.config.get("any_of") {
        let permissions = permission_list(decl, value)?;
        return Ok(AuthorizationLayer::any_of_permissions(
            engine.clone(),
            permissions,
        ));
    }
    if let Some(value) = decl.config.get("all_of") {
        let permissions = permission_list(decl, value)?;
        return Ok(AuthorizationLayer::all_of_permissions(
            engine.clone(),
            permissions,
        ));
    }
    if let Some(value) = decl.config.get("role") {
        let role = value.as_str().ok_or_else(|| invalid("role must be a string"))?;
        return Ok(AuthorizationLayer::role(engine.clone(), role));
    }
    if let Some(value) = decl.config.get("any_of_roles") {
        let roles = value
            .as_array()
            .ok_or_else(|| invalid("any_of_roles must be a list"))?
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid("any_of_roles entries must be strings"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(AuthorizationLayer::any_of_roles(engine.clone(), roles));
    }
    Err(invalid(
        "authorize requires one of: permission, any_of, all_of, role, any_of_roles",
    ))
}

fn permission_list(
    decl: &MiddlewareDecl,
    value: &serde_json::Value,
) -> Result<Vec<Permission>, LoaderError> {
    let items = value
        .as_array()
        .ok_or_else(|| LoaderError::InvalidMiddleware {
            name: decl.name.clone(),
            reason: "permission lists must be arrays of strings".to_string(),
        })?;
    let mut permissions = Vec::with_capacity(items.len());
    for item in items {
        let raw = item.as_str().ok_or_else(|| LoaderError::InvalidMiddleware {
            name: decl.name.clone(),
            reason: "permission lists must be arrays of strings".to_string(),
        })?;
        permissions.push(parse_permission(decl, raw)?);
    }
    Ok(permissions)
}

fn parse_permission(decl: &MiddlewareDecl, raw: &str) -> Result<Permission, LoaderError> {
    raw.parse().map_err(|_| LoaderError::InvalidMiddleware {
        name: decl.name.clone(),
        reason: format!("bad permission string {raw:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use serde_json::json;

    const DECLARATIONS: &str = r#"
providers:
  - name: internal
    method: secret
    secret: s
    issuer: gantry-auth
roles:
  - name: viewer
    permissions: ["deployments:read", "configs:read"]
  - name: editor
    permissions: ["deployments:write"]
    parents: [viewer]
middleware:
  - name: api-auth
    kind: authenticate
    provider: internal
  - name: maybe-auth
    kind: authenticate
    provider: internal
    required: false
  - name: can-deploy
    kind: authorize
    config:
      permission: "deployments:write"
  - name: is-staff
    kind: authorize
    config:
      any_of_roles: [editor, viewer]
"#;

    fn identity(roles: &[&str]) -> Identity {
        Identity {
            subject: "u1".to_string(),
            email: String::new(),
            name: String::new(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            permissions: vec![],
            claims: serde_json::Map::new(),
            token: String::new(),
            expires_at: 0,
        }
    }

    #[tokio::test]
    async fn load_full_declaration_batch() {
        let decls = AuthDeclarations::from_yaml(DECLARATIONS).expect("parse yaml");
        let registry = AuthLoader::new().load(decls).expect("load");

        assert!(registry.validator("internal").is_some());
        assert!(registry.validator("ghost").is_none());
        assert!(registry.authentication("api-auth").is_some());
        assert!(registry.authentication("maybe-auth").is_some());
        assert!(registry.authorization("can-deploy").is_some());
        assert!(registry.authorization("is-staff").is_some());
        // Kind mismatch resolves to nothing.
        assert!(registry.authorization("api-auth").is_none());
        assert_eq!(registry.role_store().len().await, 2);

        let editor = identity(&["editor"]);
        assert!(registry.engine().check(Some(&editor), "configs", "read").await);
    }

    #[test]
    fn authenticate_modes_follow_required_flag() {
        let decls = AuthDeclarations::from_yaml(DECLARATIONS).expect("parse yaml");
        let registry = AuthLoader::new().load(decls).expect("load");
        assert_eq!(
            registry.authentication("api-auth").expect("layer").mode(),
            AuthMode::Required
        );
        assert_eq!(
            registry.authentication("maybe-auth").expect("layer").mode(),
            AuthMode::Optional
        );
    }

    #[test]
    fn duplicate_names_rejected_per_category() {
        let decls = AuthDeclarations {
            providers: vec![],
            roles: vec![
                RoleDecl {
                    name: "viewer".to_string(),
                    permissions: vec![],
                    parents: vec![],
                },
                RoleDecl {
                    name: "viewer".to_string(),
                    permissions: vec![],
                    parents: vec![],
                },
            ],
            middleware: vec![],
        };
        let err = AuthLoader::new().load(decls).map(|_| ()).expect_err("duplicate role");
        assert!(matches!(err, LoaderError::DuplicateRole(_)));
    }

    #[test]
    fn role_cycles_rejected() {
        let raw = r#"
roles:
  - name: a
    parents: [b]
  - name: b
    parents: [a]
"#;
        let decls = AuthDeclarations::from_yaml(raw).expect("parse yaml");
        let err = AuthLoader::new().load(decls).map(|_| ()).expect_err("cycle");
        assert!(matches!(
            err,
            LoaderError::InvalidRole(StoreError::CyclicInheritance(_))
        ));
    }

    #[test]
    fn bad_permission_strings_rejected() {
        let raw = r#"
roles:
  - name: viewer
    permissions: ["no-separator"]
"#;
        let decls = AuthDeclarations::from_yaml(raw).expect("parse yaml");
        let err = AuthLoader::new().load(decls).map(|_| ()).expect_err("bad permission");
        assert!(matches!(
            err,
            LoaderError::InvalidRole(StoreError::InvalidPermission(_))
        ));
    }

    #[test]
    fn secret_provider_requires_secret() {
        let decls = AuthDeclarations {
            providers: vec![ProviderDecl {
                name: "internal".to_string(),
                method: ProviderMethod::Secret,
                secret: None,
                jwks_url: None,
                issuer: None,
                audience: None,
                roles_claim: None,
                permissions_claim: None,
                static_keys: vec![],
            }],
            roles: vec![],
            middleware: vec![],
        };
        let err = AuthLoader::new().load(decls).map(|_| ()).expect_err("no secret");
        assert!(matches!(err, LoaderError::MissingSecret(_)));
    }

    #[test]
    fn jwks_provider_requires_https() {
        let raw = r#"
providers:
  - name: sso
    method: jwks
    jwks_url: "http://idp.internal/jwks"
"#;
        let decls = AuthDeclarations::from_yaml(raw).expect("parse yaml");
        let err = AuthLoader::new().load(decls).map(|_| ()).expect_err("insecure url");
        assert!(matches!(err, LoaderError::InsecureJwksUrl(_)));
    }

    #[test]
    fn middleware_with_unknown_provider_rejected() {
        let raw = r#"
middleware:
  - name: api-auth
    kind: authenticate
    provider: ghost
"#;
        let decls = AuthDeclarations::from_yaml(raw).expect("parse yaml");
        let err = AuthLoader::new().load(decls).map(|_| ()).expect_err("unknown provider");
        assert!(matches!(err, LoaderError::UnknownProvider(_, _)));
    }

    #[test]
    fn authorize_requires_a_requirement() {
        let decls = AuthDeclarations {
            providers: vec![],
            roles: vec![],
            middleware: vec![MiddlewareDecl {
                name: "broken".to_string(),
                kind: MiddlewareKind::Authorize,
                provider: None,
                required: true,
                config: HashMap::from([("unrelated".to_string(), json!(true))]),
            }],
        };
        let err = AuthLoader::new().load(decls).map(|_| ()).expect_err("no requirement");
        assert!(matches!(err, LoaderError::InvalidMiddleware { .. }));
    }
}
