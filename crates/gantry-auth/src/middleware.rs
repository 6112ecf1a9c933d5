//! Tower layers gating axum routes on authentication and authorization.
//!
//! # Purpose
//! Two layer families compose onto a `Router`:
//! - [`AuthenticationLayer`] extracts and validates the bearer token,
//!   attaching the resulting [`Identity`] to the request extensions.
//! - [`AuthorizationLayer`] reads that identity and enforces a requirement
//!   (permission, role, resource extractor, or custom predicate).
//!
//! Rejections are JSON bodies of the form `{"error": "<message>"}` with
//! status 401 (no usable identity) or 403 (identity present, requirement not
//! met). Validation failures collapse to a fixed message set so internal
//! details never reach the client.
use crate::engine::PermissionEngine;
use crate::errors::AuthError;
use crate::identity::Identity;
use crate::permission::Permission;
use crate::token::TokenValidator;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// How the authentication layer treats requests without a valid token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// No token work at all; requests pass through untouched.
    Public,
    /// A valid token is mandatory; failures are rejected with 401.
    Required,
    /// Identity is attached when a token validates; failures pass through
    /// without one.
    Optional,
}

#[derive(Clone)]
pub struct AuthenticationLayer {
    validator: Option<Arc<TokenValidator>>,
    mode: AuthMode,
}

impl AuthenticationLayer {
    pub fn required(validator: Arc<TokenValidator>) -> Self {
        Self {
            validator: Some(validator),
            mode: AuthMode::Required,
        }
    }

    pub fn optional(validator: Arc<TokenValidator>) -> Self {
        Self {
            validator: Some(validator),
            mode: AuthMode::Optional,
        }
    }

    pub fn public() -> Self {
        Self {
            validator: None,
            mode: AuthMode::Public,
        }
    }

    pub fn with_mode(validator: Arc<TokenValidator>, mode: AuthMode) -> Self {
        Self {
            validator: Some(validator),
            mode,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }
}

impl<S> Layer<S> for AuthenticationLayer {
    type Service = Authentication<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Authentication {
            inner,
            validator: self.validator.clone(),
            mode: self.mode,
        }
    }
}

#[derive(Clone)]
pub struct Authentication<S> {
    inner: S,
    validator: Option<Arc<TokenValidator>>,
    mode: AuthMode,
}

impl<S> Service<Request<Body>> for Authentication<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // The cloned service is the one placed back into self; the original,
        // already polled ready, does the work.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let validator = self.validator.clone();
        let mode = self.mode;
        Box::pin(async move {
            let validator = match (mode, validator) {
                (AuthMode::Public, _) => return inner.call(req).await,
                (_, Some(validator)) => validator,
                // Unreachable through the constructors; fail closed.
                (_, None) => {
                    return Ok(reject(StatusCode::UNAUTHORIZED, "authentication required"));
                }
            };
            let token = match extract_token(&req) {
                Some(token) => token,
                None => {
                    return match mode {
                        AuthMode::Required => {
                            Ok(reject(StatusCode::UNAUTHORIZED, "authentication required"))
                        }
                        _ => inner.call(req).await,
                    };
                }
            };
            match validator.validate(&token).await {
                Ok(identity) => {
                    req.extensions_mut().insert(identity);
                    inner.call(req).await
                }
                Err(err) => match mode {
                    AuthMode::Required => {
                        tracing::debug!(error = %err, "rejecting request");
                        Ok(reject(StatusCode::UNAUTHORIZED, rejection_message(&err)))
                    }
                    _ => inner.call(req).await,
                },
            }
        })
    }
}

/// Shared-state predicate over the request and the authenticated identity.
pub type AuthPredicate = Arc<dyn Fn(&Request<Body>, &Identity) -> bool + Send + Sync>;

/// Derives the resource segment of a permission check from the request,
/// typically from a path parameter or prefix.
pub type ResourceExtractor = Arc<dyn Fn(&Request<Body>) -> String + Send + Sync>;

#[derive(Clone)]
enum Requirement {
    Permission(Permission),
    AnyPermission(Vec<Permission>),
    AllPermissions(Vec<Permission>),
    Role(String),
    AnyRole(Vec<String>),
    Action {
        action: String,
        resource: ResourceExtractor,
    },
    Custom(AuthPredicate),
}

#[derive(Clone)]
pub struct AuthorizationLayer {
    engine: Arc<PermissionEngine>,
    requirement: Requirement,
}

impl AuthorizationLayer {
    pub fn permission(engine: Arc<PermissionEngine>, permission: Permission) -> Self {
        Self {
            engine,
            requirement: Requirement::Permission(permission),
        }
    }

    pub fn any_of_permissions(
        engine: Arc<PermissionEngine>,
        permissions: Vec<Permission>,
    ) -> Self {
        Self {
            engine,
            requirement: Requirement::AnyPermission(permissions),
        }
    }

    pub fn all_of_permissions(
        engine: Arc<PermissionEngine>,
        permissions: Vec<Permission>,
    ) -> Self {
        Self {
            engine,
            requirement: Requirement::AllPermissions(permissions),
        }
    }

    /// Inheritance-aware role requirement.
    pub fn role(engine: Arc<PermissionEngine>, role: impl Into<String>) -> Self {
        Self {
            engine,
            requirement: Requirement::Role(role.into()),
        }
    }

    pub fn any_of_roles(engine: Arc<PermissionEngine>, roles: Vec<String>) -> Self {
        Self {
            engine,
            requirement: Requirement::AnyRole(roles),
        }
    }

    /// Fixed action over a per-request resource.
    pub fn action(
        engine: Arc<PermissionEngine>,
        action: impl Into<String>,
        resource: ResourceExtractor,
    ) -> Self {
        Self {
            engine,
            requirement: Requirement::Action {
                action: action.into(),
                resource,
            },
        }
    }

    pub fn custom(engine: Arc<PermissionEngine>, predicate: AuthPredicate) -> Self {
        Self {
            engine,
            requirement: Requirement::Custom(predicate),
        }
    }
}

impl<S> Layer<S> for AuthorizationLayer {
    type Service = Authorization<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Authorization {
            inner,
            engine: self.engine.clone(),
            requirement: self.requirement.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Authorization<S> {
    inner: S,
    engine: Arc<PermissionEngine>,
    requirement: Requirement,
}

impl<S> Service<Request<Body>> for Authorization<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let engine = self.engine.clone();
        let requirement = self.requirement.clone();
        Box::pin(async move {
            let Some(identity) = req.extensions().get::<Identity>().cloned() else {
                return Ok(reject(StatusCode::UNAUTHORIZED, "authentication required"));
            };
            let identity = Some(&identity);
            let allowed = match &requirement {
                Requirement::Permission(permission) => {
                    engine.check_permission(identity, permission).await
                }
                Requirement::AnyPermission(permissions) => {
                    let mut allowed = false;
                    for permission in permissions {
                        if engine.check_permission(identity, permission).await {
                            allowed = true;
                            break;
                        }
                    }
                    allowed
                }
                Requirement::AllPermissions(permissions) => {
                    let mut allowed = true;
                    for permission in permissions {
                        if !engine.check_permission(identity, permission).await {
                            allowed = false;
                            break;
                        }
                    }
                    allowed
                }
                Requirement::Role(role) => engine.check_role(identity, role).await,
                Requirement::AnyRole(roles) => {
                    let mut allowed = false;
                    for role in roles {
                        if engine.check_role(identity, role).await {
                            allowed = true;
                            break;
                        }
                    }
                    allowed
                }
                Requirement::Action { action, resource } => {
                    let resource = resource(&req);
                    engine.check(identity, &resource, action).await
                }
                Requirement::Custom(predicate) => {
                    identity.map(|id| predicate(&req, id)).unwrap_or(false)
                }
            };
            if allowed {
                inner.call(req).await
            } else {
                Ok(reject(StatusCode::FORBIDDEN, "insufficient permissions"))
            }
        })
    }
}

/// The identity attached by the authentication layer, if any.
///
/// Handlers can equivalently take an `Extension<Identity>` extractor.
pub fn current_identity<B>(req: &Request<B>) -> Option<&Identity> {
    req.extensions().get::<Identity>()
}

/// Locate the bearer token: `Authorization: Bearer` header first, then the
/// `token` query parameter, then the `token` cookie.
pub fn extract_token<B>(req: &Request<B>) -> Option<String> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    if let Some(query) = req.uri().query() {
        for pair in query.split('&') {
            if let Some(token) = pair.strip_prefix("token=") {
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    for value in req.headers().get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        for cookie in value.split(';') {
            if let Some(token) = cookie.trim().strip_prefix("token=") {
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    None
}

fn rejection_message(err: &AuthError) -> &'static str {
    match err {
        AuthError::MissingToken => "authentication required",
        AuthError::ExpiredToken => "token expired",
        AuthError::InvalidIssuer => "invalid issuer",
        AuthError::InvalidAudience => "invalid audience",
        _ => "invalid token",
    }
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
}
