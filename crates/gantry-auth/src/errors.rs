use thiserror::Error;

/// Token validation and key resolution failures.
///
/// The middleware layer maps a fixed subset of these (expired, issuer,
/// audience) to distinct client-facing messages and collapses the rest into a
/// generic "invalid token" response so transport details never leak.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    ExpiredToken,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("no signing secret configured")]
    NoSecretConfigured,
    #[error("no public key configured")]
    NoPublicKeyConfigured,
    #[error("jwks fetch failed: {0}")]
    JwksFetchFailed(String),
    #[error("jwks decode failed: {0}")]
    JwksDecodeFailed(String),
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("invalid jwk: {0}")]
    InvalidJwk(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Role definition and storage failures.
///
/// Validation errors are returned to the caller attempting the write and must
/// prevent any partial mutation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("role not found: {0}")]
    RoleNotFound(String),
    #[error("role already exists: {0}")]
    RoleAlreadyExists(String),
    #[error("invalid role name: {0:?}")]
    InvalidRoleName(String),
    #[error("invalid permission: {0}")]
    InvalidPermission(String),
    #[error("cyclic role inheritance involving {0}")]
    CyclicInheritance(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
