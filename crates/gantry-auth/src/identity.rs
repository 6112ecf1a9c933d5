//! Authenticated principal and claim decoding helpers.
//!
//! # Purpose
//! `Identity` is the immutable result of a successful token validation. It is
//! created once per validated token, cloned into the request extensions, and
//! never persisted.
use chrono::Utc;
use serde_json::{Map, Value};

/// The authenticated principal derived from a validated token.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Subject identifier (`sub` claim); empty when absent.
    pub subject: String,
    /// Best-effort `email` claim; empty when absent.
    pub email: String,
    /// Best-effort `name` claim; empty when absent.
    pub name: String,
    /// Role names carried by the configured roles claim.
    pub roles: Vec<String>,
    /// Directly granted permission strings from the configured claim.
    pub permissions: Vec<String>,
    /// The full verified claim set.
    pub claims: Map<String, Value>,
    /// The raw token string the identity was derived from.
    pub token: String,
    /// Expiry (`exp` claim) as unix seconds.
    pub expires_at: i64,
}

impl Identity {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now().timestamp()
    }
}

/// Best-effort string claim lookup; wrong-typed or absent claims yield an
/// empty string, never an error.
pub(crate) fn string_claim(claims: &Map<String, Value>, name: &str) -> String {
    claims
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Decode a roles/permissions claim into a string list.
///
/// Three shapes are accepted: a list of strings, a mixed-type list (non-string
/// entries silently dropped), or a single space-separated string. Anything
/// else yields an empty list.
pub(crate) fn string_list_claim(claims: &Map<String, Value>, name: &str) -> Vec<String> {
    match claims.get(name) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(joined)) => joined.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}
