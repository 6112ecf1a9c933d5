//! JWKS wire types and RSA key decoding.
//!
//! # Purpose
//! Mirrors the key-set endpoint contract: `{"keys": [{"kid","kty","alg",
//! "use","n","e"}, ...]}` where only `kty == "RSA"` entries are usable and
//! `n`/`e` are base64url (no padding) encoded big-endian integers.
//!
//! Unknown fields (EC curve parameters and the like) are ignored during
//! deserialization so a mixed key set still parses.
use crate::errors::{AuthError, AuthResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default, rename = "use")]
    pub use_field: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Decode an RSA JWK into a verification key.
///
/// Unlike the key cache's refresh path, which skips malformed entries, this
/// helper fails hard and names the field that was missing or invalid.
pub fn decoding_key_from_rsa(jwk: &Jwk) -> AuthResult<DecodingKey> {
    let n = jwk
        .n
        .as_deref()
        .ok_or_else(|| AuthError::InvalidJwk("missing modulus".to_string()))?;
    URL_SAFE_NO_PAD
        .decode(n)
        .map_err(|_| AuthError::InvalidJwk("invalid modulus".to_string()))?;
    let e = jwk
        .e
        .as_deref()
        .ok_or_else(|| AuthError::InvalidJwk("missing exponent".to_string()))?;
    URL_SAFE_NO_PAD
        .decode(e)
        .map_err(|_| AuthError::InvalidJwk("invalid exponent".to_string()))?;
    DecodingKey::from_rsa_components(n, e)
        .map_err(|err| AuthError::InvalidJwk(format!("rsa components: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_jwk(n: Option<&str>, e: Option<&str>) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: Some("k1".to_string()),
            alg: Some("RS256".to_string()),
            use_field: Some("sig".to_string()),
            n: n.map(str::to_string),
            e: e.map(str::to_string),
        }
    }

    #[test]
    fn jwks_roundtrip() {
        let jwks = JwkSet {
            keys: vec![rsa_jwk(Some("AQAB"), Some("AQAB"))],
        };
        let serialized = serde_json::to_string(&jwks).expect("serialize");
        let decoded: JwkSet = serde_json::from_str(&serialized).expect("deserialize");
        assert_eq!(decoded.keys.len(), 1);
        assert_eq!(decoded.keys[0].kid.as_deref(), Some("k1"));
    }

    #[test]
    fn tolerates_ec_entries() {
        let raw = r#"{"keys":[{"kty":"EC","kid":"ec1","crv":"P-256","x":"abc","y":"def"}]}"#;
        let decoded: JwkSet = serde_json::from_str(raw).expect("deserialize");
        assert_eq!(decoded.keys[0].kty, "EC");
        assert!(decoded.keys[0].n.is_none());
    }

    #[test]
    fn decode_fails_on_missing_modulus() {
        let err = decoding_key_from_rsa(&rsa_jwk(None, Some("AQAB"))).map(|_| ()).expect_err("missing n");
        assert!(matches!(err, AuthError::InvalidJwk(ref field) if field.contains("modulus")));
    }

    #[test]
    fn decode_fails_on_invalid_modulus() {
        let err =
            decoding_key_from_rsa(&rsa_jwk(Some("!!not-base64!!"), Some("AQAB"))).map(|_| ()).expect_err("bad n");
        assert!(matches!(err, AuthError::InvalidJwk(ref field) if field.contains("modulus")));
    }

    #[test]
    fn decode_fails_on_missing_exponent() {
        let err = decoding_key_from_rsa(&rsa_jwk(Some("AQAB"), None)).map(|_| ()).expect_err("missing e");
        assert!(matches!(err, AuthError::InvalidJwk(ref field) if field.contains("exponent")));
    }

    #[test]
    fn decode_fails_on_invalid_exponent() {
        let err =
            decoding_key_from_rsa(&rsa_jwk(Some("AQAB"), Some("%%%"))).map(|_| ()).expect_err("bad e");
        assert!(matches!(err, AuthError::InvalidJwk(ref field) if field.contains("exponent")));
    }
}
