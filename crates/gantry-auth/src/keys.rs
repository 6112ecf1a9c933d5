//! Remote key-set cache with TTL-driven background refresh.
//!
//! # Purpose
//! Fetches asymmetric verification keys from a JWKS endpoint and caches them
//! by key identifier. The token validator consults this cache when resolving
//! `RS*` tokens; a miss triggers a synchronous refresh before giving up.
//!
//! # Concurrency model
//! The key map and last-refresh timestamp live behind a single read-write
//! lock. The HTTP fetch itself runs unlocked, so concurrent refreshes may
//! both fetch; the last writer wins the map swap, which is acceptable since a
//! JWKS response is idempotent data. A refresh failure leaves the previous
//! key set intact.
use crate::errors::{AuthError, AuthResult};
use crate::jwks::{JwkSet, decoding_key_from_rsa};
use jsonwebtoken::DecodingKey;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

struct CacheState {
    keys: HashMap<String, DecodingKey>,
    last_refresh: Option<Instant>,
}

pub struct KeyCache {
    client: reqwest::Client,
    jwks_url: String,
    fetch_timeout: Duration,
    state: RwLock<CacheState>,
}

impl KeyCache {
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self::with_fetch_timeout(jwks_url, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_fetch_timeout(jwks_url: impl Into<String>, fetch_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            jwks_url: jwks_url.into(),
            fetch_timeout,
            state: RwLock::new(CacheState {
                keys: HashMap::new(),
                last_refresh: None,
            }),
        }
    }

    /// Look up a verification key, refreshing the cache on a miss.
    pub async fn get_key(&self, kid: &str) -> AuthResult<DecodingKey> {
        if let Some(key) = self.state.read().await.keys.get(kid) {
            return Ok(key.clone());
        }
        self.refresh().await?;
        self.state
            .read()
            .await
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))
    }

    /// Non-triggering lookup; never fetches.
    pub async fn key_by_id(&self, kid: &str) -> Option<DecodingKey> {
        self.state.read().await.keys.get(kid).cloned()
    }

    pub async fn key_count(&self) -> usize {
        self.state.read().await.keys.len()
    }

    pub async fn last_refresh(&self) -> Option<Instant> {
        self.state.read().await.last_refresh
    }

    /// Fetch the key set and atomically replace the cached map.
    ///
    /// Non-RSA entries and individually malformed entries are skipped, not
    /// fatal: a partially-bad response still yields whatever valid keys it
    /// contains.
    pub async fn refresh(&self) -> AuthResult<()> {
        let response = self
            .client
            .get(&self.jwks_url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|err| AuthError::JwksFetchFailed(err.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::JwksFetchFailed(format!(
                "unexpected status {}",
                response.status()
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| AuthError::JwksFetchFailed(err.to_string()))?;
        let jwks: JwkSet = serde_json::from_slice(&body)
            .map_err(|err| AuthError::JwksDecodeFailed(err.to_string()))?;

        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for jwk in &jwks.keys {
            if jwk.kty != "RSA" {
                tracing::debug!(kty = %jwk.kty, kid = ?jwk.kid, "skipping non-RSA jwk");
                continue;
            }
            let Some(kid) = jwk.kid.clone() else {
                tracing::debug!("skipping RSA jwk without kid");
                continue;
            };
            match decoding_key_from_rsa(jwk) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(err) => {
                    tracing::warn!(kid = %kid, error = %err, "skipping malformed jwk");
                }
            }
        }

        let mut state = self.state.write().await;
        state.keys = keys;
        state.last_refresh = Some(Instant::now());
        Ok(())
    }

    /// Periodic refresh loop. Failures are logged, never propagated; a stale
    /// key set is preferable to an unavailable one. Exits promptly when the
    /// shutdown future resolves.
    pub async fn run_refresh_loop(
        &self,
        interval: Duration,
        shutdown: impl Future<Output = ()> + Send,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::debug!(url = %self.jwks_url, "jwks refresh loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.refresh().await {
                        tracing::warn!(url = %self.jwks_url, error = %err, "jwks refresh failed; keeping previous keys");
                    }
                }
            }
        }
    }
}
