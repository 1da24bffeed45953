use std::sync::Arc;

use reqwest::header::{CACHE_CONTROL, HeaderMap};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

const MIN_CACHE_CONTROL_TTL_SECONDS: u64 = 60;
const MAX_CACHE_CONTROL_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct ClerkJwksCacheConfig {
    pub default_ttl_seconds: u64,
    pub stale_ttl_seconds: u64,
}

/// Process-local JWKS cache shared by every request.
///
/// Fresh entries are served without a network call. Once an entry expires a
/// single refresh runs; concurrent callers wait on it instead of fetching
/// again. If the refresh fails, an entry still inside its stale window is
/// served instead.
#[derive(Clone)]
pub struct ClerkJwksCache {
    config: ClerkJwksCacheConfig,
    entry: Arc<RwLock<Option<CachedJwksEntry>>>,
    refresh_lock: Arc<Mutex<()>>,
}

#[derive(Debug)]
pub(super) enum ClerkJwksCacheError {
    UnknownKeyId,
    UpstreamUnavailable,
}

#[derive(Debug, Clone)]
struct CachedJwksEntry {
    jwks_json: String,
    key_ids: Vec<String>,
    expires_at: i64,
    stale_until: i64,
}

impl CachedJwksEntry {
    fn has_key(&self, key_id: &str) -> bool {
        self.key_ids.iter().any(|kid| kid == key_id)
    }
}

#[derive(Debug, Deserialize)]
struct JwksEnvelope {
    #[serde(default)]
    keys: Vec<JwksKey>,
}

#[derive(Debug, Deserialize)]
struct JwksKey {
    kid: String,
}

impl ClerkJwksCache {
    pub fn new(config: ClerkJwksCacheConfig) -> Result<Self, String> {
        if config.default_ttl_seconds == 0 {
            return Err("clerk jwks cache default ttl must be greater than 0".to_string());
        }
        if config.stale_ttl_seconds == 0 {
            return Err("clerk jwks cache stale ttl must be greater than 0".to_string());
        }

        Ok(Self {
            config,
            entry: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    pub(super) async fn load_jwks_for_key(
        &self,
        http_client: &reqwest::Client,
        jwks_url: &str,
        key_id: &str,
    ) -> Result<String, ClerkJwksCacheError> {
        if let Some(jwks_json) = self.fresh_entry_with_key(key_id).await {
            return Ok(jwks_json);
        }

        let _refresh_guard = self.refresh_lock.lock().await;

        // Another request may have refreshed while this one waited.
        if let Some(jwks_json) = self.fresh_entry_with_key(key_id).await {
            return Ok(jwks_json);
        }

        let previous = self.entry.read().await.clone();

        match self.fetch_and_cache_jwks(http_client, jwks_url).await {
            Ok(fetched) if fetched.has_key(key_id) => Ok(fetched.jwks_json),
            Ok(_) => Err(ClerkJwksCacheError::UnknownKeyId),
            Err(err) => {
                let now = unix_timestamp();
                let stale = previous
                    .filter(|cached| now <= cached.stale_until && cached.has_key(key_id))
                    .ok_or(err)?;
                warn!(%key_id, "Clerk JWKS refresh failed, serving stale keys");
                Ok(stale.jwks_json)
            }
        }
    }

    async fn fresh_entry_with_key(&self, key_id: &str) -> Option<String> {
        let now = unix_timestamp();
        self.entry
            .read()
            .await
            .as_ref()
            .filter(|cached| now <= cached.expires_at && cached.has_key(key_id))
            .map(|cached| cached.jwks_json.clone())
    }

    async fn fetch_and_cache_jwks(
        &self,
        http_client: &reqwest::Client,
        jwks_url: &str,
    ) -> Result<CachedJwksEntry, ClerkJwksCacheError> {
        let response = http_client
            .get(jwks_url)
            .send()
            .await
            .map_err(|_| ClerkJwksCacheError::UpstreamUnavailable)?;
        if !response.status().is_success() {
            return Err(ClerkJwksCacheError::UpstreamUnavailable);
        }

        let ttl_seconds =
            resolve_cache_ttl_seconds(response.headers(), self.config.default_ttl_seconds);
        let body = response
            .text()
            .await
            .map_err(|_| ClerkJwksCacheError::UpstreamUnavailable)?;

        let key_ids = published_key_ids(&body).ok_or(ClerkJwksCacheError::UpstreamUnavailable)?;

        let expires_at = unix_timestamp().saturating_add_unsigned(ttl_seconds);
        let stale_until = expires_at.saturating_add_unsigned(self.config.stale_ttl_seconds);

        let entry = CachedJwksEntry {
            jwks_json: body,
            key_ids,
            expires_at,
            stale_until,
        };
        *self.entry.write().await = Some(entry.clone());
        debug!(ttl_seconds, "refreshed Clerk JWKS cache entry");

        Ok(entry)
    }
}

/// Key ids of a JWKS document, or `None` when it is not a usable key set.
fn published_key_ids(jwks_json: &str) -> Option<Vec<String>> {
    let envelope = serde_json::from_str::<JwksEnvelope>(jwks_json).ok()?;
    let key_ids: Vec<String> = envelope.keys.into_iter().map(|key| key.kid).collect();
    (!key_ids.is_empty()).then_some(key_ids)
}

fn resolve_cache_ttl_seconds(headers: &HeaderMap, default_ttl_seconds: u64) -> u64 {
    let ttl_seconds = headers
        .get(CACHE_CONTROL)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .unwrap_or(default_ttl_seconds);

    ttl_seconds.clamp(MIN_CACHE_CONTROL_TTL_SECONDS, MAX_CACHE_CONTROL_TTL_SECONDS)
}

fn parse_cache_control_max_age(cache_control: &str) -> Option<u64> {
    cache_control.split(',').find_map(|directive| {
        directive
            .trim()
            .to_ascii_lowercase()
            .strip_prefix("max-age=")
            .and_then(|value| value.parse::<u64>().ok())
    })
}

fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
