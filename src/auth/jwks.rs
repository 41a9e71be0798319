//! Remote JSON Web Key Set retrieval and caching.
//!
//! Externally issued tokens are signed with Ed25519 keys published at a JWKS
//! endpoint. [`JwksCache`] keeps one copy of that document and refetches it
//! once it is older than the configured TTL. Concurrent refreshes are allowed;
//! the last completed fetch wins.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::AppError;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

const OKP_KEY_TYPE: &str = "OKP";
const ED25519_CURVE: &str = "Ed25519";

/// One entry of a key set. Only the members needed for Ed25519 are modelled;
/// entries of other key types still deserialize and are skipped on lookup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub crv: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub kid: Option<String>,
}

impl Jwk {
    /// Builds an Ed25519 octet-key-pair entry from a base64url public key.
    pub fn ed25519(kid: impl Into<String>, x: impl Into<String>) -> Self {
        Self {
            kty: OKP_KEY_TYPE.to_string(),
            crv: Some(ED25519_CURVE.to_string()),
            x: Some(x.into()),
            kid: Some(kid.into()),
        }
    }

    /// The base64url public key, if this is an `OKP`/`Ed25519` entry.
    pub fn ed25519_public_key(&self) -> Option<&str> {
        if self.kty != OKP_KEY_TYPE || self.crv.as_deref() != Some(ED25519_CURVE) {
            return None;
        }
        self.x.as_deref().filter(|x| !x.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JwkSet {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid.as_deref() == Some(kid))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySetError(pub String);

impl fmt::Display for KeySetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "key set unavailable: {}", self.0)
    }
}

impl std::error::Error for KeySetError {}

impl From<reqwest::Error> for KeySetError {
    fn from(error: reqwest::Error) -> Self {
        KeySetError(error.to_string())
    }
}

/// Where a key set comes from.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, KeySetError>;
}

/// Fetches the key set with a `GET` against a JWKS endpoint.
pub struct HttpKeySetSource {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySetSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::InternalServerError(format!("Failed to build JWKS client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        let key_set = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;
        Ok(key_set)
    }
}

/// A fixed key set, for pinned deployments and tests.
pub struct StaticKeySetSource(pub JwkSet);

#[async_trait]
impl KeySetSource for StaticKeySetSource {
    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        Ok(self.0.clone())
    }
}

struct CachedKeySet {
    fetched_at: Instant,
    keys: Arc<JwkSet>,
}

pub struct JwksCache {
    source: Arc<dyn KeySetSource>,
    ttl: Duration,
    fetch_timeout: Duration,
    cached: RwLock<Option<CachedKeySet>>,
}

impl JwksCache {
    pub fn new(source: Arc<dyn KeySetSource>, ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            source,
            ttl,
            fetch_timeout,
            cached: RwLock::new(None),
        }
    }

    /// Returns the cached key set, refetching when empty or stale.
    pub async fn key_set(&self) -> Result<Arc<JwkSet>, KeySetError> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&cached.keys));
            }
        }
        self.refresh().await
    }

    /// Unconditionally fetches and replaces the cached key set.
    /// A failed fetch leaves the previous entry untouched.
    pub async fn refresh(&self) -> Result<Arc<JwkSet>, KeySetError> {
        let fetched = tokio::time::timeout(self.fetch_timeout, self.source.fetch())
            .await
            .map_err(|_| KeySetError("fetch timed out".into()))??;
        let keys = Arc::new(fetched);
        debug!("Fetched JWKS with {} key(s)", keys.keys.len());

        *self.cached.write().await = Some(CachedKeySet {
            fetched_at: Instant::now(),
            keys: Arc::clone(&keys),
        });
        Ok(keys)
    }
}
