//! Individual storage tiers backing the tiered persistence manager.
//!
//! Three layers, fastest first:
//! - [`MemoryTier`]: in-process map with TTL expiry
//! - [`CacheTier`] / [`HttpKvTier`]: shared remote key-value cache that
//!   degrades gracefully instead of retrying inline
//! - [`ObjectStore`] / [`HttpObjectStore`] + [`DurableTier`]: durable
//!   object store with a local-file fallback (the source of truth)

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tier-level errors. Recoverable as long as a lower tier succeeds.
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tier marked unavailable")]
    Unavailable,
}

/// Which tier served or accepted a value. Logged on every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierOrigin {
    Memory,
    Remote,
    Durable,
}

impl std::fmt::Display for TierOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierOrigin::Memory => f.write_str("memory"),
            TierOrigin::Remote => f.write_str("remote"),
            TierOrigin::Durable => f.write_str("durable"),
        }
    }
}

// ============================================================================
// Memory Tier
// ============================================================================

/// Fast in-process tier: a map of JSON values with per-entry expiry.
///
/// Expired entries are dropped on read. The std mutex is fine here — no
/// await point is ever held across it.
pub struct MemoryTier {
    entries: Mutex<HashMap<String, (Value, Option<Instant>)>>,
    default_ttl: Duration,
}

impl MemoryTier {
    pub fn new(default_ttl_secs: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: Duration::from_secs(default_ttl_secs),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((value, expires)) => {
                if expires.is_some_and(|at| Instant::now() >= at) {
                    entries.remove(key);
                    None
                } else {
                    Some(value.clone())
                }
            }
            None => None,
        }
    }

    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let expires = Some(Instant::now() + ttl.unwrap_or(self.default_ttl));
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), (value, expires));
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

// ============================================================================
// Remote Cache Tier
// ============================================================================

/// Shared remote key-value cache protocol: get / set-with-ttl / expire.
#[async_trait]
pub trait CacheTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, TierError>;
    async fn set(&self, key: &str, value: &Value, ttl_secs: u64) -> Result<(), TierError>;
    async fn expire(&self, key: &str) -> Result<(), TierError>;

    /// Whether the tier should currently be consulted at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Feed the availability tracker with a call outcome.
    fn note_outcome(&self, _ok: bool) {}

    fn tier_name(&self) -> &str;
}

/// HTTP key-value cache client (`GET/PUT/DELETE {base}/kv/{key}`).
///
/// After `max_consecutive_failures` failed calls the tier flips to
/// unavailable and is bypassed for the rest of the process lifetime; the
/// manager stops consulting it on both the read and write paths.
pub struct HttpKvTier {
    base_url: String,
    http: reqwest::Client,
    available: AtomicBool,
    consecutive_failures: AtomicU32,
    max_consecutive_failures: u32,
}

impl HttpKvTier {
    pub fn new(base_url: &str, timeout_secs: u64, max_consecutive_failures: u32) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            available: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            max_consecutive_failures: max_consecutive_failures.max(1),
        }
    }

    fn key_url(&self, key: &str) -> String {
        format!("{}/kv/{}", self.base_url, key)
    }
}

#[async_trait]
impl CacheTier for HttpKvTier {
    async fn get(&self, key: &str) -> Result<Option<Value>, TierError> {
        if !self.is_available() {
            return Err(TierError::Unavailable);
        }
        let resp = self.http.get(self.key_url(key)).send().await?;
        match resp.status().as_u16() {
            404 => Ok(None),
            s if (200..300).contains(&s) => {
                let value = resp.json::<Value>().await?;
                Ok(Some(value))
            }
            s => Err(TierError::Status(s)),
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl_secs: u64) -> Result<(), TierError> {
        if !self.is_available() {
            return Err(TierError::Unavailable);
        }
        let resp = self
            .http
            .put(self.key_url(key))
            .query(&[("ttl", ttl_secs)])
            .json(value)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TierError::Status(resp.status().as_u16()))
        }
    }

    async fn expire(&self, key: &str) -> Result<(), TierError> {
        if !self.is_available() {
            return Err(TierError::Unavailable);
        }
        let resp = self.http.delete(self.key_url(key)).send().await?;
        if resp.status().is_success() || resp.status().as_u16() == 404 {
            Ok(())
        } else {
            Err(TierError::Status(resp.status().as_u16()))
        }
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn note_outcome(&self, ok: bool) {
        if ok {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            self.available.store(true, Ordering::Relaxed);
        } else {
            let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if failures >= self.max_consecutive_failures && self.is_available() {
                warn!(
                    tier = self.tier_name(),
                    failures, "Remote cache tier marked unavailable, bypassing"
                );
                self.available.store(false, Ordering::Relaxed);
            }
        }
    }

    fn tier_name(&self) -> &str {
        "remote-kv"
    }
}

// ============================================================================
// Durable Tier
// ============================================================================

/// Durable object-store protocol: get / put by bucket + key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, TierError>;
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), TierError>;
    fn store_name(&self) -> &str;
}

/// HTTP object store client (`GET/PUT {endpoint}/{bucket}/{key}`).
pub struct HttpObjectStore {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, TierError> {
        let url = format!("{}/{}/{}", self.endpoint, bucket, key);
        let resp = self.http.get(url).send().await?;
        match resp.status().as_u16() {
            404 => Ok(None),
            s if (200..300).contains(&s) => Ok(Some(resp.bytes().await?.to_vec())),
            s => Err(TierError::Status(s)),
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), TierError> {
        let url = format!("{}/{}/{}", self.endpoint, bucket, key);
        let resp = self.http.put(url).body(body).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TierError::Status(resp.status().as_u16()))
        }
    }

    fn store_name(&self) -> &str {
        "http-object-store"
    }
}

/// Source-of-truth tier: optional object store plus a local-file fallback.
///
/// Files live at `data_dir/{key}.json`, written with full read / full
/// overwrite semantics. When the object store is unreachable the local
/// file alone still counts as a durable write.
pub struct DurableTier {
    store: Option<Box<dyn ObjectStore>>,
    bucket: String,
    data_dir: PathBuf,
}

impl DurableTier {
    pub fn new(store: Option<Box<dyn ObjectStore>>, bucket: &str, data_dir: PathBuf) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            data_dir,
        }
    }

    fn local_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }

    /// Read from the object store first, falling back to the local file.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, TierError> {
        if let Some(store) = &self.store {
            match store.get_object(&self.bucket, key).await {
                Ok(Some(bytes)) => return Ok(Some(serde_json::from_slice(&bytes)?)),
                Ok(None) => return Ok(None),
                Err(e) => {
                    warn!(key, error = %e, "Object store read failed, trying local fallback");
                }
            }
        }
        self.read_local(key)
    }

    /// Write to the object store and the local fallback.
    ///
    /// Succeeds if either accepts the value; fails only when both do.
    pub async fn put(&self, key: &str, value: &Value) -> Result<(), TierError> {
        let bytes = serde_json::to_vec(value)?;

        let mut store_ok = false;
        if let Some(store) = &self.store {
            match store.put_object(&self.bucket, key, bytes.clone()).await {
                Ok(()) => store_ok = true,
                Err(e) => {
                    warn!(key, error = %e, "Object store write failed, keeping local fallback");
                }
            }
        }

        match self.write_local(key, &bytes) {
            Ok(()) => Ok(()),
            Err(e) if store_ok => {
                warn!(key, error = %e, "Local fallback write failed, object store holds the value");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn read_local(&self, key: &str) -> Result<Option<Value>, TierError> {
        let path = self.local_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read(&path)?;
        if contents.is_empty() {
            return Ok(None);
        }
        debug!(key, path = %path.display(), "Durable read served from local file");
        Ok(Some(serde_json::from_slice(&contents)?))
    }

    fn write_local(&self, key: &str, bytes: &[u8]) -> Result<(), TierError> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::write(self.local_path(key), bytes)?;
        Ok(())
    }
}
