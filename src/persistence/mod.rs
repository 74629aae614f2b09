//! Tiered Persistence Manager.
//!
//! Read path: memory → shared remote cache → durable store, backfilling
//! every faster tier on a hit. Write path: write-through to all tiers;
//! only the durable tier (object store, or its local-file fallback) is
//! authoritative — accelerator failures are logged and absorbed.
//!
//! Read-modify-write cycles (the append-only decision log) serialize
//! through a per-key async mutex owned by this manager; cache tiers
//! themselves are external services and need no cross-process locking.

pub mod log;
mod tiers;

pub use log::DecisionLog;
pub use tiers::{
    CacheTier, DurableTier, HttpKvTier, HttpObjectStore, MemoryTier, ObjectStore, TierError,
    TierOrigin,
};

use crate::config::{CacheConfig, StorageConfig};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

/// Fatal persistence errors: raised only when every tier, including the
/// local fallback, rejects a write.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("all persistence tiers failed for key '{key}': {detail}")]
    AllTiersFailed { key: String, detail: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Multi-level cache/store for decision records.
pub struct TieredStore {
    memory: MemoryTier,
    remote: Option<Arc<dyn CacheTier>>,
    durable: DurableTier,
    remote_ttl_secs: u64,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TieredStore {
    /// Assemble the tier stack from configuration.
    pub fn from_config(cache: &CacheConfig, storage: &StorageConfig) -> Self {
        let remote: Option<Arc<dyn CacheTier>> = cache.remote_url.as_deref().map(|url| {
            Arc::new(HttpKvTier::new(
                url,
                cache.remote_timeout_secs,
                cache.max_consecutive_failures,
            )) as Arc<dyn CacheTier>
        });

        let store: Option<Box<dyn ObjectStore>> = storage
            .endpoint
            .as_deref()
            .map(|ep| Box::new(HttpObjectStore::new(ep, storage.timeout_secs)) as Box<dyn ObjectStore>);

        Self::new(
            MemoryTier::new(cache.memory_ttl_secs),
            remote,
            DurableTier::new(store, &storage.bucket, storage.data_dir.clone()),
            cache.remote_ttl_secs,
        )
    }

    pub fn new(
        memory: MemoryTier,
        remote: Option<Arc<dyn CacheTier>>,
        durable: DurableTier,
        remote_ttl_secs: u64,
    ) -> Self {
        Self {
            memory,
            remote,
            durable,
            remote_ttl_secs,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Read through the tier stack, backfilling faster tiers on a hit.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.memory.get(key) {
            debug!(key, tier = %TierOrigin::Memory, "Cache hit");
            return Some(value);
        }

        if let Some(remote) = &self.remote {
            if remote.is_available() {
                match remote.get(key).await {
                    Ok(Some(value)) => {
                        remote.note_outcome(true);
                        debug!(key, tier = %TierOrigin::Remote, "Cache hit");
                        self.memory.set(key, value.clone(), None);
                        return Some(value);
                    }
                    Ok(None) => remote.note_outcome(true),
                    Err(e) => {
                        remote.note_outcome(false);
                        warn!(key, error = %e, "Remote cache read failed, falling through");
                    }
                }
            }
        }

        match self.durable.get(key).await {
            Ok(Some(value)) => {
                debug!(key, tier = %TierOrigin::Durable, "Cache hit");
                // Backfill the accelerators before returning.
                self.memory.set(key, value.clone(), None);
                if let Some(remote) = &self.remote {
                    if remote.is_available() {
                        let ok = remote.set(key, &value, self.remote_ttl_secs).await.is_ok();
                        remote.note_outcome(ok);
                    }
                }
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Durable read failed");
                None
            }
        }
    }

    /// Write through every tier.
    ///
    /// Returns `true` iff the durable tier accepted the write; accelerator
    /// failures are logged and do not fail the call.
    pub async fn put(&self, key: &str, value: &Value, ttl: Option<Duration>) -> bool {
        self.memory.set(key, value.clone(), ttl);

        if let Some(remote) = &self.remote {
            if remote.is_available() {
                let ttl_secs = ttl.map_or(self.remote_ttl_secs, |d| d.as_secs());
                match remote.set(key, value, ttl_secs).await {
                    Ok(()) => remote.note_outcome(true),
                    Err(e) => {
                        remote.note_outcome(false);
                        warn!(key, error = %e, "Remote cache write failed (opportunistic tier)");
                    }
                }
            }
        }

        match self.durable.put(key, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Durable write failed on all paths");
                false
            }
        }
    }

    /// Acquire the per-key mutex guarding read-modify-write cycles.
    ///
    /// Single writer at a time per key within this manager instance; the
    /// guard is owned so it can be held across await points.
    pub async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .key_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(
                locks
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}
