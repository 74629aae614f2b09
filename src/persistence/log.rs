//! Append-only decision log persisted through the tiered store.
//!
//! The log is one ordered JSON array under a single configured key. Every
//! mutation re-serializes the full collection (no partial/merge writes)
//! under the store's per-key mutex, so concurrent appenders never lose
//! entries. Decisions land in completion order; callers needing capture
//! order sort by frame number.

use super::{PersistenceError, TieredStore};
use crate::types::Decision;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct DecisionLog {
    store: Arc<TieredStore>,
    key: String,
}

impl DecisionLog {
    pub fn new(store: Arc<TieredStore>, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
        }
    }

    /// Load the full ordered log. Unparseable entries are dropped with a
    /// warning rather than poisoning the whole log.
    pub async fn load(&self) -> Vec<Decision> {
        let Some(value) = self.store.get(&self.key).await else {
            return Vec::new();
        };
        let Value::Array(entries) = value else {
            warn!(key = %self.key, "Decision log is not a JSON array, treating as empty");
            return Vec::new();
        };
        entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<Decision>(entry) {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Skipping malformed decision log entry");
                    None
                }
            })
            .collect()
    }

    /// Most recent decision for a frame (newest match wins).
    pub async fn find(&self, frame: u64) -> Option<Decision> {
        self.load().await.into_iter().rev().find(|d| d.frame == frame)
    }

    /// Append one decision under the log's key lock.
    pub async fn append(&self, decision: Decision) -> Result<(), PersistenceError> {
        let _guard = self.store.lock_key(&self.key).await;
        let mut log = self.load().await;
        let frame = decision.frame;
        log.push(decision);
        self.write_full(&log).await?;
        info!(frame, entries = log.len(), "Decision appended to log");
        Ok(())
    }

    /// Apply a manual override to the most recent decision for `frame`.
    ///
    /// Replaces `final_decision`, force-sets `review_required` and the
    /// `overridden` marker, and keeps `component_scores` for audit. Returns
    /// `Ok(false)` when no entry for the frame exists.
    pub async fn apply_override(
        &self,
        frame: u64,
        override_decision: &str,
        reason: Option<&str>,
    ) -> Result<bool, PersistenceError> {
        let _guard = self.store.lock_key(&self.key).await;
        let mut log = self.load().await;

        // Newest-to-oldest: the latest decision for the frame is authoritative.
        let Some(entry) = log.iter_mut().rev().find(|d| d.frame == frame) else {
            return Ok(false);
        };

        entry.final_decision = override_decision.to_string();
        entry.review_required = true;
        entry.overridden = true;
        if let Some(reason) = reason {
            entry.reason = reason.to_string();
        }

        self.write_full(&log).await?;
        info!(frame, decision = override_decision, "Manual override applied");
        Ok(true)
    }

    async fn write_full(&self, log: &[Decision]) -> Result<(), PersistenceError> {
        let value = serde_json::to_value(log)?;
        if self.store.put(&self.key, &value, None).await {
            Ok(())
        } else {
            Err(PersistenceError::AllTiersFailed {
                key: self.key.clone(),
                detail: "durable tier rejected decision log write".to_string(),
            })
        }
    }
}
