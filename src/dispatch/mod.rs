//! Distribution Dispatcher.
//!
//! Delivers a finalized decision to every configured downstream target
//! (referee device, broadcast overlay, archival store — an open list),
//! tolerating per-target failure, then writes a local content copy named
//! by distribution id as the audit trail. The local copy is the fallback
//! record when every remote target is down.

use crate::config::DistributionConfig;
use crate::persistence::DecisionLog;
use crate::types::{Decision, DistributionReceipt};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Per-target delivery failure. Isolated: never blocks other targets.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors from the dispatcher itself. The only failure mode is a caller
/// passing a frame with no persisted decision.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no decision found for frame {0}")]
    UnknownDecision(u64),
}

/// One downstream consumer of finalized decisions.
#[async_trait]
pub trait DeliveryTarget: Send + Sync {
    fn name(&self) -> &str;

    /// Attempt delivery of one decision payload.
    async fn deliver(&self, decision: &Decision) -> Result<(), TargetError>;
}

/// POST-style HTTP target: any 2xx response is success, all else failure.
pub struct HttpTarget {
    name: String,
    url: String,
    http: reqwest::Client,
}

impl HttpTarget {
    pub fn new(name: &str, url: &str, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            name: name.to_string(),
            url: url.to_string(),
            http,
        }
    }
}

#[async_trait]
impl DeliveryTarget for HttpTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, decision: &Decision) -> Result<(), TargetError> {
        let resp = self
            .http
            .post(&self.url)
            .json(decision)
            .send()
            .await
            .map_err(|e| TargetError::Transport(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TargetError::Status(resp.status().as_u16()))
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct Dispatcher {
    targets: Vec<Arc<dyn DeliveryTarget>>,
    audit_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(targets: Vec<Arc<dyn DeliveryTarget>>, audit_dir: PathBuf) -> Self {
        Self { targets, audit_dir }
    }

    /// Build HTTP targets from the configured open list.
    pub fn from_config(config: &DistributionConfig) -> Self {
        let targets = config
            .targets
            .iter()
            .map(|t| {
                Arc::new(HttpTarget::new(&t.name, &t.url, config.timeout_secs))
                    as Arc<dyn DeliveryTarget>
            })
            .collect();
        Self::new(targets, config.audit_dir.clone())
    }

    /// Deliver a decision to all targets and archive a local audit copy.
    ///
    /// Target calls run concurrently and are isolated from each other; the
    /// receipt enumerates exactly which targets succeeded.
    pub async fn distribute(&self, decision: &Decision) -> DistributionReceipt {
        let distribution_id = Uuid::new_v4();
        info!(
            frame = decision.frame,
            %distribution_id,
            targets = self.targets.len(),
            "Starting distribution"
        );

        let attempts = self
            .targets
            .iter()
            .map(|target| async move { (target.name().to_string(), target.deliver(decision).await) });
        let outcomes = futures::future::join_all(attempts).await;

        let mut delivered_to = Vec::new();
        let mut failed = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    info!(frame = decision.frame, target = %name, "Delivered");
                    delivered_to.push(name);
                }
                Err(e) => {
                    warn!(frame = decision.frame, target = %name, error = %e, "Delivery failed");
                    failed.push(name);
                }
            }
        }

        // Local archive runs after all attempts, successful or not. This is
        // the audit-path fallback when every remote target is down.
        let audit_path = match self.archive_local(decision, distribution_id) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(frame = decision.frame, error = %e, "Failed to archive decision locally");
                None
            }
        };

        info!(frame = decision.frame, %distribution_id, delivered = delivered_to.len(), "Distribution completed");

        DistributionReceipt {
            distribution_id,
            frame: decision.frame,
            delivered_to,
            failed,
            audit_path,
            timestamp: Utc::now(),
        }
    }

    /// Locate the newest persisted decision for `frame` and distribute it.
    pub async fn distribute_frame(
        &self,
        log: &DecisionLog,
        frame: u64,
    ) -> Result<DistributionReceipt, DispatchError> {
        let decision = log
            .find(frame)
            .await
            .ok_or(DispatchError::UnknownDecision(frame))?;
        Ok(self.distribute(&decision).await)
    }

    fn archive_local(
        &self,
        decision: &Decision,
        distribution_id: Uuid,
    ) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.audit_dir)?;
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = self
            .audit_dir
            .join(format!("decision_{distribution_id}_{timestamp}.json"));
        let body = serde_json::to_vec_pretty(decision)?;
        std::fs::write(&path, body)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ComponentScores;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockTarget {
        name: String,
        fail: bool,
        calls: AtomicU32,
    }

    impl MockTarget {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl DeliveryTarget for MockTarget {
        fn name(&self) -> &str {
            &self.name
        }

        async fn deliver(&self, _decision: &Decision) -> Result<(), TargetError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                Err(TargetError::Status(503))
            } else {
                Ok(())
            }
        }
    }

    fn decision(frame: u64) -> Decision {
        Decision {
            frame,
            final_decision: "Handball Violation".to_string(),
            certainty_score: 97.5,
            review_required: false,
            reason: "test".to_string(),
            component_scores: ComponentScores::default(),
            overridden: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn one_failing_target_does_not_block_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let referee = MockTarget::new("referee_smartwatch", false);
        let broadcast = MockTarget::new("tv_broadcast", true);
        let cloud = MockTarget::new("cloud_storage", false);

        let dispatcher = Dispatcher::new(
            vec![referee.clone(), broadcast.clone(), cloud.clone()],
            dir.path().to_path_buf(),
        );
        let receipt = dispatcher.distribute(&decision(100)).await;

        assert_eq!(receipt.delivered_to, vec!["referee_smartwatch", "cloud_storage"]);
        assert_eq!(receipt.failed, vec!["tv_broadcast"]);
        // Every target was attempted exactly once.
        for target in [&referee, &broadcast, &cloud] {
            assert_eq!(target.calls.load(Ordering::Relaxed), 1);
        }

        // Local audit copy exists and parses back to the same frame.
        let path = receipt.audit_path.expect("audit copy written");
        let body = std::fs::read(path).unwrap();
        let archived: Decision = serde_json::from_slice(&body).unwrap();
        assert_eq!(archived.frame, 100);
    }

    #[tokio::test]
    async fn all_targets_down_still_yields_audit_copy() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(
            vec![MockTarget::new("a", true), MockTarget::new("b", true)],
            dir.path().to_path_buf(),
        );
        let receipt = dispatcher.distribute(&decision(7)).await;
        assert!(receipt.delivered_to.is_empty());
        assert_eq!(receipt.failed.len(), 2);
        assert!(receipt.audit_path.is_some());
    }

    #[tokio::test]
    async fn receipts_get_unique_ids() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(vec![], dir.path().to_path_buf());
        let a = dispatcher.distribute(&decision(1)).await;
        let b = dispatcher.distribute(&decision(1)).await;
        assert_ne!(a.distribution_id, b.distribution_id);
    }

    #[tokio::test]
    async fn distribute_frame_unknown_decision_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(crate::persistence::TieredStore::new(
            crate::persistence::MemoryTier::new(3600),
            None,
            crate::persistence::DurableTier::new(None, "bucket", dir.path().join("data")),
            3600,
        ));
        let log = DecisionLog::new(store, "decision_logs");
        let dispatcher = Dispatcher::new(vec![], dir.path().join("audit"));

        let err = dispatcher.distribute_frame(&log, 999).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownDecision(999)));

        log.append(decision(999)).await.unwrap();
        let receipt = dispatcher.distribute_frame(&log, 999).await.unwrap();
        assert_eq!(receipt.frame, 999);
    }
}
