//! Core data model for the decision pipeline.
//!
//! Everything that crosses a component boundary lives here: frames coming
//! in from the capture source, per-analyzer results, fused decisions, and
//! distribution receipts. Analyzer failure is represented as data on the
//! result (not a thrown error) so fusion logic can branch on it directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

// ============================================================================
// Frames
// ============================================================================

/// Opaque reference to the raw frame data.
///
/// The pipeline never inspects pixels — analyzers receive a reference they
/// can resolve on their side (a capture id or an external path).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FramePayload {
    /// Identifier of a frame held by the upstream capture system.
    CaptureId(String),
    /// Path to frame data on shared storage.
    Path(PathBuf),
}

/// A single video frame handed to the pipeline.
///
/// Immutable once produced by the source; owned by the orchestrator until
/// fanned out to the analyzers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Monotonically increasing frame number from the source.
    pub number: u64,
    pub captured_at: DateTime<Utc>,
    pub payload: FramePayload,
}

// ============================================================================
// Analyzer Results
// ============================================================================

/// The three independent classifiers feeding the fusion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    Pose,
    Contact,
    Context,
}

impl AnalyzerKind {
    /// Human-readable label used in reasons and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            AnalyzerKind::Pose => "pose",
            AnalyzerKind::Contact => "contact",
            AnalyzerKind::Context => "context",
        }
    }
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Limb-pose sub-scores, each in [0, 1].
///
/// Unknown fields from the analyzer are rejected at the adapter boundary
/// rather than threaded through as untyped maps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PoseScores {
    pub hand_position: f64,
    pub body_position: f64,
    pub movement: f64,
}

/// Ball-contact sub-scores, each in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ContactScores {
    pub contact_probability: f64,
    pub contact_location: f64,
    pub contact_force: f64,
}

/// Event-context sub-scores, each in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ContextScores {
    pub game_situation: f64,
    pub player_intent: f64,
    pub play_context: f64,
}

/// Tagged per-kind score record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerScores {
    Pose(PoseScores),
    Contact(ContactScores),
    Context(ContextScores),
}

impl AnalyzerScores {
    pub fn kind(&self) -> AnalyzerKind {
        match self {
            AnalyzerScores::Pose(_) => AnalyzerKind::Pose,
            AnalyzerScores::Contact(_) => AnalyzerKind::Contact,
            AnalyzerScores::Context(_) => AnalyzerKind::Context,
        }
    }
}

/// Typed failure descriptor for a single analyzer call.
///
/// All variants are recoverable: a failed analyzer forces manual review,
/// it never aborts the frame.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnalyzerFailure {
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("HTTP status {0}")]
    Http(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("analyzer returned scores for the wrong category")]
    KindMismatch,
}

/// Outcome of one analyzer call: scores or a typed failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Scores(AnalyzerScores),
    Failed(AnalyzerFailure),
}

/// One result per analyzer per frame. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub kind: AnalyzerKind,
    pub frame: u64,
    pub outcome: AnalysisOutcome,
    /// Wall-clock time spent in the analyzer call, for metrics.
    pub elapsed_ms: f64,
}

impl AnalysisResult {
    pub fn scores(&self) -> Option<&AnalyzerScores> {
        match &self.outcome {
            AnalysisOutcome::Scores(s) => Some(s),
            AnalysisOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&AnalyzerFailure> {
        match &self.outcome {
            AnalysisOutcome::Scores(_) => None,
            AnalysisOutcome::Failed(f) => Some(f),
        }
    }
}

// ============================================================================
// Decisions
// ============================================================================

/// Per-category fused scores (0–1), retained for audit even after an
/// override replaces the final call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ComponentScores {
    pub pose: f64,
    pub contact: f64,
    pub context: f64,
}

impl ComponentScores {
    pub fn mean(&self) -> f64 {
        (self.pose + self.contact + self.context) / 3.0
    }
}

/// A fused, reviewable decision for one frame.
///
/// Created exactly once per frame by the fusion engine. The only mutation
/// allowed afterwards is a manual override, which replaces `final_decision`
/// and force-sets `review_required` while keeping `component_scores`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub frame: u64,
    /// "Handball Violation" / "No Handball", or the override text.
    pub final_decision: String,
    /// Fused confidence scaled to 0–100.
    pub certainty_score: f64,
    /// VAR review flag: low confidence or any analyzer failure.
    pub review_required: bool,
    pub reason: String,
    pub component_scores: ComponentScores,
    /// True once a manual override replaced the automated call.
    #[serde(default)]
    pub overridden: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Distribution
// ============================================================================

/// Record of one distribution attempt across all configured targets.
/// Created once per attempt; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionReceipt {
    pub distribution_id: Uuid,
    pub frame: u64,
    /// Targets that acknowledged delivery, in configured order.
    pub delivered_to: Vec<String>,
    /// Targets that failed; delivery to them was skipped, not retried.
    pub failed: Vec<String>,
    /// Locally archived copy of the payload, if the archive write succeeded.
    pub audit_path: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_scores_reject_unknown_fields() {
        let json = r#"{"hand_position":0.5,"body_position":0.5,"movement":0.5,"extra":1.0}"#;
        let parsed: Result<PoseScores, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn analyzer_scores_round_trip() {
        let scores = AnalyzerScores::Contact(ContactScores {
            contact_probability: 0.9,
            contact_location: 0.8,
            contact_force: 0.7,
        });
        let json = serde_json::to_string(&scores).unwrap();
        let back: AnalyzerScores = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), AnalyzerKind::Contact);
        assert_eq!(back, scores);
    }

    #[test]
    fn component_mean() {
        let c = ComponentScores {
            pose: 0.9,
            contact: 0.9,
            context: 0.9,
        };
        assert!((c.mean() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn decision_defaults_overridden_false_on_old_records() {
        // Records persisted before the override field existed must still load.
        let json = r#"{
            "frame": 7,
            "final_decision": "No Handball",
            "certainty_score": 91.0,
            "review_required": true,
            "reason": "test",
            "component_scores": {"pose": 0.9, "contact": 0.9, "context": 0.95},
            "created_at": "2025-01-01T00:00:00Z"
        }"#;
        let d: Decision = serde_json::from_str(json).unwrap();
        assert!(!d.overridden);
    }
}
