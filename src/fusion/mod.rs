//! Decision Fusion Engine.
//!
//! Reduces each analyzer result to a single 0–1 category score via a fixed
//! weighted sum over its sub-scores, averages the three categories, and
//! scales to a 0–100 certainty. A missing or failed analyzer contributes
//! zero and force-sets the review flag — a decision is always produced,
//! biased toward manual review rather than silently passing.
//!
//! `fuse` is infallible by contract: no internal fault escapes. Non-finite
//! arithmetic collapses to certainty 0 with a diagnostic reason.

use crate::config::FusionConfig;
use crate::types::{
    AnalysisResult, AnalyzerKind, AnalyzerScores, ComponentScores, Decision,
};
use chrono::Utc;
use tracing::warn;

/// One category's contribution to the fused decision.
struct CategoryScore {
    score: f64,
    explanation: String,
    failed: bool,
}

pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Combine the three analyzer results into one reviewable decision.
    ///
    /// `manual_reason`, when supplied by the caller, overrides the
    /// generated per-category explanation string.
    pub fn fuse(
        &self,
        pose: &AnalysisResult,
        contact: &AnalysisResult,
        context: &AnalysisResult,
        manual_reason: Option<&str>,
    ) -> Decision {
        let frame = pose.frame;

        let pose_cat = self.score_category(AnalyzerKind::Pose, pose);
        let contact_cat = self.score_category(AnalyzerKind::Contact, contact);
        let context_cat = self.score_category(AnalyzerKind::Context, context);

        let component_scores = ComponentScores {
            pose: pose_cat.score,
            contact: contact_cat.score,
            context: context_cat.score,
        };

        let any_failed = pose_cat.failed || contact_cat.failed || context_cat.failed;
        let final_score = component_scores.mean();
        let certainty_score = final_score * 100.0;

        // Arithmetic fault guard: a NaN/inf score must not leak into the
        // persisted log or the threshold comparison below.
        if !certainty_score.is_finite() {
            warn!(frame, "Non-finite certainty during fusion, forcing review");
            return Decision {
                frame,
                final_decision: "No Handball".to_string(),
                certainty_score: 0.0,
                review_required: true,
                reason: "Error in decision making: non-finite certainty score".to_string(),
                component_scores: ComponentScores::default(),
                overridden: false,
                created_at: Utc::now(),
            };
        }

        // The configurable threshold is authoritative; never a hardcoded 95.
        let review_required = certainty_score < self.config.review_threshold || any_failed;

        let final_decision = if !any_failed && final_score >= self.config.violation_cut {
            "Handball Violation"
        } else {
            "No Handball"
        };

        let reason = match manual_reason {
            Some(r) => r.to_string(),
            None => format!(
                "Pose: {}, Contact: {}, Context: {}",
                pose_cat.explanation, contact_cat.explanation, context_cat.explanation
            ),
        };

        Decision {
            frame,
            final_decision: final_decision.to_string(),
            certainty_score,
            review_required,
            reason,
            component_scores,
            overridden: false,
            created_at: Utc::now(),
        }
    }

    /// Reduce one analyzer result to a weighted category score plus a
    /// threshold-based human-readable explanation.
    fn score_category(&self, kind: AnalyzerKind, result: &AnalysisResult) -> CategoryScore {
        let scores = match result.scores() {
            Some(s) if s.kind() == kind => *s,
            Some(_) => {
                // Wrong-category record slipped past the adapter.
                return CategoryScore {
                    score: 0.0,
                    explanation: format!("{kind} analysis unavailable: category mismatch"),
                    failed: true,
                };
            }
            None => {
                let detail = result
                    .failure()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "no result".to_string());
                return CategoryScore {
                    score: 0.0,
                    explanation: format!("{kind} analysis unavailable: {detail}"),
                    failed: true,
                };
            }
        };

        let (weights, subs) = match scores {
            AnalyzerScores::Pose(p) => (
                self.config.pose_weights.as_array(),
                [p.hand_position, p.body_position, p.movement],
            ),
            AnalyzerScores::Contact(c) => (
                self.config.contact_weights.as_array(),
                [c.contact_probability, c.contact_location, c.contact_force],
            ),
            AnalyzerScores::Context(c) => (
                self.config.context_weights.as_array(),
                [c.game_situation, c.player_intent, c.play_context],
            ),
        };

        let score = weighted_sum(weights, subs);
        if !score.is_finite() {
            return CategoryScore {
                score: 0.0,
                explanation: format!("{kind} analysis unavailable: non-finite score"),
                failed: true,
            };
        }

        let explanation = explain(kind, score);
        CategoryScore {
            score: score.clamp(0.0, 1.0),
            explanation,
            failed: false,
        }
    }
}

fn weighted_sum(weights: [f64; 3], subs: [f64; 3]) -> f64 {
    weights[0] * subs[0] + weights[1] * subs[1] + weights[2] * subs[2]
}

/// Threshold-based explanation at the 0.5 category cut.
fn explain(kind: AnalyzerKind, score: f64) -> String {
    let text = match kind {
        AnalyzerKind::Pose => {
            if score < 0.5 {
                "Natural position"
            } else {
                "Unnatural position"
            }
        }
        AnalyzerKind::Contact => {
            if score < 0.5 {
                "No significant contact"
            } else {
                "Significant contact detected"
            }
        }
        AnalyzerKind::Context => {
            if score < 0.5 {
                "Normal play"
            } else {
                "Suspicious play"
            }
        }
    };
    text.to_string()
}
