//! Simulated analyzers for synthetic runs and tests.
//!
//! Produces plausible random sub-scores in the same bands the simulation
//! harness used for the real endpoints, with an optional failure rate to
//! exercise the forced-review path.

use super::Analyzer;
use crate::types::{
    AnalysisOutcome, AnalysisResult, AnalyzerFailure, AnalyzerKind, AnalyzerScores,
    ContactScores, ContextScores, Frame, PoseScores,
};
use async_trait::async_trait;
use rand::Rng;
use std::time::Instant;

pub struct SimulatedAnalyzer {
    kind: AnalyzerKind,
    /// Probability in [0, 1] that a call reports a timeout failure.
    failure_rate: f64,
}

impl SimulatedAnalyzer {
    pub fn new(kind: AnalyzerKind, failure_rate: f64) -> Self {
        Self {
            kind,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    fn random_scores(&self) -> AnalyzerScores {
        let mut rng = rand::thread_rng();
        let mut score = || rng.gen_range(0.85..=1.0_f64);
        match self.kind {
            AnalyzerKind::Pose => AnalyzerScores::Pose(PoseScores {
                hand_position: score(),
                body_position: score(),
                movement: score(),
            }),
            AnalyzerKind::Contact => AnalyzerScores::Contact(ContactScores {
                contact_probability: score(),
                contact_location: score(),
                contact_force: score(),
            }),
            AnalyzerKind::Context => AnalyzerScores::Context(ContextScores {
                game_situation: score(),
                player_intent: score(),
                play_context: score(),
            }),
        }
    }
}

#[async_trait]
impl Analyzer for SimulatedAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        self.kind
    }

    async fn analyze(&self, frame: &Frame) -> AnalysisResult {
        let started = Instant::now();
        let failed = rand::thread_rng().gen_bool(self.failure_rate);
        // Yield once so simulated calls interleave like real network calls.
        tokio::task::yield_now().await;

        let outcome = if failed {
            AnalysisOutcome::Failed(AnalyzerFailure::Timeout(0))
        } else {
            AnalysisOutcome::Scores(self.random_scores())
        };

        AnalysisResult {
            kind: self.kind,
            frame: frame.number,
            outcome,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FramePayload;
    use chrono::Utc;

    fn frame(n: u64) -> Frame {
        Frame {
            number: n,
            captured_at: Utc::now(),
            payload: FramePayload::CaptureId(format!("frame-{n}")),
        }
    }

    #[tokio::test]
    async fn produces_scores_for_its_own_kind() {
        let analyzer = SimulatedAnalyzer::new(AnalyzerKind::Contact, 0.0);
        let result = analyzer.analyze(&frame(1)).await;
        assert_eq!(result.kind, AnalyzerKind::Contact);
        let scores = result.scores().expect("no failure at rate 0");
        assert_eq!(scores.kind(), AnalyzerKind::Contact);
    }

    #[tokio::test]
    async fn failure_rate_one_always_fails() {
        let analyzer = SimulatedAnalyzer::new(AnalyzerKind::Pose, 1.0);
        let result = analyzer.analyze(&frame(2)).await;
        assert!(result.failure().is_some());
    }
}
