//! Analyzer adapters: uniform async call contract to the three external
//! classifiers (limb-pose, ball-contact, event-context).
//!
//! Adapters never fuse anything and never return `Err` — every call yields
//! an [`AnalysisResult`] whose outcome is either typed scores or a typed
//! failure. Timeouts, bad payloads, and transport errors are all data the
//! fusion engine can branch on.

mod http;
mod sim;

pub use http::HttpAnalyzer;
pub use sim::SimulatedAnalyzer;

use crate::config::AnalyzerConfig;
use crate::types::{AnalysisResult, AnalyzerKind, Frame};
use async_trait::async_trait;
use std::sync::Arc;

/// Uniform call contract to one external analyzer.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Which of the three categories this analyzer covers.
    fn kind(&self) -> AnalyzerKind;

    /// Analyze one frame. Infallible at the signature level: failures are
    /// embedded in the result's outcome.
    async fn analyze(&self, frame: &Frame) -> AnalysisResult;
}

/// The three analyzers bundled for per-frame fan-out.
#[derive(Clone)]
pub struct AnalyzerSet {
    pub pose: Arc<dyn Analyzer>,
    pub contact: Arc<dyn Analyzer>,
    pub context: Arc<dyn Analyzer>,
}

impl AnalyzerSet {
    /// Build HTTP adapters for all three categories from config.
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            pose: Arc::new(HttpAnalyzer::new(
                AnalyzerKind::Pose,
                &config.pose_url,
                config.timeout_secs,
            )),
            contact: Arc::new(HttpAnalyzer::new(
                AnalyzerKind::Contact,
                &config.contact_url,
                config.timeout_secs,
            )),
            context: Arc::new(HttpAnalyzer::new(
                AnalyzerKind::Context,
                &config.context_url,
                config.timeout_secs,
            )),
        }
    }

    /// Simulated analyzers for synthetic runs and tests.
    pub fn simulated(failure_rate: f64) -> Self {
        Self {
            pose: Arc::new(SimulatedAnalyzer::new(AnalyzerKind::Pose, failure_rate)),
            contact: Arc::new(SimulatedAnalyzer::new(AnalyzerKind::Contact, failure_rate)),
            context: Arc::new(SimulatedAnalyzer::new(AnalyzerKind::Context, failure_rate)),
        }
    }

    /// Run all three analyzers concurrently for one frame.
    ///
    /// Returns results in (pose, contact, context) order regardless of
    /// completion order.
    pub async fn analyze_frame(
        &self,
        frame: &Frame,
    ) -> (AnalysisResult, AnalysisResult, AnalysisResult) {
        tokio::join!(
            self.pose.analyze(frame),
            self.contact.analyze(frame),
            self.context.analyze(frame),
        )
    }
}
