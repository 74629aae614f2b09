//! Raasid: Automated Handball Decision System
//!
//! Decision fusion and distribution pipeline for automated officiating.
//!
//! ## Architecture
//!
//! - **Analyzer Adapters**: uniform async contract to the three external
//!   classifiers (limb-pose, ball-contact, event-context)
//! - **Fusion Engine**: weighted certainty score + VAR review trigger
//! - **Tiered Persistence**: memory → shared cache → durable store with
//!   read-through backfill and write-through fallback
//! - **Distribution Dispatcher**: fan-out to downstream consumers with
//!   partial-failure isolation and a local audit trail
//! - **Pipeline Orchestrator**: batched, bounded-concurrency frame loop

pub mod analyzers;
pub mod config;
pub mod dispatch;
pub mod fusion;
pub mod metrics;
pub mod persistence;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::AppConfig;

// Re-export commonly used types
pub use types::{
    AnalysisOutcome, AnalysisResult, AnalyzerFailure, AnalyzerKind, AnalyzerScores,
    ComponentScores, ContactScores, ContextScores, Decision, DistributionReceipt, Frame,
    FramePayload, PoseScores,
};

// Re-export pipeline components
pub use analyzers::{Analyzer, AnalyzerSet};
pub use dispatch::{DeliveryTarget, Dispatcher};
pub use fusion::FusionEngine;
pub use metrics::{FrameSample, MetricsTracker};
pub use persistence::{DecisionLog, TieredStore};
pub use pipeline::{Orchestrator, PipelineContext, PipelineStats};
