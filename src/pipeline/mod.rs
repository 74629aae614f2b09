//! Decision Fusion & Distribution Pipeline.
//!
//! ```text
//! PHASE 1: Frame ingestion (source, skip stride, max frames)
//! PHASE 2: Analyzer fan-out (pose / contact / context, concurrent)
//! PHASE 3: Decision fusion (weighted certainty + review trigger)
//! PHASE 4: Tiered persistence (append to the decision log)
//! PHASE 5: Distribution (all targets, partial-failure isolated)
//! PHASE 6: Metrics (observed asynchronously, periodic flush)
//! ```
//!
//! Frames are processed in batches of `batch_size`, all member frames
//! concurrently; the orchestrator waits for the whole batch before
//! advancing, so never more than `batch_size` frames are in flight.

mod orchestrator;
pub mod source;

pub use orchestrator::{Orchestrator, PipelineContext, PipelineStats};
