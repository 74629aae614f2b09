//! Pipeline orchestrator: drives the frame loop end to end.
//!
//! Owns no global state — everything it touches (analyzers, fusion engine,
//! persistence, dispatcher, metrics) lives in an explicitly constructed
//! [`PipelineContext`] passed down at build time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::source::{FrameEvent, FrameSource};
use crate::analyzers::AnalyzerSet;
use crate::config::AppConfig;
use crate::dispatch::Dispatcher;
use crate::fusion::FusionEngine;
use crate::metrics::{FrameSample, MetricsTracker};
use crate::persistence::{DecisionLog, TieredStore};
use crate::types::Frame;

// ============================================================================
// Pipeline Context
// ============================================================================

/// Everything a pipeline run depends on, constructed once and passed down.
pub struct PipelineContext {
    pub config: AppConfig,
    pub analyzers: AnalyzerSet,
    pub fusion: FusionEngine,
    pub store: Arc<TieredStore>,
    pub log: DecisionLog,
    pub dispatcher: Dispatcher,
    pub metrics: Arc<MetricsTracker>,
}

impl PipelineContext {
    /// Assemble the full component stack from configuration.
    pub fn from_config(config: AppConfig) -> Self {
        let store = Arc::new(TieredStore::from_config(&config.cache, &config.storage));
        let log = DecisionLog::new(Arc::clone(&store), &config.storage.log_key);
        let dispatcher = Dispatcher::from_config(&config.distribution);
        let metrics = Arc::new(MetricsTracker::new(
            &config.metrics.dir,
            config.metrics.enabled,
        ));
        let analyzers = AnalyzerSet::from_config(&config.analyzers);
        let fusion = FusionEngine::new(config.fusion.clone());

        Self {
            config,
            analyzers,
            fusion,
            store,
            log,
            dispatcher,
            metrics,
        }
    }

    /// Swap the analyzer set (simulated analyzers for synthetic runs).
    pub fn with_analyzers(mut self, analyzers: AnalyzerSet) -> Self {
        self.analyzers = analyzers;
        self
    }
}

// ============================================================================
// Pipeline Stats
// ============================================================================

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Frames read from the source (including stride-skipped ones).
    pub frames_seen: u64,
    /// Frames that entered a batch after skip-stride / max-frames gating.
    pub frames_accepted: u64,
    /// Frames that produced a persisted, distributed decision.
    pub frames_processed: u64,
    /// Frames whose per-frame pipeline failed (caught, logged, skipped).
    pub frames_failed: u64,
    /// Decisions that required VAR review.
    pub reviews_triggered: u64,
    /// Batches completed.
    pub batches: u64,
    /// Metrics flushes performed.
    pub metrics_flushes: u64,
}

/// Outcome of a single frame's pipeline, for stats bookkeeping.
struct FrameOutcome {
    frame: u64,
    review_required: bool,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    ctx: Arc<PipelineContext>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(ctx: Arc<PipelineContext>, cancel: CancellationToken) -> Self {
        Self { ctx, cancel }
    }

    /// Run the pipeline until the source is exhausted, `max_frames` is
    /// reached, or cancellation.
    ///
    /// The source is released exactly once on every exit path, and a final
    /// metrics flush runs before returning.
    pub async fn run<S: FrameSource>(&self, mut source: S) -> Result<PipelineStats> {
        info!(source = source.source_name(), "Pipeline starting");
        let result = self.run_inner(&mut source).await;
        source.release();

        if let Err(e) = self.ctx.metrics.flush() {
            warn!(error = %e, "Final metrics flush failed");
        }

        if let Ok(ref stats) = result {
            info!(
                frames_seen = stats.frames_seen,
                frames_processed = stats.frames_processed,
                frames_failed = stats.frames_failed,
                reviews = stats.reviews_triggered,
                batches = stats.batches,
                "Pipeline finished"
            );
        }
        result
    }

    async fn run_inner<S: FrameSource>(&self, source: &mut S) -> Result<PipelineStats> {
        let mut stats = PipelineStats::default();
        let batch_size = self.ctx.config.pipeline.batch_size.max(1);
        let skip_stride = self.ctx.config.pipeline.skip_stride.max(1);
        let max_frames = self.ctx.config.pipeline.max_frames;
        let flush_interval = self.ctx.config.pipeline.metrics_flush_interval;
        let mut since_flush: u64 = 0;
        let mut exhausted = false;

        while !exhausted && !self.cancel.is_cancelled() {
            // Collect the next batch in source order.
            let mut batch: Vec<Frame> = Vec::with_capacity(batch_size);
            while batch.len() < batch_size {
                if max_frames > 0 && stats.frames_accepted >= max_frames {
                    info!(max_frames, "Reached max frame count");
                    exhausted = true;
                    break;
                }

                let event = tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!("Shutdown signal received while reading source");
                        exhausted = true;
                        break;
                    }
                    result = source.next_frame() => result?,
                };

                match event {
                    FrameEvent::Frame(frame) => {
                        stats.frames_seen += 1;
                        // Keep 1 out of every `skip_stride` source frames.
                        if (stats.frames_seen - 1) % skip_stride != 0 {
                            continue;
                        }
                        stats.frames_accepted += 1;
                        batch.push(frame);
                    }
                    FrameEvent::Eof => {
                        info!(
                            frames_seen = stats.frames_seen,
                            "Source reached end of data"
                        );
                        exhausted = true;
                        break;
                    }
                }
            }

            if batch.is_empty() {
                continue;
            }

            stats.batches += 1;
            let batch_len = batch.len() as u64;
            let outcomes = self.process_batch(batch).await;

            match outcomes {
                Some(outcomes) => {
                    for outcome in outcomes {
                        match outcome {
                            Ok(o) => {
                                stats.frames_processed += 1;
                                if o.review_required {
                                    stats.reviews_triggered += 1;
                                }
                                tracing::debug!(
                                    frame = o.frame,
                                    review = o.review_required,
                                    "Frame processed"
                                );
                            }
                            Err((frame, e)) => {
                                stats.frames_failed += 1;
                                warn!(frame, error = %e, "Frame pipeline failed, continuing batch run");
                            }
                        }
                    }
                }
                None => {
                    // Batch abandoned after the cancellation grace period.
                    stats.frames_failed += batch_len;
                    break;
                }
            }

            // Flush trigger counts processed frames in source order at
            // batch boundaries.
            if flush_interval > 0 {
                since_flush += batch_len;
                if since_flush >= flush_interval {
                    since_flush = 0;
                    match self.ctx.metrics.flush() {
                        Ok(Some(_)) => stats.metrics_flushes += 1,
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "Metrics flush failed"),
                    }
                }
            }
        }

        Ok(stats)
    }

    /// Process one batch with all member frames in flight concurrently.
    ///
    /// Returns `None` when cancellation fired and the batch did not finish
    /// within the grace period.
    async fn process_batch(
        &self,
        batch: Vec<Frame>,
    ) -> Option<Vec<Result<FrameOutcome, (u64, anyhow::Error)>>> {
        let futures = batch.into_iter().map(|frame| {
            let ctx = Arc::clone(&self.ctx);
            async move {
                let number = frame.number;
                process_frame(&ctx, frame).await.map_err(|e| (number, e))
            }
        });
        let batch_fut = futures::future::join_all(futures);
        tokio::pin!(batch_fut);

        tokio::select! {
            results = &mut batch_fut => Some(results),
            _ = self.cancel.cancelled() => {
                let grace = Duration::from_secs(self.ctx.config.pipeline.cancel_grace_secs);
                info!(grace_secs = grace.as_secs(), "Cancelled mid-batch, waiting for in-flight frames");
                match tokio::time::timeout(grace, &mut batch_fut).await {
                    Ok(results) => Some(results),
                    Err(_) => {
                        warn!("Grace period expired, abandoning in-flight frames");
                        None
                    }
                }
            }
        }
    }
}

/// The per-frame pipeline: analyze → fuse → persist → distribute → record.
async fn process_frame(ctx: &PipelineContext, frame: Frame) -> Result<FrameOutcome> {
    let started = Instant::now();
    let number = frame.number;

    // The three analyzer calls run concurrently for this frame.
    let (pose, contact, context) = ctx.analyzers.analyze_frame(&frame).await;
    let (pose_ms, contact_ms, context_ms) =
        (pose.elapsed_ms, contact.elapsed_ms, context.elapsed_ms);

    let decision = ctx.fusion.fuse(&pose, &contact, &context, None);
    let review_required = decision.review_required;
    let certainty_score = decision.certainty_score;

    ctx.log.append(decision.clone()).await?;

    let receipt = ctx.dispatcher.distribute(&decision).await;
    if receipt.delivered_to.is_empty() && !receipt.failed.is_empty() {
        warn!(
            frame = number,
            "All distribution targets failed, only the local audit copy was written"
        );
    }

    ctx.metrics.record(FrameSample {
        frame: number,
        total_ms: started.elapsed().as_secs_f64() * 1000.0,
        pose_ms,
        contact_ms,
        context_ms,
        certainty_score,
        review_required,
        recorded_at: chrono::Utc::now(),
    });

    Ok(FrameOutcome {
        frame: number,
        review_required,
    })
}
