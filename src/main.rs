//! Raasid - Automated handball decision fusion and distribution pipeline.
//!
//! # Usage
//!
//! ```bash
//! # Run against a JSONL capture file with the configured HTTP analyzers
//! raasid run --frames captures/match_frames.jsonl
//!
//! # Run with synthetic frames and simulated analyzers
//! raasid run --synthetic 50
//!
//! # Re-deliver a persisted decision to all targets
//! raasid distribute --frame 4004
//!
//! # Apply a VAR override to a persisted decision
//! raasid override --frame 4004 --decision "No Handball" --reason "overturned on review"
//!
//! # Show the persisted decision log
//! raasid show-log --limit 20
//! ```
//!
//! # Environment Variables
//!
//! - `RAASID_CONFIG`: Path to the TOML config file (default: ./raasid.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use raasid::analyzers::AnalyzerSet;
use raasid::config::AppConfig;
use raasid::pipeline::source::{JsonlSource, SyntheticSource};
use raasid::pipeline::{Orchestrator, PipelineContext};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "raasid")]
#[command(about = "Raasid automated handball decision pipeline")]
#[command(version)]
struct CliArgs {
    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the fusion pipeline over a frame source
    Run {
        /// Path to a JSONL capture file (one frame per line)
        #[arg(long, value_name = "PATH")]
        frames: Option<PathBuf>,

        /// Generate N synthetic frames with simulated analyzers instead
        #[arg(long, value_name = "COUNT")]
        synthetic: Option<u64>,

        /// Simulated analyzer failure rate in [0, 1] (synthetic mode only)
        #[arg(long, default_value = "0.0")]
        failure_rate: f64,

        /// Override the configured batch size
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override the configured max frame count
        #[arg(long)]
        max_frames: Option<u64>,
    },

    /// Re-deliver a persisted decision to all configured targets
    Distribute {
        /// Frame number of the decision to distribute
        #[arg(long)]
        frame: u64,
    },

    /// Apply a manual VAR override to a persisted decision
    Override {
        /// Frame number to override
        #[arg(long)]
        frame: u64,

        /// Replacement decision text
        #[arg(long)]
        decision: String,

        /// Optional replacement reason
        #[arg(long)]
        reason: Option<String>,
    },

    /// Print the persisted decision log (newest last)
    ShowLog {
        /// Maximum number of entries to print (0 = all)
        #[arg(long, default_value = "0")]
        limit: usize,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = CliArgs::parse();
    let config = AppConfig::load();
    for warning in config.validate() {
        warn!("Config: {warning}");
    }

    match args.command {
        SubCommand::Run {
            frames,
            synthetic,
            failure_rate,
            batch_size,
            max_frames,
        } => run_pipeline(config, frames, synthetic, failure_rate, batch_size, max_frames).await,
        SubCommand::Distribute { frame } => {
            let ctx = PipelineContext::from_config(config);
            let receipt = ctx
                .dispatcher
                .distribute_frame(&ctx.log, frame)
                .await
                .with_context(|| format!("cannot distribute frame {frame}"))?;
            info!(
                frame,
                distribution_id = %receipt.distribution_id,
                delivered = receipt.delivered_to.len(),
                failed = receipt.failed.len(),
                "Distribution completed"
            );
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            Ok(())
        }
        SubCommand::Override {
            frame,
            decision,
            reason,
        } => {
            let ctx = PipelineContext::from_config(config);
            let applied = ctx
                .log
                .apply_override(frame, &decision, reason.as_deref())
                .await?;
            if applied {
                info!(frame, "Override applied");
                Ok(())
            } else {
                anyhow::bail!("no persisted decision for frame {frame}")
            }
        }
        SubCommand::ShowLog { limit } => {
            let ctx = PipelineContext::from_config(config);
            let mut entries = ctx.log.load().await;
            if limit > 0 && entries.len() > limit {
                entries.drain(..entries.len() - limit);
            }
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
    }
}

async fn run_pipeline(
    mut config: AppConfig,
    frames: Option<PathBuf>,
    synthetic: Option<u64>,
    failure_rate: f64,
    batch_size: Option<usize>,
    max_frames: Option<u64>,
) -> Result<()> {
    if let Some(n) = batch_size {
        config.pipeline.batch_size = n;
    }
    if let Some(n) = max_frames {
        config.pipeline.max_frames = n;
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
                cancel.cancel();
            }
        });
    }

    let stats = match (frames, synthetic) {
        (Some(path), None) => {
            let source = JsonlSource::open(&path)
                .with_context(|| format!("failed to open frame source {}", path.display()))?;
            let ctx = Arc::new(PipelineContext::from_config(config));
            Orchestrator::new(ctx, cancel).run(source).await?
        }
        (None, Some(count)) => {
            let source = SyntheticSource::new(count, 0);
            let ctx = Arc::new(
                PipelineContext::from_config(config)
                    .with_analyzers(AnalyzerSet::simulated(failure_rate)),
            );
            Orchestrator::new(ctx, cancel).run(source).await?
        }
        (Some(_), Some(_)) => anyhow::bail!("--frames and --synthetic are mutually exclusive"),
        (None, None) => anyhow::bail!("one of --frames or --synthetic is required"),
    };

    info!(
        frames_seen = stats.frames_seen,
        frames_processed = stats.frames_processed,
        frames_failed = stats.frames_failed,
        reviews = stats.reviews_triggered,
        batches = stats.batches,
        metrics_flushes = stats.metrics_flushes,
        "Run complete"
    );
    Ok(())
}
