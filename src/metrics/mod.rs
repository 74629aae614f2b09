//! Metrics Tracker.
//!
//! Accumulates per-frame timing and outcome samples under a single mutex
//! and flushes batch aggregates to a timestamped JSON file. `flush()` swaps
//! the accumulator out under the lock and does file I/O afterwards, so it
//! never blocks concurrent `record()` calls for longer than the swap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// One processed frame's timings and outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSample {
    pub frame: u64,
    pub total_ms: f64,
    pub pose_ms: f64,
    pub contact_ms: f64,
    pub context_ms: f64,
    pub certainty_score: f64,
    pub review_required: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregates over one flush window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMetrics {
    pub total_frames: usize,
    pub avg_processing_ms: f64,
    pub avg_pose_ms: f64,
    pub avg_contact_ms: f64,
    pub avg_context_ms: f64,
    pub avg_certainty_score: f64,
    pub review_count: usize,
    pub review_rate_percent: f64,
    pub timestamp: DateTime<Utc>,
}

/// Flushed record: aggregates plus the raw samples behind them.
#[derive(Debug, Serialize, Deserialize)]
struct MetricsRecord {
    batch_metrics: BatchMetrics,
    frame_metrics: Vec<FrameSample>,
}

pub struct MetricsTracker {
    samples: Mutex<Vec<FrameSample>>,
    dir: PathBuf,
    enabled: bool,
}

impl MetricsTracker {
    pub fn new(dir: &Path, enabled: bool) -> Self {
        Self {
            samples: Mutex::new(Vec::new()),
            dir: dir.to_path_buf(),
            enabled,
        }
    }

    /// Record one sample. Lock held only for the push.
    pub fn record(&self, sample: FrameSample) {
        if !self.enabled {
            return;
        }
        if let Ok(mut samples) = self.samples.lock() {
            samples.push(sample);
        }
    }

    /// Number of samples currently accumulated.
    pub fn pending(&self) -> usize {
        self.samples.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Compute aggregates, write one timestamped record, clear the
    /// accumulator. Returns the written path, or `None` when there was
    /// nothing to flush (or metrics are disabled).
    pub fn flush(&self) -> anyhow::Result<Option<PathBuf>> {
        if !self.enabled {
            return Ok(None);
        }

        // Swap the accumulator out so file I/O happens outside the lock.
        let samples = {
            let mut guard = self
                .samples
                .lock()
                .map_err(|_| anyhow::anyhow!("metrics accumulator poisoned"))?;
            std::mem::take(&mut *guard)
        };
        if samples.is_empty() {
            return Ok(None);
        }

        let record = MetricsRecord {
            batch_metrics: aggregate(&samples),
            frame_metrics: samples,
        };

        std::fs::create_dir_all(&self.dir)?;
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
        let path = self.dir.join(format!("processing_metrics_{timestamp}.json"));
        std::fs::write(&path, serde_json::to_vec_pretty(&record)?)?;

        info!(
            path = %path.display(),
            frames = record.batch_metrics.total_frames,
            review_rate = record.batch_metrics.review_rate_percent,
            "Metrics flushed"
        );
        Ok(Some(path))
    }
}

fn aggregate(samples: &[FrameSample]) -> BatchMetrics {
    let n = samples.len();
    let mean = |f: fn(&FrameSample) -> f64| samples.iter().map(f).sum::<f64>() / n as f64;
    let review_count = samples.iter().filter(|s| s.review_required).count();

    BatchMetrics {
        total_frames: n,
        avg_processing_ms: mean(|s| s.total_ms),
        avg_pose_ms: mean(|s| s.pose_ms),
        avg_contact_ms: mean(|s| s.contact_ms),
        avg_context_ms: mean(|s| s.context_ms),
        avg_certainty_score: mean(|s| s.certainty_score),
        review_count,
        review_rate_percent: review_count as f64 / n as f64 * 100.0,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(frame: u64, certainty: f64, review: bool) -> FrameSample {
        FrameSample {
            frame,
            total_ms: 20.0,
            pose_ms: 10.0,
            contact_ms: 5.0,
            context_ms: 5.0,
            certainty_score: certainty,
            review_required: review,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn flush_writes_aggregates_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = MetricsTracker::new(dir.path(), true);

        tracker.record(sample(1, 96.0, false));
        tracker.record(sample(2, 90.0, true));
        tracker.record(sample(3, 90.0, true));
        assert_eq!(tracker.pending(), 3);

        let path = tracker.flush().unwrap().expect("record written");
        assert_eq!(tracker.pending(), 0);

        let body = std::fs::read_to_string(path).unwrap();
        let record: serde_json::Value = serde_json::from_str(&body).unwrap();
        let batch = &record["batch_metrics"];
        assert_eq!(batch["total_frames"], 3);
        assert_eq!(batch["review_count"], 2);
        let mean = batch["avg_certainty_score"].as_f64().unwrap();
        assert!((mean - 92.0).abs() < 1e-9);
        let rate = batch["review_rate_percent"].as_f64().unwrap();
        assert!((rate - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_flush_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = MetricsTracker::new(dir.path(), true);
        assert!(tracker.flush().unwrap().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn disabled_tracker_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = MetricsTracker::new(dir.path(), false);
        tracker.record(sample(1, 96.0, false));
        assert_eq!(tracker.pending(), 0);
        assert!(tracker.flush().unwrap().is_none());
    }

    #[test]
    fn concurrent_record_during_flush() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = std::sync::Arc::new(MetricsTracker::new(dir.path(), true));
        for i in 0..50 {
            tracker.record(sample(i, 95.0, false));
        }

        let recorder = {
            let tracker = tracker.clone();
            std::thread::spawn(move || {
                for i in 50..100 {
                    tracker.record(sample(i, 95.0, false));
                }
            })
        };
        let flushed = tracker.flush().unwrap();
        recorder.join().unwrap();
        assert!(flushed.is_some());

        // Whatever raced past the flush is still waiting for the next one.
        let remaining = tracker.pending();
        let second = tracker.flush().unwrap();
        assert_eq!(second.is_some(), remaining > 0);
    }
}
