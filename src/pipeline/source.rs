//! Frame source abstraction for pipeline ingestion.
//!
//! Provides a unified trait for producing frames from different sources:
//! JSON-lines capture files (replay) and synthetic generation (simulation).
//! Sources yield a lazy, finite sequence; a fresh source is built for each
//! pipeline invocation.

use crate::types::{Frame, FramePayload};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use tracing::{debug, warn};

/// Events produced by a frame source.
pub enum FrameEvent {
    /// A frame was read.
    Frame(Frame),
    /// Source reached end of data.
    Eof,
}

/// Trait abstracting where frames come from.
///
/// The orchestrator calls [`next_frame`](FrameSource::next_frame) until
/// `Eof` and guarantees [`release`](FrameSource::release) runs exactly once
/// on every exit path.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Read the next frame from the source.
    ///
    /// Returns `FrameEvent::Eof` when no more data is available.
    /// Returns `Err` on unrecoverable source errors.
    async fn next_frame(&mut self) -> Result<FrameEvent>;

    /// Human-readable name for logging (e.g. "jsonl", "synthetic").
    fn source_name(&self) -> &str;

    /// Release underlying resources. Called exactly once by the
    /// orchestrator; default is a no-op for sources without handles.
    fn release(&mut self) {}
}

// ============================================================================
// JSONL Source (capture file replay)
// ============================================================================

/// Reads frames from a JSON-lines file, one `Frame` object per line.
///
/// Opening the file is the fatal-init boundary: a missing or unreadable
/// file aborts the run before any frame is processed. Malformed lines
/// after that are skipped with a warning.
pub struct JsonlSource {
    lines: std::vec::IntoIter<String>,
}

impl JsonlSource {
    pub fn open(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("could not open frame source {}", path.display()))?;
        let lines: Vec<String> = contents.lines().map(str::to_string).collect();
        debug!(path = %path.display(), lines = lines.len(), "Opened JSONL frame source");
        Ok(Self {
            lines: lines.into_iter(),
        })
    }
}

#[async_trait]
impl FrameSource for JsonlSource {
    async fn next_frame(&mut self) -> Result<FrameEvent> {
        for line in self.lines.by_ref() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Frame>(trimmed) {
                Ok(frame) => return Ok(FrameEvent::Frame(frame)),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed frame line");
                }
            }
        }
        Ok(FrameEvent::Eof)
    }

    fn source_name(&self) -> &str {
        "jsonl"
    }

    fn release(&mut self) {
        // Drop the remaining buffered lines; the file handle itself was
        // already closed after the initial read.
        self.lines = Vec::new().into_iter();
        debug!("JSONL frame source released");
    }
}

// ============================================================================
// Synthetic Source (simulation)
// ============================================================================

/// Generates frames with increasing numbers, for simulation runs and tests.
pub struct SyntheticSource {
    next_number: u64,
    remaining: u64,
    delay_ms: u64,
}

impl SyntheticSource {
    pub fn new(count: u64, delay_ms: u64) -> Self {
        Self {
            next_number: 1,
            remaining: count,
            delay_ms,
        }
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn next_frame(&mut self) -> Result<FrameEvent> {
        if self.remaining == 0 {
            return Ok(FrameEvent::Eof);
        }
        if self.delay_ms > 0 && self.next_number > 1 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        let number = self.next_number;
        self.next_number += 1;
        self.remaining -= 1;
        Ok(FrameEvent::Frame(Frame {
            number,
            captured_at: Utc::now(),
            payload: FramePayload::CaptureId(format!("synthetic-{number}")),
        }))
    }

    fn source_name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn synthetic_source_is_finite() {
        let mut source = SyntheticSource::new(3, 0);
        let mut numbers = Vec::new();
        loop {
            match source.next_frame().await.unwrap() {
                FrameEvent::Frame(f) => numbers.push(f.number),
                FrameEvent::Eof => break,
            }
        }
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn jsonl_source_skips_malformed_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"number":1,"captured_at":"2025-01-01T00:00:00Z","payload":{{"capture_id":"a"}}}}"#
        )
        .unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(
            file,
            r#"{{"number":2,"captured_at":"2025-01-01T00:00:01Z","payload":{{"capture_id":"b"}}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let mut source = JsonlSource::open(file.path()).unwrap();
        let mut numbers = Vec::new();
        loop {
            match source.next_frame().await.unwrap() {
                FrameEvent::Frame(f) => numbers.push(f.number),
                FrameEvent::Eof => break,
            }
        }
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn jsonl_source_open_fails_on_missing_file() {
        assert!(JsonlSource::open(Path::new("/nonexistent/frames.jsonl")).is_err());
    }
}
