//! HTTP adapter for a single external analyzer endpoint.

use super::Analyzer;
use crate::types::{
    AnalysisOutcome, AnalysisResult, AnalyzerFailure, AnalyzerKind, AnalyzerScores,
    ContactScores, ContextScores, Frame, FramePayload, PoseScores,
};
use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::warn;

/// Request body sent to every analyzer endpoint.
#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    frame: u64,
    payload: &'a FramePayload,
}

/// Calls one analyzer over HTTP with a bounded timeout.
///
/// The response body must deserialize into exactly the score record for
/// this adapter's category; extra fields or a wrong-category record are
/// reported as typed failures, never threaded through.
pub struct HttpAnalyzer {
    kind: AnalyzerKind,
    url: String,
    timeout_secs: u64,
    http: reqwest::Client,
}

impl HttpAnalyzer {
    pub fn new(kind: AnalyzerKind, url: &str, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            kind,
            url: url.to_string(),
            timeout_secs,
            http,
        }
    }

    async fn call(&self, frame: &Frame) -> Result<AnalyzerScores, AnalyzerFailure> {
        let request = AnalyzeRequest {
            frame: frame.number,
            payload: &frame.payload,
        };

        let send = self.http.post(&self.url).json(&request).send();
        let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), send)
            .await
            .map_err(|_| AnalyzerFailure::Timeout(self.timeout_secs))?
            .map_err(|e| {
                if e.is_timeout() {
                    AnalyzerFailure::Timeout(self.timeout_secs)
                } else {
                    AnalyzerFailure::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalyzerFailure::Http(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AnalyzerFailure::Transport(e.to_string()))?;

        // Strict per-kind deserialization: unknown fields are rejected at
        // this boundary (deny_unknown_fields on the score records).
        let scores = match self.kind {
            AnalyzerKind::Pose => serde_json::from_slice::<PoseScores>(&body)
                .map(AnalyzerScores::Pose),
            AnalyzerKind::Contact => serde_json::from_slice::<ContactScores>(&body)
                .map(AnalyzerScores::Contact),
            AnalyzerKind::Context => serde_json::from_slice::<ContextScores>(&body)
                .map(AnalyzerScores::Context),
        }
        .map_err(|e| AnalyzerFailure::InvalidPayload(e.to_string()))?;

        if scores.kind() != self.kind {
            return Err(AnalyzerFailure::KindMismatch);
        }
        Ok(scores)
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        self.kind
    }

    async fn analyze(&self, frame: &Frame) -> AnalysisResult {
        let started = Instant::now();
        let outcome = match self.call(frame).await {
            Ok(scores) => AnalysisOutcome::Scores(scores),
            Err(failure) => {
                warn!(
                    analyzer = %self.kind,
                    frame = frame.number,
                    error = %failure,
                    "Analyzer call failed"
                );
                AnalysisOutcome::Failed(failure)
            }
        };

        AnalysisResult {
            kind: self.kind,
            frame: frame.number,
            outcome,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }
}
