//! API State management
//!
//! Shared state for the status API: the scan pipeline (and through it the
//! readiness monitor) plus counters over submissions made via the API.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::readiness::{ReadinessMonitor, ReadinessState};
use crate::scan::{FailureReason, ScanPipeline, ScanResult, SubmissionOutcome};

/// Counters over submissions handled by the API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionStats {
    pub total: u64,
    pub succeeded: u64,
    pub not_ready: u64,
    pub network_error: u64,
    pub server_error: u64,
    pub invalid_payload: u64,
}

impl SubmissionStats {
    fn record(&mut self, outcome: &SubmissionOutcome) {
        self.total += 1;
        match outcome {
            SubmissionOutcome::Success(_) => self.succeeded += 1,
            SubmissionOutcome::Failure(FailureReason::NotReady) => self.not_ready += 1,
            SubmissionOutcome::Failure(FailureReason::NetworkError) => self.network_error += 1,
            SubmissionOutcome::Failure(FailureReason::ServerError(_)) => self.server_error += 1,
            SubmissionOutcome::Failure(FailureReason::InvalidPayload) => self.invalid_payload += 1,
        }
    }

    /// (outcome label, count) pairs in a stable order
    pub fn by_outcome(&self) -> [(&'static str, u64); 5] {
        [
            ("success", self.succeeded),
            (FailureReason::NotReady.label(), self.not_ready),
            (FailureReason::NetworkError.label(), self.network_error),
            (FailureReason::ServerError(0).label(), self.server_error),
            (FailureReason::InvalidPayload.label(), self.invalid_payload),
        ]
    }
}

#[derive(Debug)]
struct InnerState {
    stats: SubmissionStats,
    last_result: Option<ScanResult>,
}

/// Shared API state
#[derive(Debug, Clone)]
pub struct ApiState {
    pipeline: ScanPipeline,
    started_at: Instant,
    inner: Arc<RwLock<InnerState>>,
}

impl ApiState {
    pub fn new(pipeline: ScanPipeline) -> Self {
        Self {
            pipeline,
            started_at: Instant::now(),
            inner: Arc::new(RwLock::new(InnerState {
                stats: SubmissionStats::default(),
                last_result: None,
            })),
        }
    }

    pub fn monitor(&self) -> &ReadinessMonitor {
        self.pipeline.monitor()
    }

    pub fn pipeline(&self) -> &ScanPipeline {
        &self.pipeline
    }

    /// Count a finished submission
    pub fn record_outcome(&self, outcome: &SubmissionOutcome) {
        let mut state = self.inner.write();
        state.stats.record(outcome);
        if let SubmissionOutcome::Success(result) = outcome {
            state.last_result = Some(result.clone());
        }
    }

    pub fn stats(&self) -> SubmissionStats {
        self.inner.read().stats.clone()
    }

    pub fn last_result(&self) -> Option<ScanResult> {
        self.inner.read().last_result.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub readiness: ReadinessState,
}

/// Scan response
#[derive(Debug, Clone, Serialize)]
pub struct ScanResponse {
    pub outcome: SubmissionOutcome,
    /// User-facing text for a failed submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<SubmissionOutcome> for ScanResponse {
    fn from(outcome: SubmissionOutcome) -> Self {
        let message = outcome.failure().map(|reason| reason.user_message());
        Self { outcome, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::Classification;

    #[test]
    fn test_stats_by_outcome() {
        let mut stats = SubmissionStats::default();
        stats.record(&SubmissionOutcome::Success(ScanResult::new(
            Classification::Fresh,
            90.0,
            "apple",
        )));
        stats.record(&SubmissionOutcome::Failure(FailureReason::ServerError(500)));
        stats.record(&SubmissionOutcome::Failure(FailureReason::ServerError(502)));
        stats.record(&SubmissionOutcome::Failure(FailureReason::NotReady));

        assert_eq!(stats.total, 4);
        let counts = stats.by_outcome();
        assert_eq!(counts[0], ("success", 1));
        assert_eq!(counts[1], ("not_ready", 1));
        assert_eq!(counts[3], ("server_error", 2));
        assert_eq!(counts[4], ("invalid_payload", 0));
    }

    #[test]
    fn test_scan_response_message() {
        let failed = ScanResponse::from(SubmissionOutcome::Failure(FailureReason::ServerError(503)));
        assert!(failed.message.unwrap().contains("503"));

        let ok = ScanResponse::from(SubmissionOutcome::Success(ScanResult::new(
            Classification::Rotten,
            80.0,
            "pear",
        )));
        assert!(ok.message.is_none());
    }
}
