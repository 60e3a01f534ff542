//! Scan submission pipeline
//!
//! Takes a held image through gate, upload, interpretation and recording.
//! The readiness gate always performs its own probe immediately before the
//! upload, so a multi-megabyte payload is never sent to a service that has
//! gone away since the monitor last looked.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{ClientError, InferenceClient};
use crate::readiness::{LivenessProbe, ReadinessMonitor, ReadinessState};

use super::capture::CapturedImage;
use super::recorder::ScanRecorder;
use super::result::{FailureReason, ScanResult, SubmissionOutcome};

/// Default bound on the persistence call after a successful scan
pub const DEFAULT_RECORD_TIMEOUT: Duration = Duration::from_secs(10);

/// Submits captured images to the inference service
#[derive(Clone)]
pub struct ScanPipeline {
    client: InferenceClient,
    probe: Arc<dyn LivenessProbe>,
    monitor: ReadinessMonitor,
    recorder: Arc<dyn ScanRecorder>,
    user_id: String,
    record_timeout: Duration,
    /// Recordings still running in the background
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl std::fmt::Debug for ScanPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanPipeline")
            .field("base_url", &self.client.base_url().as_str())
            .field("user_id", &self.user_id)
            .field("record_timeout", &self.record_timeout)
            .finish_non_exhaustive()
    }
}

impl ScanPipeline {
    /// Create a pipeline that gates on the client's own health probe
    pub fn new(
        client: InferenceClient,
        monitor: ReadinessMonitor,
        recorder: Arc<dyn ScanRecorder>,
        user_id: impl Into<String>,
    ) -> Self {
        let probe: Arc<dyn LivenessProbe> = Arc::new(client.clone());
        Self {
            client,
            probe,
            monitor,
            recorder,
            user_id: user_id.into(),
            record_timeout: DEFAULT_RECORD_TIMEOUT,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replace the probe used by the readiness gate
    pub fn with_probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_record_timeout(mut self, timeout: Duration) -> Self {
        self.record_timeout = timeout;
        self
    }

    pub fn record_timeout(&self) -> Duration {
        self.record_timeout
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn monitor(&self) -> &ReadinessMonitor {
        &self.monitor
    }

    /// Run one submission
    ///
    /// Never panics and never returns an error: every failure is reported
    /// as a [`FailureReason`]. A successful result is returned as soon as it
    /// is interpreted; recording continues in the background.
    pub async fn submit(&self, image: &CapturedImage) -> SubmissionOutcome {
        if image.is_empty() {
            warn!("Refusing to submit an empty image");
            return SubmissionOutcome::Failure(FailureReason::InvalidPayload);
        }

        if let Err(reason) = self.check_gate().await {
            return SubmissionOutcome::Failure(reason);
        }

        let content_type = image.content_type();
        info!(
            bytes = image.len(),
            source = %image.source(),
            content_type,
            "Submitting scan"
        );

        let response = match self.client.predict(image.to_payload(), content_type).await {
            Ok(response) => response,
            Err(e) => {
                let reason = classify_client_error(&e);
                warn!(error = %e, reason = reason.label(), "Scan upload failed");
                return SubmissionOutcome::Failure(reason);
            }
        };

        let result = match ScanResult::from_response(response) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Service returned an unusable prediction");
                return SubmissionOutcome::Failure(FailureReason::InvalidPayload);
            }
        };

        info!(
            classification = %result.classification(),
            confidence = result.confidence(),
            subject = result.subject_label(),
            "Scan complete"
        );

        self.spawn_record(&result);
        SubmissionOutcome::Success(result)
    }

    /// Probe the service directly before paying for an upload
    async fn check_gate(&self) -> Result<(), FailureReason> {
        let believed = self.monitor.state();
        match self.probe.probe().await {
            Ok(()) => {
                debug!(monitor_state = %believed, "Readiness gate passed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, monitor_state = %believed, "Readiness gate failed, not uploading");
                if believed == ReadinessState::Ready {
                    self.monitor.report_probe_failure();
                }
                Err(FailureReason::NotReady)
            }
        }
    }

    /// Hand a result to the recorder in the background
    ///
    /// Failures and timeouts are logged, never surfaced.
    fn spawn_record(&self, result: &ScanResult) {
        let recorder = Arc::clone(&self.recorder);
        let user_id = self.user_id.clone();
        let timeout = self.record_timeout;
        let classification = result.classification();
        let confidence = result.confidence();
        let subject_label = result.subject_label().to_string();

        let handle = tokio::spawn(async move {
            let call = recorder.record_scan(&user_id, classification, confidence, &subject_label);
            match tokio::time::timeout(timeout, call).await {
                Ok(Ok(())) => debug!(user_id = %user_id, "Scan recorded"),
                Ok(Err(e)) => warn!(user_id = %user_id, error = %e, "Failed to record scan"),
                Err(_) => warn!(
                    user_id = %user_id,
                    timeout_ms = timeout.as_millis(),
                    "Recording scan timed out"
                ),
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }

    /// Wait for background recordings started by earlier submissions
    ///
    /// Each one is bounded by the record timeout.
    pub async fn flush_records(&self) {
        let handles = std::mem::take(&mut *self.pending.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Recording task did not complete");
            }
        }
    }
}

/// Map a client error onto the submission taxonomy
pub fn classify_client_error(err: &ClientError) -> FailureReason {
    match err {
        ClientError::Status { status, .. } => FailureReason::ServerError(*status),
        ClientError::UnexpectedResponse(_) => FailureReason::InvalidPayload,
        ClientError::Request(e) if e.is_decode() => FailureReason::InvalidPayload,
        ClientError::Request(_) | ClientError::InvalidUrl(_) | ClientError::UnsupportedScheme(_) => {
            FailureReason::NetworkError
        }
    }
}
