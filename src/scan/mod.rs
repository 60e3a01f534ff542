//! Scan submission
//!
//! Capture an image, gate on readiness, upload, interpret, record.

pub mod capture;
pub mod pipeline;
pub mod recorder;
pub mod result;

pub use capture::{CaptureError, CaptureSession, CapturedImage, ImageSource};
pub use pipeline::{DEFAULT_RECORD_TIMEOUT, ScanPipeline, classify_client_error};
pub use recorder::{HistorySummary, JsonlScanStore, RecordError, ScanRecord, ScanRecorder};
pub use result::{Classification, FailureReason, PayloadError, ScanResult, SubmissionOutcome};
