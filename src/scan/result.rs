//! Scan results and submission outcomes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::PredictResponse;

/// Freshness verdict for a scanned item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Fresh,
    Rotten,
    Unknown,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Fresh => write!(f, "fresh"),
            Classification::Rotten => write!(f, "rotten"),
            Classification::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for Classification {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fresh" => Ok(Classification::Fresh),
            "rotten" => Ok(Classification::Rotten),
            "unknown" => Ok(Classification::Unknown),
            other => Err(PayloadError::UnknownClassification(other.to_string())),
        }
    }
}

/// Ways a prediction body can violate the service contract
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("unknown classification label {0:?}")]
    UnknownClassification(String),

    #[error("confidence {0} is outside 0-100")]
    ConfidenceOutOfRange(f64),

    #[error("subject label is empty")]
    MissingSubject,
}

fn check_confidence(value: f64) -> Result<f64, PayloadError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(PayloadError::ConfidenceOutOfRange(value))
    }
}

/// Interpreted outcome of one successful prediction
///
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    classification: Classification,
    confidence: f64,
    subject_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject_confidence: Option<f64>,
}

impl ScanResult {
    pub fn new(
        classification: Classification,
        confidence: f64,
        subject_label: impl Into<String>,
    ) -> Self {
        Self {
            classification,
            confidence,
            subject_label: subject_label.into(),
            subject_confidence: None,
        }
    }

    /// Validate a prediction body
    ///
    /// Unknown labels are rejected rather than defaulted.
    pub fn from_response(response: PredictResponse) -> Result<Self, PayloadError> {
        let classification = response.result.parse()?;
        let confidence = check_confidence(response.confidence)?;
        let subject_label = response.fruit_type.trim().to_string();
        if subject_label.is_empty() {
            return Err(PayloadError::MissingSubject);
        }
        let subject_confidence = response.fruit_confidence.map(check_confidence).transpose()?;

        Ok(Self {
            classification,
            confidence,
            subject_label,
            subject_confidence,
        })
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// Percent, 0-100
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn subject_label(&self) -> &str {
        &self.subject_label
    }

    pub fn subject_confidence(&self) -> Option<f64> {
        self.subject_confidence
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) - confidence {:.1}%",
            self.classification.to_string().to_uppercase(),
            self.subject_label,
            self.confidence
        )
    }
}

/// Why a submission did not produce a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", content = "status", rename_all = "snake_case")]
pub enum FailureReason {
    /// The readiness gate rejected the attempt before any upload
    #[error("service not ready")]
    NotReady,

    /// The upload never got an HTTP response
    #[error("network error")]
    NetworkError,

    /// The service responded with a non-success status
    #[error("server error (status {0})")]
    ServerError(u16),

    /// Empty image, or a response that breaks the service contract
    #[error("invalid payload")]
    InvalidPayload,
}

impl FailureReason {
    /// Whether trying again later can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureReason::NotReady | FailureReason::NetworkError)
    }

    /// Stable short name, used for metrics labels
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::NotReady => "not_ready",
            FailureReason::NetworkError => "network_error",
            FailureReason::ServerError(_) => "server_error",
            FailureReason::InvalidPayload => "invalid_payload",
        }
    }

    /// Text suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            FailureReason::NotReady => {
                "The analysis service is not ready yet. Please wait a moment and try again.".into()
            }
            FailureReason::NetworkError => {
                "Could not connect to the analysis service. Check your connection and try again."
                    .into()
            }
            FailureReason::ServerError(status) => {
                format!("The analysis service responded with {status}.")
            }
            FailureReason::InvalidPayload => "Scan failed. Please try again with another photo.".into(),
        }
    }
}

/// Result of one submission attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Success(ScanResult),
    Failure(FailureReason),
}

impl SubmissionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmissionOutcome::Success(_))
    }

    pub fn result(&self) -> Option<&ScanResult> {
        match self {
            SubmissionOutcome::Success(result) => Some(result),
            SubmissionOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<FailureReason> {
        match self {
            SubmissionOutcome::Success(_) => None,
            SubmissionOutcome::Failure(reason) => Some(*reason),
        }
    }

    pub fn into_result(self) -> Result<ScanResult, FailureReason> {
        match self {
            SubmissionOutcome::Success(result) => Ok(result),
            SubmissionOutcome::Failure(reason) => Err(reason),
        }
    }
}
