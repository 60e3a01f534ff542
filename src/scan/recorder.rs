//! Scan persistence
//!
//! The pipeline hands every successful result to a [`ScanRecorder`].
//! [`JsonlScanStore`] is the bundled implementation: one JSON object per
//! line, appended to a local file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::result::Classification;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("recorder rejected the scan: {0}")]
    Rejected(String),
}

/// Persistence collaborator for completed scans
#[async_trait]
pub trait ScanRecorder: Send + Sync {
    async fn record_scan(
        &self,
        user_id: &str,
        classification: Classification,
        confidence: f64,
        subject_label: &str,
    ) -> Result<(), RecordError>;
}

/// One persisted scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub user_id: String,
    pub classification: Classification,
    pub confidence: f64,
    pub subject_label: String,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only JSON-lines scan history
#[derive(Debug, Clone)]
pub struct JsonlScanStore {
    path: PathBuf,
}

impl JsonlScanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file and its directory if needed
    pub async fn append(&self, record: &ScanRecord) -> Result<(), RecordError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        debug!(path = %self.path.display(), subject = %record.subject_label, "Recorded scan");
        Ok(())
    }

    /// All stored records, oldest first
    ///
    /// A missing file is an empty history. Lines that fail to parse are
    /// skipped with a warning.
    pub async fn load(&self) -> Result<Vec<ScanRecord>, RecordError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping malformed history line"
                ),
            }
        }
        Ok(records)
    }

    /// Records belonging to one user, newest first
    pub async fn history_for(&self, user_id: &str) -> Result<Vec<ScanRecord>, RecordError> {
        let mut records: Vec<_> = self
            .load()
            .await?
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect();
        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(records)
    }
}

#[async_trait]
impl ScanRecorder for JsonlScanStore {
    async fn record_scan(
        &self,
        user_id: &str,
        classification: Classification,
        confidence: f64,
        subject_label: &str,
    ) -> Result<(), RecordError> {
        let record = ScanRecord {
            user_id: user_id.to_string(),
            classification,
            confidence,
            subject_label: subject_label.to_string(),
            recorded_at: Utc::now(),
        };
        self.append(&record).await
    }
}

/// Counts over a set of scans
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySummary {
    pub total: usize,
    pub fresh: usize,
    pub rotten: usize,
    pub unknown: usize,
    /// Mean confidence, if there is at least one record
    pub average_confidence: Option<f64>,
}

impl HistorySummary {
    pub fn from_records(records: &[ScanRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            match record.classification {
                Classification::Fresh => summary.fresh += 1,
                Classification::Rotten => summary.rotten += 1,
                Classification::Unknown => summary.unknown += 1,
            }
        }
        if !records.is_empty() {
            let sum: f64 = records.iter().map(|r| r.confidence).sum();
            summary.average_confidence = Some(sum / records.len() as f64);
        }
        summary
    }
}
