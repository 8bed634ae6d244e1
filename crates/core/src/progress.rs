//! Progress payloads shared by the push and poll transports.
//!
//! Both the Server-Sent Events stream and the poll endpoint deliver the
//! same JSON shape:
//!
//! ```json
//! {"progress": 42, "message": "Importing", "batch": {"current": 2, "total": 3}}
//! ```
//!
//! `progress` is a percentage in `[0, 100]`, or the `-1` sentinel for a
//! failed operation. Either `100` or `-1` ends the operation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Progress value reported once an operation has finished successfully.
pub const PROGRESS_COMPLETE: f64 = 100.0;

/// Sentinel progress value reported when an operation has failed.
pub const PROGRESS_FAILED: f64 = -1.0;

/// Position of the current batch within a multi-batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
    /// 1-based index of the batch being processed.
    pub current: u32,
    /// Total number of batches in the job.
    pub total: u32,
}

/// Final counters of a lead import, delivered either synchronously by
/// the submission endpoint or on the terminal progress event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: u64,
    #[serde(default)]
    pub duplicates_removed: u64,
    #[serde(default)]
    pub errors: u64,
}

impl ImportSummary {
    /// Imported and failed rows together never exceed the submitted rows.
    pub fn is_consistent(&self, total_rows: u64) -> bool {
        self.imported.saturating_add(self.errors) <= total_rows
    }
}

/// One progress report for an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Percentage complete, or [`PROGRESS_FAILED`].
    pub progress: f64,
    /// Human-readable status line.
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchInfo>,
    /// Import counters, present on a terminal success event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ImportSummary>,
    /// Server-side emission time, when the server provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

impl ProgressEvent {
    pub fn new(progress: f64, message: impl Into<String>) -> Self {
        Self {
            progress,
            message: message.into(),
            batch: None,
            result: None,
            timestamp: None,
        }
    }

    pub fn with_batch(mut self, current: u32, total: u32) -> Self {
        self.batch = Some(BatchInfo { current, total });
        self
    }

    pub fn with_result(mut self, result: ImportSummary) -> Self {
        self.result = Some(result);
        self
    }

    /// `true` for a completed (`>= 100`) or failed (`-1`) operation.
    pub fn is_terminal(&self) -> bool {
        self.progress >= PROGRESS_COMPLETE || self.is_failure()
    }

    pub fn is_failure(&self) -> bool {
        self.progress == PROGRESS_FAILED
    }
}

/// Parse a progress payload from either transport.
///
/// Rejects non-numeric JSON as well as progress values that are not
/// finite or are negative without being the failure sentinel.
pub fn parse_progress(text: &str) -> Result<ProgressEvent, CoreError> {
    let event: ProgressEvent =
        serde_json::from_str(text).map_err(|e| CoreError::MalformedPayload(e.to_string()))?;

    if !event.progress.is_finite() || (event.progress < 0.0 && !event.is_failure()) {
        return Err(CoreError::MalformedPayload(format!(
            "progress out of range: {}",
            event.progress
        )));
    }

    Ok(event)
}
