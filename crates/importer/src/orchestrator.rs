//! The lead import state machine.
//!
//! ```text
//! SelectFile -> MapFields -> Uploading -> Completed
//!      ^                         |
//!      +---- submission error ---+
//! ```
//!
//! `reset` returns to `SelectFile` from any step.

use std::sync::Arc;

use coldreach_core::progress::ImportSummary;
use coldreach_core::types::OperationId;
use coldreach_progress::{ProgressOutcome, ProgressSnapshot, ProgressStreamClient};
use serde::Serialize;
use tokio::sync::watch;

use crate::api::{FieldMapping, JobSubmitter, SubmitResponse};
use crate::error::ImportError;
use crate::file::{detect_columns, validate_file, LeadFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStep {
    SelectFile,
    MapFields,
    Uploading,
    Completed,
}

/// How a finished import ended.
///
/// `summary` is `None` when the server reported completion without
/// counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UploadOutcome {
    Succeeded { summary: Option<ImportSummary> },
    Failed { message: String },
}

/// Drives one lead import at a time.
pub struct UploadOrchestrator {
    submitter: Arc<dyn JobSubmitter>,
    progress: ProgressStreamClient,
    max_file_bytes: u64,
    step: UploadStep,
    file: Option<LeadFile>,
    columns: Vec<String>,
    mapping: FieldMapping,
    operation_id: Option<OperationId>,
    outcome: Option<UploadOutcome>,
    error: Option<String>,
}

impl UploadOrchestrator {
    /// * `progress` - client used to follow submitted imports; owned by
    ///   the orchestrator from here on.
    pub fn new(
        submitter: Arc<dyn JobSubmitter>,
        progress: ProgressStreamClient,
        max_file_bytes: u64,
    ) -> Self {
        Self {
            submitter,
            progress,
            max_file_bytes,
            step: UploadStep::SelectFile,
            file: None,
            columns: Vec::new(),
            mapping: FieldMapping::new(),
            operation_id: None,
            outcome: None,
            error: None,
        }
    }

    pub fn step(&self) -> UploadStep {
        self.step
    }

    pub fn file(&self) -> Option<&LeadFile> {
        self.file.as_ref()
    }

    /// Header columns of the selected file.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    pub fn operation_id(&self) -> Option<&OperationId> {
        self.operation_id.as_ref()
    }

    pub fn outcome(&self) -> Option<&UploadOutcome> {
        self.outcome.as_ref()
    }

    /// Message from the last rejected file or failed submission.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    /// Choose the file to import. An invalid file is rejected and the
    /// previous selection cleared.
    pub fn select_file(&mut self, file: LeadFile) -> Result<(), ImportError> {
        self.expect_step(UploadStep::SelectFile)?;

        if let Err(e) = validate_file(&file.name, file.size(), self.max_file_bytes) {
            tracing::info!(file = %file.name, error = %e, "Lead file rejected");
            self.file = None;
            self.columns.clear();
            self.error = Some(e.to_string());
            return Err(e);
        }

        self.columns = detect_columns(&file.bytes);
        self.file = Some(file);
        self.error = None;
        Ok(())
    }

    /// Accept the selected file and move on to field mapping.
    pub fn confirm_file(&mut self) -> Result<(), ImportError> {
        self.expect_step(UploadStep::SelectFile)?;
        if self.file.is_none() {
            return Err(ImportError::NoFile);
        }
        self.set_step(UploadStep::MapFields);
        Ok(())
    }

    /// Submit the file with `mapping` and start following the import.
    ///
    /// A failed submission returns to `SelectFile` with the error
    /// message kept for display; the selected file stays selected.
    pub async fn confirm_mapping(
        &mut self,
        mapping: FieldMapping,
        credential: &str,
    ) -> Result<(), ImportError> {
        self.expect_step(UploadStep::MapFields)?;
        if self.file.is_none() {
            return Err(ImportError::NoFile);
        }

        self.mapping = mapping;
        self.set_step(UploadStep::Uploading);

        let Some(file) = self.file.as_ref() else {
            return Err(ImportError::NoFile);
        };
        let response = match self.submitter.submit(file, &self.mapping, credential).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(file = %file.name, error = %e, "Lead import submission failed");
                self.error = Some(e.to_string());
                self.set_step(UploadStep::SelectFile);
                return Err(e);
            }
        };

        match response {
            SubmitResponse::Operation(operation_id) => {
                tracing::info!(operation_id = %operation_id, "Lead import accepted");
                self.operation_id = Some(operation_id.clone());
                self.progress.open(operation_id, credential).await;
            }
            SubmitResponse::Completed(summary) => {
                tracing::info!(imported = summary.imported, "Lead import finished synchronously");
                self.finish(UploadOutcome::Succeeded {
                    summary: Some(summary),
                });
            }
        }
        Ok(())
    }

    /// Move to `Completed` if the followed operation has ended.
    ///
    /// Returns the current step. Once completed, the progress client is
    /// closed and its state cleared.
    pub async fn sync_progress(&mut self) -> UploadStep {
        if self.step != UploadStep::Uploading {
            return self.step;
        }
        let snapshot = self.progress.snapshot();
        if let Some(outcome) = outcome_from(&snapshot.outcome) {
            self.finish(outcome);
            self.progress.close().await;
        }
        self.step
    }

    /// Wait until the import ends and return its outcome.
    pub async fn wait_for_completion(&mut self) -> Result<UploadOutcome, ImportError> {
        if self.step == UploadStep::Uploading {
            let mut rx = self.progress.subscribe();
            rx.wait_for(|s| s.outcome.is_terminal())
                .await
                .map_err(|_| ImportError::ProgressUnavailable)?;
            self.sync_progress().await;
        }

        match (&self.step, &self.outcome) {
            (UploadStep::Completed, Some(outcome)) => Ok(outcome.clone()),
            (actual, _) => Err(ImportError::InvalidStep {
                expected: UploadStep::Uploading,
                actual: *actual,
            }),
        }
    }

    /// Start over with a new file.
    ///
    /// Stops any progress tracking and clears every derived value.
    pub async fn reset(&mut self) {
        self.progress.close().await;
        self.file = None;
        self.columns.clear();
        self.mapping.clear();
        self.operation_id = None;
        self.outcome = None;
        self.error = None;
        self.set_step(UploadStep::SelectFile);
    }

    fn finish(&mut self, outcome: UploadOutcome) {
        match &outcome {
            UploadOutcome::Succeeded {
                summary: Some(summary),
            } => tracing::info!(
                imported = summary.imported,
                duplicates_removed = summary.duplicates_removed,
                errors = summary.errors,
                "Lead import completed",
            ),
            UploadOutcome::Succeeded { summary: None } => {
                tracing::info!("Lead import completed without a summary")
            }
            UploadOutcome::Failed { message } => {
                tracing::warn!(reason = %message, "Lead import failed")
            }
        }
        self.outcome = Some(outcome);
        self.set_step(UploadStep::Completed);
    }

    fn set_step(&mut self, step: UploadStep) {
        tracing::debug!(from = ?self.step, to = ?step, "Upload step changed");
        self.step = step;
    }

    fn expect_step(&self, expected: UploadStep) -> Result<(), ImportError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(ImportError::InvalidStep {
                expected,
                actual: self.step,
            })
        }
    }
}

fn outcome_from(progress: &ProgressOutcome) -> Option<UploadOutcome> {
    match progress {
        ProgressOutcome::Pending => None,
        ProgressOutcome::Succeeded { result } => Some(UploadOutcome::Succeeded { summary: *result }),
        ProgressOutcome::Failed { message } => Some(UploadOutcome::Failed {
            message: message.clone(),
        }),
        ProgressOutcome::TimedOut => Some(UploadOutcome::Failed {
            message: "Timed out waiting for the import to finish".into(),
        }),
    }
}
