//! Lead file upload flow.
//!
//! [`UploadOrchestrator`] walks a lead import through
//! `SelectFile -> MapFields -> Uploading -> Completed`: it validates the
//! file, submits it with the column mapping through a [`JobSubmitter`],
//! and follows the returned operation with a progress client until the
//! import finishes.

pub mod api;
pub mod batches;
pub mod error;
pub mod file;
pub mod orchestrator;

pub use api::{FieldMapping, HttpImportApi, JobSubmitter, SubmitResponse};
pub use batches::batch_sizes;
pub use error::ImportError;
pub use file::{detect_columns, validate_file, LeadFile};
pub use orchestrator::{UploadOrchestrator, UploadOutcome, UploadStep};
