use coldreach_core::error::CoreError;

use crate::orchestrator::UploadStep;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Only .csv files can be imported, got {name}")]
    UnsupportedFile { name: String },

    #[error("File is {size} bytes, the limit is {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("File is empty")]
    EmptyFile,

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Import API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected submission response: {0}")]
    UnexpectedResponse(String),

    #[error("Cannot do that while in step {actual:?}, expected {expected:?}")]
    InvalidStep {
        expected: UploadStep,
        actual: UploadStep,
    },

    #[error("No file selected")]
    NoFile,

    #[error("Progress tracking ended unexpectedly")]
    ProgressUnavailable,

    #[error(transparent)]
    Core(#[from] CoreError),
}
