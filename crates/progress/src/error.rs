use coldreach_core::error::CoreError;

/// Errors raised inside the progress transports.
///
/// None of these leave [`crate::ProgressStreamClient`]: transport
/// failures drive the fallback policy and malformed payloads are logged
/// and skipped.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// The push stream or a poll request failed at the connection level.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The progress endpoint returned a non-2xx status code.
    #[error("Progress endpoint error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The poll fallback reached its attempt cap without a terminal event.
    #[error("No terminal progress after {0} poll attempts")]
    PollAttemptsExhausted(u32),

    #[error(transparent)]
    Core(#[from] CoreError),
}
