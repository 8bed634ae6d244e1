//! Transport selection for a progress operation.
//!
//! The client never branches on transport failures inline; it asks the
//! [`TransportPolicy`] which strategy comes next.

use serde::Serialize;

/// How progress for an operation is being received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportStrategy {
    /// Server-Sent Events push stream.
    Stream,
    /// Fixed-interval requests to the poll endpoint.
    Poll,
}

/// Chooses the first transport and the fallback after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportPolicy {
    prefer_stream: bool,
}

impl TransportPolicy {
    /// Stream first, poll on failure.
    pub fn stream_with_poll_fallback() -> Self {
        Self {
            prefer_stream: true,
        }
    }

    /// Skip the push stream entirely, for environments where SSE is blocked.
    pub fn poll_only() -> Self {
        Self {
            prefer_stream: false,
        }
    }

    pub fn initial(&self) -> TransportStrategy {
        if self.prefer_stream {
            TransportStrategy::Stream
        } else {
            TransportStrategy::Poll
        }
    }

    /// The strategy to switch to after `failed` stopped working, or
    /// `None` when there is nothing left to fall back to.
    pub fn after_failure(&self, failed: TransportStrategy) -> Option<TransportStrategy> {
        match failed {
            TransportStrategy::Stream => Some(TransportStrategy::Poll),
            TransportStrategy::Poll => None,
        }
    }
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self::stream_with_poll_fallback()
    }
}
