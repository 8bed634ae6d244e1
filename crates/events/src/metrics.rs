//! Connection health exposed by the event bus client.

use coldreach_core::types::Timestamp;
use serde::Serialize;

/// Lifecycle of the bus connection.
///
/// `Idle -> Connecting -> Open -> (Error -> Reconnecting -> Connecting)* -> Closed`.
/// `Closed` is reached only through explicit disposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BusStatus {
    Idle,
    Connecting,
    Open,
    Error,
    Reconnecting,
    Closed,
}

/// Point-in-time health of the session's bus connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusMetrics {
    pub status: BusStatus,
    /// Events dispatched since the client was created. Each event inside
    /// a `progress_batch` counts once; the envelope does not.
    pub total_events: u64,
    /// Most recent latency estimate from the heartbeat exchange.
    pub latency_ms: Option<u64>,
    /// Failed connection attempts since the last successful connect.
    pub reconnect_attempts: u32,
    pub connected_at: Option<Timestamp>,
    pub last_event_at: Option<Timestamp>,
}

impl Default for BusMetrics {
    fn default() -> Self {
        Self {
            status: BusStatus::Idle,
            total_events: 0,
            latency_ms: None,
            reconnect_attempts: 0,
            connected_at: None,
            last_event_at: None,
        }
    }
}
