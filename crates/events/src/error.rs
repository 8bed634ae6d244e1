use coldreach_core::error::CoreError;

/// Errors from the event bus connection.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A send or receive failed on an established connection.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server closed the connection.
    #[error("Connection closed by server: {0}")]
    ClosedByServer(String),

    /// The client has been disposed and cannot connect again.
    #[error("Event bus client is closed")]
    Disposed,

    #[error(transparent)]
    Core(#[from] CoreError),
}
