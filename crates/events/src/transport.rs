//! Connection seam for the event bus.
//!
//! [`BusConnector`] opens one text-frame duplex per call. The production
//! [`WsConnector`] uses `tokio-tungstenite`; tests substitute in-memory
//! channels.

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{future, Sink, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::error::BusError;

/// Outbound half: accepts serialized JSON frames.
pub type BusSink = Pin<Box<dyn Sink<String, Error = BusError> + Send>>;

/// Inbound half: yields JSON text frames until the connection ends.
pub type BusStream = BoxStream<'static, Result<String, BusError>>;

/// A live bus connection split into its two halves.
pub struct BusConnection {
    pub sink: BusSink,
    pub stream: BusStream,
}

#[async_trait]
pub trait BusConnector: Send + Sync {
    /// Connect to `url`, which already carries the session credential.
    async fn connect(&self, url: &str) -> Result<BusConnection, BusError>;
}

/// WebSocket implementation of [`BusConnector`].
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl BusConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<BusConnection, BusError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        let (ws_sink, ws_stream) = ws_stream.split();

        let sink = ws_sink
            .with(|text: String| future::ready(Ok::<_, WsError>(Message::Text(text))))
            .sink_map_err(|e| BusError::Transport(e.to_string()));

        let stream = ws_stream.filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(frame)) => Some(Err(BusError::ClosedByServer(
                    frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                ))),
                // Ping/Pong are answered by tungstenite; binary frames are not used.
                Ok(_) => None,
                Err(e) => Some(Err(BusError::Transport(e.to_string()))),
            })
        });

        Ok(BusConnection {
            sink: Box::pin(sink),
            stream: stream.boxed(),
        })
    }
}
