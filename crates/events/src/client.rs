//! The session-wide event bus client.
//!
//! [`EventBusClient::connect`] spawns one long-lived task that owns the
//! WebSocket: connect -> replay topic subscriptions -> read frames and
//! send heartbeats -> reconnect with backoff when the connection drops.
//! Consumers register handlers and topic interest through `&self`
//! methods and never own the connection; only
//! [`close`](EventBusClient::close) ends it.
//!
//! Delivery is at-most-once. Events emitted while disconnected are not
//! replayed, and ordering is only guaranteed within one connection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use coldreach_core::config::BusConfig;
use coldreach_core::endpoints::bus_url;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::BusError;
use crate::handlers::{HandlerId, HandlerRegistry};
use crate::messages::{parse_event, BusEvent, ClientMessage, EventKind, ServerMetricsData};
use crate::metrics::{BusMetrics, BusStatus};
use crate::reconnect::{Backoff, ReconnectConfig};
use crate::topics::TopicSubscriptions;
use crate::transport::{BusConnection, BusConnector, BusSink};

/// How long a closing connection may take to flush its close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// One multiplexed, authenticated event channel per session.
///
/// Designed to be wrapped in `Arc` and shared by every consumer.
pub struct EventBusClient {
    connector: Arc<dyn BusConnector>,
    ws_url: String,
    config: BusConfig,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

/// The running connection task.
struct Session {
    connection_id: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// State touched by both the public API and the connection task.
///
/// Locks are never held across an `.await`, and handlers are invoked
/// after the registry lock is released.
#[derive(Default)]
struct Shared {
    handlers: Mutex<HandlerRegistry>,
    topics: Mutex<TopicSubscriptions>,
    metrics: RwLock<BusMetrics>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>,
}

/// Why a connected session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    Dropped,
}

impl EventBusClient {
    /// * `ws_url` - bus endpoint without credentials, e.g. `wss://host/ws`.
    pub fn new(connector: Arc<dyn BusConnector>, ws_url: impl Into<String>, config: BusConfig) -> Self {
        Self {
            connector,
            ws_url: ws_url.into(),
            config,
            shared: Arc::new(Shared::default()),
            session: Mutex::new(None),
        }
    }

    /// Open the session connection.
    ///
    /// The credential is captured now and reused for every reconnect.
    /// Calling `connect` while a connection task is running is a no-op.
    pub fn connect(&self, credential: &str) -> Result<(), BusError> {
        let mut session = self.session.lock();
        if session.is_some() {
            tracing::debug!("Event bus already connected");
            return Ok(());
        }
        if self.status() == BusStatus::Closed {
            return Err(BusError::Disposed);
        }

        let url = bus_url(&self.ws_url, credential)?.to_string();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.shared.outbound.lock() = Some(outbound_tx);

        let connection_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();

        tracing::info!(connection_id = %connection_id, ws_url = %self.ws_url, "Starting event bus");

        let task = tokio::spawn(run_connection_loop(
            Arc::clone(&self.connector),
            url,
            self.config.clone(),
            Arc::clone(&self.shared),
            outbound_rx,
            cancel.clone(),
            connection_id.clone(),
        ));

        *session = Some(Session {
            connection_id,
            cancel,
            task,
        });
        Ok(())
    }

    /// Register `handler` for every event of `kind`.
    ///
    /// Handlers for the same kind run in registration order. Keep the
    /// returned id to remove the handler with [`off`](Self::off).
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.shared.handlers.lock().register(kind, Arc::new(handler))
    }

    /// Remove exactly the handler registered under `id`.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        self.shared.handlers.lock().remove(kind, id)
    }

    /// Declare local interest in one campaign's events.
    ///
    /// Only the first local subscriber sends a server subscribe.
    pub fn subscribe_to_campaign(&self, campaign_id: &str) {
        let mut topics = self.shared.topics.lock();
        if topics.acquire(campaign_id) {
            tracing::debug!(campaign_id, "Subscribing to campaign");
            self.shared.send(ClientMessage::SubscribeCampaign {
                campaign_id: campaign_id.to_string(),
            });
        }
    }

    /// Withdraw one local subscriber's interest in a campaign.
    ///
    /// The server unsubscribe is sent only when the last local
    /// subscriber leaves.
    pub fn unsubscribe_from_campaign(&self, campaign_id: &str) {
        let mut topics = self.shared.topics.lock();
        if topics.release(campaign_id) {
            tracing::debug!(campaign_id, "Unsubscribing from campaign");
            self.shared.send(ClientMessage::UnsubscribeCampaign {
                campaign_id: campaign_id.to_string(),
            });
        }
    }

    /// Number of local subscribers to `campaign_id`.
    pub fn campaign_subscribers(&self, campaign_id: &str) -> usize {
        self.shared.topics.lock().ref_count(campaign_id)
    }

    pub fn status(&self) -> BusStatus {
        self.shared.metrics.read().status
    }

    pub fn metrics(&self) -> BusMetrics {
        self.shared.metrics.read().clone()
    }

    /// Dispose of the bus.
    ///
    /// Removes every handler and topic, stops the connection task and its
    /// heartbeat, and waits for the task to exit. The client cannot be
    /// connected again afterwards.
    pub async fn close(&self) {
        let session = self.session.lock().take();
        self.shared.handlers.lock().clear();
        *self.shared.topics.lock() = TopicSubscriptions::new();
        *self.shared.outbound.lock() = None;

        if let Some(session) = session {
            session.cancel.cancel();
            if let Err(e) = session.task.await {
                if e.is_panic() {
                    tracing::error!(
                        connection_id = %session.connection_id,
                        error = %e,
                        "Event bus task panicked",
                    );
                }
            }
            tracing::info!(connection_id = %session.connection_id, "Event bus closed");
        }

        self.shared.set_status(BusStatus::Closed);
    }
}

impl Drop for EventBusClient {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
            session.task.abort();
        }
    }
}

impl Shared {
    fn set_status(&self, status: BusStatus) {
        self.metrics.write().status = status;
    }

    fn mark_open(&self) {
        let mut metrics = self.metrics.write();
        metrics.status = BusStatus::Open;
        metrics.connected_at = Some(Utc::now());
        metrics.reconnect_attempts = 0;
    }

    fn mark_retrying(&self, attempt: u32) {
        let mut metrics = self.metrics.write();
        metrics.status = BusStatus::Reconnecting;
        metrics.reconnect_attempts = attempt;
    }

    /// Queue a frame for the connection task, if one is running.
    fn send(&self, message: ClientMessage) {
        if let Some(tx) = self.outbound.lock().as_ref() {
            // A send error means the task has exited; the topic set is
            // replayed on the next connect anyway.
            let _ = tx.send(message);
        }
    }

    /// Discard queued frames and return the topics to resubscribe.
    ///
    /// Runs under the topic lock, so a subscribe racing with a reconnect
    /// is either in the returned set or queued after this call, never
    /// both.
    fn take_resubscriptions(
        &self,
        outbound_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    ) -> Vec<String> {
        let topics = self.topics.lock();
        while outbound_rx.try_recv().is_ok() {}
        topics.topics()
    }

    fn handle_text(&self, text: &str) {
        match parse_event(text) {
            Ok(event) => self.dispatch(&event),
            Err(e) => {
                tracing::warn!(error = %e, raw_message = %text, "Failed to parse bus message");
            }
        }
    }

    fn dispatch(&self, event: &BusEvent) {
        if let BusEvent::ProgressBatch(batch) = event {
            tracing::trace!(count = batch.events.len(), "Unwrapping progress batch");
            self.notify(event);
            for inner in &batch.events {
                self.dispatch(inner);
            }
            return;
        }

        {
            let mut metrics = self.metrics.write();
            metrics.total_events += 1;
            metrics.last_event_at = Some(Utc::now());
            if let BusEvent::ServerMetrics(data) = event {
                if let Some(latency) = latency_ms(data, Utc::now().timestamp_millis()) {
                    metrics.latency_ms = Some(latency);
                }
            }
        }

        self.notify(event);
    }

    fn notify(&self, event: &BusEvent) {
        let handlers = self.handlers.lock().handlers_for(event.kind());
        for handler in handlers {
            handler(event);
        }
    }
}

/// Latency estimate from a heartbeat frame, in milliseconds.
///
/// Prefers the echoed client timestamp (true round trip) over the
/// server's emission time (one way, affected by clock skew).
fn latency_ms(data: &ServerMetricsData, now_ms: i64) -> Option<u64> {
    let sent = data.client_time.or(data.server_time)?;
    Some(now_ms.saturating_sub(sent).max(0) as u64)
}

/// Core connection loop: connect -> run session -> back off -> reconnect.
///
/// Runs until the cancellation token is triggered.
async fn run_connection_loop(
    connector: Arc<dyn BusConnector>,
    url: String,
    config: BusConfig,
    shared: Arc<Shared>,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientMessage>,
    cancel: CancellationToken,
    connection_id: String,
) {
    let mut backoff = Backoff::new(ReconnectConfig::from(&config));

    loop {
        shared.set_status(BusStatus::Connecting);

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = connector.connect(&url) => result,
        };

        match result {
            Ok(conn) => {
                backoff.reset();
                shared.mark_open();
                tracing::info!(connection_id = %connection_id, "Event bus connected");

                let end =
                    run_session(conn, &shared, &mut outbound_rx, &config, &cancel, &connection_id)
                        .await;
                if end == SessionEnd::Cancelled {
                    return;
                }
                tracing::warn!(connection_id = %connection_id, "Event bus connection lost");
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    attempt = backoff.attempt() + 1,
                    error = %e,
                    "Event bus connection failed",
                );
            }
        }

        shared.set_status(BusStatus::Error);
        if cancel.is_cancelled() {
            return;
        }

        let delay_attempt = backoff.attempt() + 1;
        shared.mark_retrying(delay_attempt);
        tracing::info!(connection_id = %connection_id, attempt = delay_attempt, "Reconnecting event bus");
        if !backoff.wait(&cancel).await {
            return;
        }
    }
}

/// Drive one connected session until it drops or is cancelled.
async fn run_session(
    conn: BusConnection,
    shared: &Shared,
    outbound_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    config: &BusConfig,
    cancel: &CancellationToken,
    connection_id: &str,
) -> SessionEnd {
    let BusConnection {
        mut sink,
        mut stream,
    } = conn;

    // Server-side subscriptions do not survive a disconnect.
    for campaign_id in shared.take_resubscriptions(outbound_rx) {
        let frame = ClientMessage::SubscribeCampaign { campaign_id };
        if let Err(e) = send_frame(&mut sink, &frame).await {
            tracing::warn!(connection_id, error = %e, "Failed to replay subscription");
            return SessionEnd::Dropped;
        }
    }

    let mut heartbeat =
        tokio::time::interval(config.heartbeat_interval.max(Duration::from_millis(1)));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
                return SessionEnd::Cancelled;
            }
            _ = heartbeat.tick() => {
                let ping = ClientMessage::Ping { client_time: Utc::now().timestamp_millis() };
                if let Err(e) = send_frame(&mut sink, &ping).await {
                    tracing::warn!(connection_id, error = %e, "Failed to send heartbeat");
                    return SessionEnd::Dropped;
                }
            }
            Some(message) = outbound_rx.recv() => {
                if let Err(e) = send_frame(&mut sink, &message).await {
                    tracing::warn!(connection_id, error = %e, "Failed to send bus frame");
                    return SessionEnd::Dropped;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(text)) => shared.handle_text(&text),
                Some(Err(e)) => {
                    tracing::warn!(connection_id, error = %e, "Event bus receive error");
                    return SessionEnd::Dropped;
                }
                None => {
                    tracing::info!(connection_id, "Event bus stream exhausted");
                    return SessionEnd::Dropped;
                }
            },
        }
    }
}

async fn send_frame(sink: &mut BusSink, message: &ClientMessage) -> Result<(), BusError> {
    let json = message
        .to_json()
        .map_err(|e| BusError::Transport(format!("Failed to encode frame: {e}")))?;
    sink.send(json).await
}
