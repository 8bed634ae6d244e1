//! Progress client for a single operation.
//!
//! [`ProgressStreamClient::open`] spawns one task per operation. The task
//! follows the [`TransportPolicy`]: it reads the push stream until the
//! operation finishes or the stream fails, then polls until a terminal
//! event or the attempt cap. Every state change is published on a
//! [`watch`] channel.
//!
//! The client owns the task. [`close`](ProgressStreamClient::close)
//! cancels it and waits for it to exit; dropping the client cancels it
//! as well, so no stream or poll timer outlives its owner.

use std::sync::Arc;
use std::time::Duration;

use coldreach_core::config::ProgressConfig;
use coldreach_core::progress::parse_progress;
use coldreach_core::types::OperationId;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::ProgressError;
use crate::source::ProgressSource;
use crate::state::{Applied, ConnectionStatus, ProgressSnapshot, ProgressTracker};
use crate::strategy::{TransportPolicy, TransportStrategy};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Tracks the progress of one server-side operation at a time.
pub struct ProgressStreamClient {
    source: Arc<dyn ProgressSource>,
    config: ProgressConfig,
    policy: TransportPolicy,
    state_tx: Arc<watch::Sender<ProgressSnapshot>>,
    active: Option<ActiveOperation>,
}

/// Bookkeeping for the operation currently being tracked.
struct ActiveOperation {
    operation_id: OperationId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Why a transport stopped delivering.
enum TransportEnd {
    Terminal,
    Cancelled,
    Failed(ProgressError),
}

impl ProgressStreamClient {
    pub fn new(source: Arc<dyn ProgressSource>, config: ProgressConfig) -> Self {
        Self::with_policy(source, config, TransportPolicy::default())
    }

    pub fn with_policy(
        source: Arc<dyn ProgressSource>,
        config: ProgressConfig,
        policy: TransportPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(ProgressSnapshot::idle());
        Self {
            source,
            config,
            policy,
            state_tx: Arc::new(state_tx),
            active: None,
        }
    }

    /// Start tracking `operation_id`.
    ///
    /// Opening the operation that is already tracked is a no-op, so the
    /// operation never has two transports at once. Opening a different
    /// operation stops the current one first.
    pub async fn open(&mut self, operation_id: OperationId, credential: &str) {
        if let Some(active) = &self.active {
            if active.operation_id == operation_id {
                tracing::debug!(operation_id = %operation_id, "Progress stream already open");
                return;
            }
            self.close().await;
        }

        tracing::info!(operation_id = %operation_id, "Opening progress stream");

        let cancel = CancellationToken::new();
        let tracker = ProgressTracker::new(
            operation_id.clone(),
            self.config.eta_min_progress,
            Instant::now(),
        );
        self.state_tx.send_replace(tracker.snapshot().clone());

        let task = tokio::spawn(run_operation(
            Arc::clone(&self.source),
            operation_id.clone(),
            credential.to_string(),
            self.config.clone(),
            self.policy,
            tracker,
            Arc::clone(&self.state_tx),
            cancel.clone(),
        ));

        self.active = Some(ActiveOperation {
            operation_id,
            cancel,
            task,
        });
    }

    /// Stop tracking and clear the published state.
    ///
    /// Cancels the stream or poll loop and waits for the task to exit, so
    /// no update is published after this returns.
    pub async fn close(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.cancel.cancel();
        if let Err(e) = active.task.await {
            if e.is_panic() {
                tracing::error!(
                    operation_id = %active.operation_id,
                    error = %e,
                    "Progress task panicked",
                );
            }
        }
        self.state_tx.send_replace(ProgressSnapshot::idle());

        tracing::info!(operation_id = %active.operation_id, "Progress stream closed");
    }

    /// The operation currently being tracked, if any.
    pub fn operation_id(&self) -> Option<&OperationId> {
        self.active.as_ref().map(|a| &a.operation_id)
    }

    /// `true` while a stream or poll loop is running.
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| !a.task.is_finished())
    }

    /// Current state of the tracked operation.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state_tx.borrow().clone()
    }

    /// Observe every state change.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.state_tx.subscribe()
    }
}

impl Drop for ProgressStreamClient {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            active.task.abort();
        }
    }
}

/// Drive one operation through the transport policy until it ends.
async fn run_operation(
    source: Arc<dyn ProgressSource>,
    operation_id: OperationId,
    credential: String,
    config: ProgressConfig,
    policy: TransportPolicy,
    mut tracker: ProgressTracker,
    state_tx: Arc<watch::Sender<ProgressSnapshot>>,
    cancel: CancellationToken,
) {
    let mut strategy = policy.initial();

    loop {
        tracker.set_connection(strategy, ConnectionStatus::Connecting);
        publish(&state_tx, &tracker, &cancel);

        let end = match strategy {
            TransportStrategy::Stream => {
                run_stream(
                    source.as_ref(),
                    &operation_id,
                    &credential,
                    &mut tracker,
                    &state_tx,
                    &cancel,
                )
                .await
            }
            TransportStrategy::Poll => {
                run_poll(
                    source.as_ref(),
                    &operation_id,
                    &credential,
                    &config,
                    &mut tracker,
                    &state_tx,
                    &cancel,
                )
                .await
            }
        };

        match end {
            TransportEnd::Terminal | TransportEnd::Cancelled => return,
            TransportEnd::Failed(e) => match policy.after_failure(strategy) {
                Some(next) => {
                    tracing::warn!(
                        operation_id = %operation_id,
                        error = %e,
                        from = ?strategy,
                        to = ?next,
                        "Progress transport failed, falling back",
                    );
                    strategy = next;
                }
                None => {
                    tracing::error!(
                        operation_id = %operation_id,
                        error = %e,
                        "Progress tracking gave up",
                    );
                    tracker.time_out(e.to_string());
                    publish(&state_tx, &tracker, &cancel);
                    return;
                }
            },
        }
    }
}

async fn run_stream(
    source: &dyn ProgressSource,
    operation_id: &OperationId,
    credential: &str,
    tracker: &mut ProgressTracker,
    state_tx: &watch::Sender<ProgressSnapshot>,
    cancel: &CancellationToken,
) -> TransportEnd {
    let mut stream = tokio::select! {
        _ = cancel.cancelled() => return TransportEnd::Cancelled,
        result = source.stream(operation_id, credential) => match result {
            Ok(stream) => stream,
            Err(e) => return TransportEnd::Failed(e),
        },
    };

    tracker.set_connection(TransportStrategy::Stream, ConnectionStatus::Open);
    publish(state_tx, tracker, cancel);
    tracing::debug!(operation_id = %operation_id, "Progress stream open");

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return TransportEnd::Cancelled,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(text)) => match apply_payload(operation_id, &text, tracker) {
                Applied::Terminal => {
                    // Release the connection before the terminal state goes out.
                    drop(stream);
                    publish(state_tx, tracker, cancel);
                    return TransportEnd::Terminal;
                }
                Applied::Updated => publish(state_tx, tracker, cancel),
                Applied::Ignored => {}
            },
            Some(Err(e)) => return TransportEnd::Failed(e),
            None => {
                return TransportEnd::Failed(ProgressError::Transport(
                    "stream ended before the operation finished".into(),
                ))
            }
        }
    }
}

async fn run_poll(
    source: &dyn ProgressSource,
    operation_id: &OperationId,
    credential: &str,
    config: &ProgressConfig,
    tracker: &mut ProgressTracker,
    state_tx: &watch::Sender<ProgressSnapshot>,
    cancel: &CancellationToken,
) -> TransportEnd {
    // A zero period would panic inside `interval`.
    let mut ticker = tokio::time::interval(config.poll_interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for attempt in 1..=config.max_poll_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return TransportEnd::Cancelled,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return TransportEnd::Cancelled,
            result = source.poll(operation_id, credential) => result,
        };

        match result {
            Ok(text) => {
                tracker.set_connection(TransportStrategy::Poll, ConnectionStatus::Open);
                match apply_payload(operation_id, &text, tracker) {
                    Applied::Terminal => {
                        publish(state_tx, tracker, cancel);
                        return TransportEnd::Terminal;
                    }
                    Applied::Updated | Applied::Ignored => publish(state_tx, tracker, cancel),
                }
            }
            Err(e) => {
                tracing::warn!(
                    operation_id = %operation_id,
                    attempt,
                    error = %e,
                    "Progress poll failed",
                );
                tracker.set_connection(TransportStrategy::Poll, ConnectionStatus::Error);
                publish(state_tx, tracker, cancel);
            }
        }
    }

    TransportEnd::Failed(ProgressError::PollAttemptsExhausted(
        config.max_poll_attempts,
    ))
}

/// Parse and apply one raw payload. Malformed payloads are skipped.
fn apply_payload(operation_id: &OperationId, text: &str, tracker: &mut ProgressTracker) -> Applied {
    match parse_progress(text) {
        Ok(event) => tracker.apply(&event, Instant::now()),
        Err(e) => {
            tracing::warn!(
                operation_id = %operation_id,
                error = %e,
                raw_message = %text,
                "Ignoring malformed progress payload",
            );
            Applied::Ignored
        }
    }
}

/// Publish the tracker state unless the operation has been cancelled.
fn publish(
    state_tx: &watch::Sender<ProgressSnapshot>,
    tracker: &ProgressTracker,
    cancel: &CancellationToken,
) {
    if cancel.is_cancelled() {
        return;
    }
    state_tx.send_replace(tracker.snapshot().clone());
}
