//! Progress state for one operation and the rules that mutate it.

use coldreach_core::progress::{
    BatchInfo, ImportSummary, ProgressEvent, PROGRESS_COMPLETE, PROGRESS_FAILED,
};
use coldreach_core::types::OperationId;
use serde::Serialize;
use tokio::time::Instant;

use crate::eta::estimate_remaining_secs;
use crate::strategy::TransportStrategy;

/// Health of the active transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Closed,
    Error,
}

/// How an operation ended, if it has.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProgressOutcome {
    /// Still running, or not started.
    Pending,
    /// Reached 100%. Carries the import counters when the server sent them.
    Succeeded { result: Option<ImportSummary> },
    /// The server reported the `-1` sentinel.
    Failed { message: String },
    /// The poll fallback hit its attempt cap without a terminal event.
    TimedOut,
}

impl ProgressOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressOutcome::Pending)
    }
}

/// Point-in-time view of an operation, as published to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub operation_id: Option<OperationId>,
    /// Displayed percentage. Never decreases until the operation ends.
    pub progress: f64,
    pub message: String,
    pub batch: Option<BatchInfo>,
    pub status: ConnectionStatus,
    pub transport: TransportStrategy,
    /// Estimated seconds remaining, once progress is past the ETA threshold.
    pub eta_seconds: Option<f64>,
    pub outcome: ProgressOutcome,
}

impl ProgressSnapshot {
    /// State of a client with no operation open.
    pub fn idle() -> Self {
        Self {
            operation_id: None,
            progress: 0.0,
            message: String::new(),
            batch: None,
            status: ConnectionStatus::Closed,
            transport: TransportStrategy::Stream,
            eta_seconds: None,
            outcome: ProgressOutcome::Pending,
        }
    }
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

/// Result of feeding one event to a [`ProgressTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// State changed; the operation is still running.
    Updated,
    /// State changed and the operation is now finished.
    Terminal,
    /// The operation had already finished; nothing changed.
    Ignored,
}

/// Owns the snapshot of one operation and applies progress events to it.
#[derive(Debug)]
pub struct ProgressTracker {
    snapshot: ProgressSnapshot,
    started_at: Instant,
    eta_min_progress: f64,
}

impl ProgressTracker {
    pub fn new(operation_id: OperationId, eta_min_progress: f64, started_at: Instant) -> Self {
        Self {
            snapshot: ProgressSnapshot {
                operation_id: Some(operation_id),
                status: ConnectionStatus::Connecting,
                ..ProgressSnapshot::idle()
            },
            started_at,
            eta_min_progress,
        }
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    pub fn is_finished(&self) -> bool {
        self.snapshot.outcome.is_terminal()
    }

    /// Record a transport switch or status change. Ignored once finished.
    pub fn set_connection(&mut self, transport: TransportStrategy, status: ConnectionStatus) {
        if self.is_finished() {
            return;
        }
        self.snapshot.transport = transport;
        self.snapshot.status = status;
    }

    /// Apply one progress event observed at `now`.
    pub fn apply(&mut self, event: &ProgressEvent, now: Instant) -> Applied {
        if self.is_finished() {
            return Applied::Ignored;
        }

        if event.is_failure() {
            let message = if event.message.is_empty() {
                "Operation failed".to_string()
            } else {
                event.message.clone()
            };
            self.snapshot.progress = PROGRESS_FAILED;
            self.snapshot.message = message.clone();
            self.snapshot.eta_seconds = None;
            self.snapshot.status = ConnectionStatus::Closed;
            self.snapshot.outcome = ProgressOutcome::Failed { message };
            return Applied::Terminal;
        }

        let value = event.progress.min(PROGRESS_COMPLETE);
        if value > self.snapshot.progress {
            self.snapshot.progress = value;
        }
        if !event.message.is_empty() {
            self.snapshot.message = event.message.clone();
        }
        if event.batch.is_some() {
            self.snapshot.batch = event.batch;
        }

        if value >= PROGRESS_COMPLETE {
            self.snapshot.eta_seconds = None;
            self.snapshot.status = ConnectionStatus::Closed;
            self.snapshot.outcome = ProgressOutcome::Succeeded {
                result: event.result,
            };
            return Applied::Terminal;
        }

        self.snapshot.eta_seconds = estimate_remaining_secs(
            now.saturating_duration_since(self.started_at),
            self.snapshot.progress,
            self.eta_min_progress,
        );
        Applied::Updated
    }

    /// End the operation because every transport was exhausted.
    pub fn time_out(&mut self, message: impl Into<String>) {
        if self.is_finished() {
            return;
        }
        self.snapshot.message = message.into();
        self.snapshot.eta_seconds = None;
        self.snapshot.status = ConnectionStatus::Error;
        self.snapshot.outcome = ProgressOutcome::TimedOut;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn tracker() -> (ProgressTracker, Instant) {
        let start = Instant::now();
        (ProgressTracker::new(OperationId::new("op-1"), 5.0, start), start)
    }

    #[test]
    fn starts_connecting_and_pending() {
        let (tracker, _) = tracker();
        assert_eq!(tracker.snapshot().status, ConnectionStatus::Connecting);
        assert_eq!(tracker.snapshot().outcome, ProgressOutcome::Pending);
        assert_eq!(tracker.snapshot().progress, 0.0);
    }

    #[test]
    fn percentage_never_decreases() {
        let (mut tracker, start) = tracker();
        let sequence = [10.0, 30.0, 20.0, 45.0, 44.9, 80.0];
        let mut last = 0.0;
        for (i, value) in sequence.iter().enumerate() {
            let now = start + Duration::from_secs(i as u64 + 1);
            tracker.apply(&ProgressEvent::new(*value, "working"), now);
            assert!(tracker.snapshot().progress >= last);
            last = tracker.snapshot().progress;
        }
        assert_eq!(last, 80.0);
    }

    #[test]
    fn lower_value_still_updates_message_and_batch() {
        let (mut tracker, start) = tracker();
        tracker.apply(&ProgressEvent::new(40.0, "batch 1"), start);
        tracker.apply(
            &ProgressEvent::new(35.0, "batch 2").with_batch(2, 3),
            start + Duration::from_secs(1),
        );
        assert_eq!(tracker.snapshot().progress, 40.0);
        assert_eq!(tracker.snapshot().message, "batch 2");
        assert_eq!(tracker.snapshot().batch, Some(BatchInfo { current: 2, total: 3 }));
    }

    #[test]
    fn eta_follows_elapsed_time() {
        let (mut tracker, start) = tracker();
        tracker.apply(&ProgressEvent::new(3.0, "warming up"), start + Duration::from_secs(1));
        assert!(tracker.snapshot().eta_seconds.is_none());

        tracker.apply(&ProgressEvent::new(37.0, "importing"), start + Duration::from_secs(10));
        let eta = tracker.snapshot().eta_seconds.unwrap();
        assert!((eta - 17.03).abs() < 0.01, "eta was {eta}");
    }

    #[test]
    fn completion_is_terminal_and_freezes_state() {
        let (mut tracker, start) = tracker();
        let summary = ImportSummary {
            imported: 10,
            duplicates_removed: 1,
            errors: 0,
        };
        let applied = tracker.apply(&ProgressEvent::new(100.0, "Done").with_result(summary), start);
        assert_eq!(applied, Applied::Terminal);
        assert_eq!(tracker.snapshot().status, ConnectionStatus::Closed);
        assert_eq!(
            tracker.snapshot().outcome,
            ProgressOutcome::Succeeded {
                result: Some(summary)
            }
        );

        let again = tracker.apply(&ProgressEvent::new(-1.0, "late failure"), start);
        assert_eq!(again, Applied::Ignored);
        assert_eq!(tracker.snapshot().message, "Done");

        tracker.set_connection(TransportStrategy::Poll, ConnectionStatus::Open);
        assert_eq!(tracker.snapshot().status, ConnectionStatus::Closed);
    }

    #[test]
    fn values_above_one_hundred_clamp() {
        let (mut tracker, start) = tracker();
        tracker.apply(&ProgressEvent::new(130.0, "Done"), start);
        assert_eq!(tracker.snapshot().progress, 100.0);
        assert!(tracker.is_finished());
    }

    #[test]
    fn failure_sentinel_reports_message() {
        let (mut tracker, start) = tracker();
        tracker.apply(&ProgressEvent::new(50.0, "half"), start);
        let applied = tracker.apply(&ProgressEvent::new(-1.0, "Invalid CSV header"), start);
        assert_eq!(applied, Applied::Terminal);
        assert_eq!(tracker.snapshot().progress, -1.0);
        assert_eq!(
            tracker.snapshot().outcome,
            ProgressOutcome::Failed {
                message: "Invalid CSV header".into()
            }
        );
    }

    #[test]
    fn time_out_marks_error() {
        let (mut tracker, _) = tracker();
        tracker.time_out("gave up");
        assert_eq!(tracker.snapshot().status, ConnectionStatus::Error);
        assert_eq!(tracker.snapshot().outcome, ProgressOutcome::TimedOut);
    }
}
