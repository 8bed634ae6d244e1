//! Event names carried in the `type` field of server-to-client bus
//! envelopes.
//!
//! Shared between the decoder in `coldreach-events` and anything that
//! needs to log or filter by the raw name.

/// Aggregate campaign send progress.
pub const CAMPAIGN_PROGRESS: &str = "campaign_progress";

/// Campaign send progress with per-outcome counters.
pub const CAMPAIGN_PROGRESS_DETAILED: &str = "campaign_progress_detailed";

/// Campaign lifecycle status change.
pub const CAMPAIGN_STATUS: &str = "campaign_status";

/// Campaign status change with previous status and reason.
pub const CAMPAIGN_STATUS_DETAILED: &str = "campaign_status_detailed";

/// Operator-facing system notice.
pub const SYSTEM_NOTIFICATION: &str = "system_notification";

/// Error surfaced by the server for the session.
pub const ERROR_NOTIFICATION: &str = "error_notification";

/// Periodic server heartbeat carrying timing data.
pub const SERVER_METRICS: &str = "server_metrics";

/// Envelope holding an ordered list of other events.
pub const PROGRESS_BATCH: &str = "progress_batch";

/// Billing usage counter update.
pub const USAGE_UPDATE: &str = "usage_update";

/// Billing threshold alert.
pub const BILLING_ALERT: &str = "billing_alert";

