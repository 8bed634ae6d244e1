//! Billing usage and alert state fed by the event bus.
//!
//! [`UsageMonitor`] listens for `usage_update` and `billing_alert` events
//! and keeps the latest usage record per `(metric, period)` plus a
//! bounded, de-duplicated alert list.

pub mod alerts;
pub mod monitor;
pub mod usage;

pub use alerts::{alert_id, Alert, AlertLog};
pub use monitor::UsageMonitor;
pub use usage::{usage_percentage, UsageBook, UsageMetric};
