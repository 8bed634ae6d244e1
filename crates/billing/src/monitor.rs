use std::sync::Arc;

use coldreach_core::config::DEFAULT_ALERT_WINDOW;
use coldreach_events::{BusEvent, EventBusClient, EventKind, HandlerId};
use parking_lot::Mutex;

use crate::alerts::{Alert, AlertLog};
use crate::usage::{usage_percentage, UsageBook, UsageMetric};

struct MonitorState {
    usage: UsageBook,
    alerts: AlertLog,
}

/// Usage and alert state for the session, updated from the event bus.
pub struct UsageMonitor {
    state: Arc<Mutex<MonitorState>>,
    registrations: Mutex<Vec<(EventKind, HandlerId)>>,
}

impl Default for UsageMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_WINDOW)
    }
}

impl UsageMonitor {
    /// * `alert_window` - number of alerts kept before the oldest is dropped.
    pub fn new(alert_window: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MonitorState {
                usage: UsageBook::new(),
                alerts: AlertLog::new(alert_window),
            })),
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// Start listening for usage and alert events on `bus`.
    ///
    /// Attaching twice without [`detach`](Self::detach) is a no-op.
    pub fn attach(&self, bus: &EventBusClient) {
        let mut registrations = self.registrations.lock();
        if !registrations.is_empty() {
            return;
        }
        for kind in [EventKind::UsageUpdate, EventKind::BillingAlert] {
            let state = Arc::clone(&self.state);
            let id = bus.on(kind, move |event| apply_event(&state, event));
            registrations.push((kind, id));
        }
    }

    /// Stop listening. Stored usage and alerts are kept.
    pub fn detach(&self, bus: &EventBusClient) {
        for (kind, id) in self.registrations.lock().drain(..) {
            bus.off(kind, id);
        }
    }

    /// Feed one event directly.
    pub fn apply(&self, event: &BusEvent) {
        apply_event(&self.state, event);
    }

    /// Most recently updated record for `metric`.
    pub fn usage(&self, metric: &str) -> Option<UsageMetric> {
        self.state.lock().usage.latest(metric).cloned()
    }

    pub fn usage_for_period(&self, metric: &str, period: &str) -> Option<UsageMetric> {
        self.state.lock().usage.get(metric, period).cloned()
    }

    pub fn all_usage(&self) -> Vec<UsageMetric> {
        self.state.lock().usage.all()
    }

    /// `current / limit * 100` for `metric`, 0 when unknown.
    pub fn get_usage_percentage(&self, metric: &str) -> f64 {
        self.state
            .lock()
            .usage
            .latest(metric)
            .map_or(0.0, |m| usage_percentage(m.current, m.limit))
    }

    /// Whether the stored percentage for `metric` is at least 100.
    pub fn has_usage_limit_reached(&self, metric: &str) -> bool {
        self.state
            .lock()
            .usage
            .latest(metric)
            .is_some_and(UsageMetric::limit_reached)
    }

    /// Current alerts, newest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.state.lock().alerts.alerts()
    }

    /// Dismiss the alert at `index` in [`alerts`](Self::alerts) order.
    pub fn dismiss_alert(&self, index: usize) -> Option<Alert> {
        self.state.lock().alerts.dismiss(index)
    }

    pub fn dismiss_alert_by_id(&self, id: &str) -> Option<Alert> {
        self.state.lock().alerts.dismiss_by_id(id)
    }
}

fn apply_event(state: &Mutex<MonitorState>, event: &BusEvent) {
    match event {
        BusEvent::UsageUpdate(update) => {
            let metric = UsageMetric::from_update(update);
            tracing::debug!(
                metric = %metric.metric,
                period = %metric.period,
                percentage = metric.percentage,
                "Usage updated",
            );
            if metric.limit_reached() {
                tracing::info!(metric = %metric.metric, period = %metric.period, "Usage limit reached");
            }
            state.lock().usage.record(metric);
        }
        BusEvent::BillingAlert(data) => {
            let alert = Alert::from_data(data);
            let id = alert.id.clone();
            let severity = alert.severity.as_str();
            if state.lock().alerts.push(alert) {
                tracing::info!(alert_id = %id, severity, "Billing alert received");
            } else {
                tracing::debug!(alert_id = %id, "Duplicate billing alert ignored");
            }
        }
        _ => {}
    }
}
