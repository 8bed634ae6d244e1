//! Bounded, de-duplicated billing alert list.

use std::collections::{HashSet, VecDeque};

use chrono::Utc;
use coldreach_core::types::Timestamp;
use coldreach_events::messages::BillingAlertData;
use coldreach_events::Severity;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Dismissed ids remembered per monitor, so a re-sent alert stays hidden.
const DISMISSED_HISTORY: usize = 512;

/// Hex characters of the digest kept in a derived alert id.
const DERIVED_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub timestamp: Option<Timestamp>,
    pub received_at: Timestamp,
}

impl Alert {
    pub fn from_data(data: &BillingAlertData) -> Self {
        Self {
            id: data.id.clone().unwrap_or_else(|| alert_id(data)),
            severity: data.severity,
            title: data.title.clone(),
            message: data.message.clone(),
            timestamp: data.timestamp,
            received_at: Utc::now(),
        }
    }
}

/// Deterministic id for an alert the server sent without one.
///
/// The same severity, title, message and timestamp always produce the
/// same id, so a re-delivered alert is recognised as a duplicate.
pub fn alert_id(data: &BillingAlertData) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.severity.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(data.title.as_bytes());
    hasher.update([0]);
    hasher.update(data.message.as_bytes());
    hasher.update([0]);
    if let Some(ts) = data.timestamp {
        hasher.update(ts.to_rfc3339().as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("alert-{}", &digest[..DERIVED_ID_LEN])
}

/// Newest-first alert list capped at `window` entries.
#[derive(Debug)]
pub struct AlertLog {
    window: usize,
    alerts: VecDeque<Alert>,
    dismissed: VecDeque<String>,
    dismissed_ids: HashSet<String>,
}

impl AlertLog {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            alerts: VecDeque::new(),
            dismissed: VecDeque::new(),
            dismissed_ids: HashSet::new(),
        }
    }

    /// Insert `alert` at the front.
    ///
    /// Returns `false` when an alert with the same id is already listed
    /// or was dismissed. The oldest alert is evicted past the window.
    pub fn push(&mut self, alert: Alert) -> bool {
        if self.dismissed_ids.contains(&alert.id) || self.alerts.iter().any(|a| a.id == alert.id) {
            return false;
        }
        self.alerts.push_front(alert);
        while self.alerts.len() > self.window {
            if let Some(evicted) = self.alerts.pop_back() {
                tracing::debug!(alert_id = %evicted.id, "Evicting oldest billing alert");
            }
        }
        true
    }

    /// Dismiss the alert at `index` (0 = newest).
    pub fn dismiss(&mut self, index: usize) -> Option<Alert> {
        let alert = self.alerts.remove(index)?;
        self.remember_dismissed(alert.id.clone());
        Some(alert)
    }

    pub fn dismiss_by_id(&mut self, id: &str) -> Option<Alert> {
        let index = self.alerts.iter().position(|a| a.id == id)?;
        self.dismiss(index)
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    fn remember_dismissed(&mut self, id: String) {
        if self.dismissed_ids.insert(id.clone()) {
            self.dismissed.push_back(id);
        }
        while self.dismissed.len() > DISMISSED_HISTORY {
            if let Some(old) = self.dismissed.pop_front() {
                self.dismissed_ids.remove(&old);
            }
        }
    }
}
