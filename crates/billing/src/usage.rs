//! Usage records keyed by metric and billing period.

use std::collections::HashMap;

use chrono::Utc;
use coldreach_core::types::Timestamp;
use coldreach_events::messages::UsageUpdateData;
use serde::Serialize;

/// Latest known usage for one metric in one billing period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageMetric {
    pub metric: String,
    pub period: String,
    pub current: f64,
    pub limit: f64,
    /// Server-provided percentage, or computed from `current / limit`.
    pub percentage: f64,
    pub updated_at: Timestamp,
}

impl UsageMetric {
    pub fn from_update(update: &UsageUpdateData) -> Self {
        Self {
            metric: update.metric.clone(),
            period: update.period.clone(),
            current: update.current,
            limit: update.limit,
            percentage: update
                .percentage
                .filter(|p| p.is_finite())
                .unwrap_or_else(|| usage_percentage(update.current, update.limit)),
            updated_at: Utc::now(),
        }
    }

    pub fn limit_reached(&self) -> bool {
        self.percentage >= 100.0
    }
}

/// `current / limit * 100`, defined for every input.
///
/// A zero (or negative) limit means any usage is over the limit, so the
/// result is 100 when `current > 0` and 0 otherwise.
pub fn usage_percentage(current: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        return if current > 0.0 { 100.0 } else { 0.0 };
    }
    let percentage = current / limit * 100.0;
    if percentage.is_finite() {
        percentage
    } else {
        0.0
    }
}

/// Usage records, replaced wholesale per `(metric, period)`.
#[derive(Debug, Default)]
pub struct UsageBook {
    records: HashMap<(String, String), (u64, UsageMetric)>,
    sequence: u64,
}

impl UsageBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, metric: UsageMetric) {
        self.sequence += 1;
        let key = (metric.metric.clone(), metric.period.clone());
        self.records.insert(key, (self.sequence, metric));
    }

    /// The most recently updated record for `metric`, across periods.
    pub fn latest(&self, metric: &str) -> Option<&UsageMetric> {
        self.records
            .values()
            .filter(|(_, m)| m.metric == metric)
            .max_by_key(|(seq, _)| *seq)
            .map(|(_, m)| m)
    }

    pub fn get(&self, metric: &str, period: &str) -> Option<&UsageMetric> {
        self.records
            .get(&(metric.to_string(), period.to_string()))
            .map(|(_, m)| m)
    }

    /// All records ordered by metric then period.
    pub fn all(&self) -> Vec<UsageMetric> {
        let mut all: Vec<_> = self.records.values().map(|(_, m)| m.clone()).collect();
        all.sort_by(|a, b| (&a.metric, &a.period).cmp(&(&b.metric, &b.period)));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(metric: &str, period: &str, current: f64, limit: f64) -> UsageUpdateData {
        UsageUpdateData {
            metric: metric.into(),
            period: period.into(),
            current,
            limit,
            percentage: None,
        }
    }

    #[test]
    fn percentage_of_limit() {
        assert_eq!(usage_percentage(250.0, 1000.0), 25.0);
        assert_eq!(usage_percentage(1500.0, 1000.0), 150.0);
    }

    #[test]
    fn zero_limit_is_defined() {
        assert_eq!(usage_percentage(0.0, 0.0), 0.0);
        assert_eq!(usage_percentage(3.0, 0.0), 100.0);
        assert!(!usage_percentage(3.0, 0.0).is_nan());
    }

    #[test]
    fn server_percentage_is_kept() {
        let mut data = update("emails", "2026-10", 10.0, 100.0);
        data.percentage = Some(12.5);
        assert_eq!(UsageMetric::from_update(&data).percentage, 12.5);
    }

    #[test]
    fn record_replaces_without_merging() {
        let mut book = UsageBook::new();
        book.record(UsageMetric::from_update(&update("emails", "2026-10", 10.0, 100.0)));
        book.record(UsageMetric::from_update(&update("emails", "2026-10", 5.0, 50.0)));

        let stored = book.get("emails", "2026-10").unwrap();
        assert_eq!(stored.current, 5.0);
        assert_eq!(stored.limit, 50.0);
        assert_eq!(book.all().len(), 1);
    }

    #[test]
    fn latest_picks_most_recent_period() {
        let mut book = UsageBook::new();
        book.record(UsageMetric::from_update(&update("emails", "2026-11", 1.0, 100.0)));
        book.record(UsageMetric::from_update(&update("emails", "2026-10", 99.0, 100.0)));
        book.record(UsageMetric::from_update(&update("leads", "2026-10", 7.0, 10.0)));

        assert_eq!(book.latest("emails").unwrap().period, "2026-10");
        assert!(book.latest("domains").is_none());
    }

    #[test]
    fn limit_reached_at_hundred() {
        let at = UsageMetric::from_update(&update("emails", "p", 100.0, 100.0));
        let below = UsageMetric::from_update(&update("emails", "p", 99.0, 100.0));
        assert!(at.limit_reached());
        assert!(!below.limit_reached());
    }
}
