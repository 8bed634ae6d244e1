//! Reference-counted campaign topic subscriptions.
//!
//! Several UI surfaces may watch the same campaign. Only the first local
//! subscriber causes a server subscribe and only the last one leaving
//! causes a server unsubscribe.

use std::collections::BTreeMap;

use coldreach_core::types::CampaignId;

#[derive(Debug, Default)]
pub struct TopicSubscriptions {
    counts: BTreeMap<CampaignId, usize>,
}

impl TopicSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one local subscriber. Returns `true` for the first one.
    pub fn acquire(&mut self, campaign_id: &str) -> bool {
        let count = self.counts.entry(campaign_id.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Drop one local subscriber. Returns `true` when it was the last.
    ///
    /// Releasing a topic with no subscribers is a no-op returning `false`.
    pub fn release(&mut self, campaign_id: &str) -> bool {
        let Some(count) = self.counts.get_mut(campaign_id) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.counts.remove(campaign_id);
            true
        } else {
            false
        }
    }

    pub fn ref_count(&self, campaign_id: &str) -> usize {
        self.counts.get(campaign_id).copied().unwrap_or(0)
    }

    /// Every topic with at least one subscriber, in id order.
    pub fn topics(&self) -> Vec<CampaignId> {
        self.counts.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_acquire_and_last_release_are_reported() {
        let mut topics = TopicSubscriptions::new();
        assert!(topics.acquire("c-1"));
        assert!(!topics.acquire("c-1"));
        assert_eq!(topics.ref_count("c-1"), 2);

        assert!(!topics.release("c-1"));
        assert_eq!(topics.topics(), vec!["c-1".to_string()]);
        assert!(topics.release("c-1"));
        assert!(topics.is_empty());
    }

    #[test]
    fn releasing_unknown_topic_is_noop() {
        let mut topics = TopicSubscriptions::new();
        assert!(!topics.release("missing"));
        assert_eq!(topics.ref_count("missing"), 0);
    }

    #[test]
    fn topics_are_listed_in_order() {
        let mut topics = TopicSubscriptions::new();
        topics.acquire("c-2");
        topics.acquire("c-1");
        assert_eq!(topics.topics(), vec!["c-1".to_string(), "c-2".to_string()]);
    }
}
