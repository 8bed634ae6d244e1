//! Observer lists keyed by event kind.

use std::collections::HashMap;
use std::sync::Arc;

use crate::messages::{BusEvent, EventKind};

/// A registered event callback.
pub type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Token returned by registration; pass it back to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Handlers per event kind, kept in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(HandlerId, Handler)>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: EventKind, handler: Handler) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers.entry(kind).or_default().push((id, handler));
        id
    }

    /// Remove exactly the handler registered under `id` for `kind`.
    ///
    /// Returns `false` if no such handler exists.
    pub fn remove(&mut self, kind: EventKind, id: HandlerId) -> bool {
        let Some(list) = self.handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.handlers.remove(&kind);
        }
        removed
    }

    /// Snapshot of the handlers for `kind`, in registration order.
    ///
    /// Cloned out so callers can invoke them without holding a lock.
    pub fn handlers_for(&self, kind: EventKind) -> Vec<Handler> {
        self.handlers
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::messages::{NotificationData, Severity};

    fn notice() -> BusEvent {
        BusEvent::SystemNotification(NotificationData {
            title: "t".into(),
            message: "m".into(),
            severity: Severity::Info,
        })
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        for label in ["first", "second", "third"] {
            let calls = Arc::clone(&calls);
            registry.register(
                EventKind::SystemNotification,
                Arc::new(move |_| calls.lock().unwrap().push(label)),
            );
        }

        for handler in registry.handlers_for(EventKind::SystemNotification) {
            handler(&notice());
        }
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn remove_targets_exactly_one_handler() {
        let mut registry = HandlerRegistry::new();
        let a = registry.register(EventKind::UsageUpdate, Arc::new(|_| {}));
        let b = registry.register(EventKind::UsageUpdate, Arc::new(|_| {}));

        assert!(registry.remove(EventKind::UsageUpdate, a));
        assert_eq!(registry.count(EventKind::UsageUpdate), 1);
        assert!(!registry.remove(EventKind::UsageUpdate, a));
        // Same id under a different kind is not a match.
        assert!(!registry.remove(EventKind::BillingAlert, b));
        assert!(registry.remove(EventKind::UsageUpdate, b));
        assert_eq!(registry.count(EventKind::UsageUpdate), 0);
    }

    #[test]
    fn unknown_kind_has_no_handlers() {
        let registry = HandlerRegistry::new();
        assert!(registry.handlers_for(EventKind::ServerMetrics).is_empty());
    }
}
