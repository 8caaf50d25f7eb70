//! Correlation table: id → handler for inbound frames.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::InboundMessage;

/// Handler invoked for the single response to a request.
pub(crate) type OneShotFn = Box<dyn FnOnce(InboundMessage) + Send>;

/// Handler invoked for every push on a subscription.
pub(crate) type SubscriptionFn = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// What a table entry does when a frame with its id arrives.
pub(crate) enum HandlerKind {
    /// Removed from the table before it runs.
    OneShot(OneShotFn),
    /// Stays in the table until it is cleared.
    Subscription(SubscriptionFn),
}

/// Id → handler table. At most one handler per id.
///
/// The lock is never held while a handler runs.
#[derive(Default)]
pub(crate) struct HandlerTable {
    entries: Mutex<HashMap<String, HandlerKind>>,
}

impl HandlerTable {
    pub(crate) fn insert_one_shot(&self, id: String, handler: OneShotFn) {
        let _ = self.entries.lock().insert(id, HandlerKind::OneShot(handler));
    }

    pub(crate) fn insert_subscription(&self, id: String, handler: SubscriptionFn) {
        let _ = self
            .entries
            .lock()
            .insert(id, HandlerKind::Subscription(handler));
    }

    pub(crate) fn remove(&self, id: &str) -> Option<HandlerKind> {
        self.entries.lock().remove(id)
    }

    /// Resolve the handler for an inbound frame.
    ///
    /// One-shot entries are removed; subscription entries are shared.
    pub(crate) fn take_for_dispatch(&self, id: &str) -> Option<HandlerKind> {
        let mut entries = self.entries.lock();
        match entries.get(id)? {
            HandlerKind::Subscription(handler) => {
                Some(HandlerKind::Subscription(Arc::clone(handler)))
            }
            HandlerKind::OneShot(_) => entries.remove(id),
        }
    }

    /// Drop every entry, returning how many there were.
    pub(crate) fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }
}
