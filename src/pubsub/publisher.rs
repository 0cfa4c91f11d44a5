//! Broadcast side of the streaming core.

use std::sync::{Arc, Mutex};

/// Capability interface for anything that accepts a published message.
///
/// Implementations must only enqueue: delivery runs on the publisher's
/// thread and must never block on consumer processing.
pub trait Subscriber<T>: Send + Sync {
    fn deliver(&self, message: Arc<T>);
}

/// Broadcasts messages to a dynamic set of subscriber mailboxes.
///
/// The subscriber list has its own lock, separate from any mailbox lock, so
/// slow consumer processing never blocks (un)subscription or publication.
pub struct Publisher<T> {
    subscribers: Mutex<Vec<Arc<dyn Subscriber<T>>>>,
}

fn data_ptr<T: ?Sized>(sub: &Arc<T>) -> *const () {
    Arc::as_ptr(sub) as *const ()
}

impl<T> Publisher<T> {
    pub fn new() -> Self {
        Publisher {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a subscriber. Safe to call while another thread is
    /// publishing.
    pub fn subscribe(&self, sub: Arc<dyn Subscriber<T>>) {
        self.subscribers.lock().unwrap().push(sub);
    }

    /// Remove a subscriber by identity. Unknown subscribers are a no-op.
    pub fn unsubscribe(&self, sub: &Arc<dyn Subscriber<T>>) {
        let target = data_ptr(sub);
        self.subscribers
            .lock()
            .unwrap()
            .retain(|s| data_ptr(s) != target);
    }

    /// Enqueue `message` into every subscribed mailbox, in subscription
    /// order.
    ///
    /// The subscriber list is locked for the duration of the enqueues, so
    /// concurrent publishes deliver in a consistent order to every mailbox.
    /// Enqueueing never runs consumer logic and never waits on a consumer.
    pub fn publish(&self, message: Arc<T>) {
        let subscribers = self.subscribers.lock().unwrap();
        for sub in subscribers.iter() {
            sub.deliver(Arc::clone(&message));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Drop all subscriptions. Subscribers are not flushed; pending
    /// messages remain in their mailboxes.
    pub fn shutdown(&self) {
        self.subscribers.lock().unwrap().clear();
    }
}

impl<T> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}
