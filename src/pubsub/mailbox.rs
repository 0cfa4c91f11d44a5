//! Immediate-consumption mailbox.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::Subscriber;

/// A per-consumer FIFO queue of pending messages. Unbounded.
///
/// The consumer polls with [`Mailbox::take`], which pops at most one
/// message and releases the lock before the caller runs its handler, so
/// arbitrary-length handler work never holds the mailbox lock.
pub struct Mailbox<T> {
    queue: Mutex<VecDeque<Arc<T>>>,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Mailbox {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Pop the oldest pending message, if any. Never blocks; callers poll
    /// on their own cadence.
    pub fn take(&self) -> Option<Arc<T>> {
        self.queue.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync> Subscriber<T> for Mailbox<T> {
    fn deliver(&self, message: Arc<T>) {
        self.queue.lock().unwrap().push_back(message);
    }
}
