//! Size-or-timeout batching mailbox.

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use super::Subscriber;

/// Which condition ended a [`BatchMailbox::wait_for_batch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchWait {
    /// The live queue reached the batch size.
    SizeReached,
    /// The timeout elapsed with fewer than a full batch pending.
    TimedOut,
}

/// A mailbox that accumulates messages for batch processing.
///
/// Producers deliver into the live queue; the flusher thread blocks in
/// [`wait_for_batch`](BatchMailbox::wait_for_batch) and then calls
/// [`drain`](BatchMailbox::drain), which swaps pending messages out into a
/// private buffer. Producers keep enqueueing into the live queue while the
/// drained batch is being processed, so a slow disk write never contends
/// with capture.
pub struct BatchMailbox<T> {
    queue: Mutex<VecDeque<Arc<T>>>,
    ready: Condvar,
    batch_size: usize,
}

impl<T> BatchMailbox<T> {
    /// `batch_size` is clamped to at least 1.
    pub fn new(batch_size: usize) -> Self {
        BatchMailbox {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    /// Block until the live queue holds a full batch or `timeout` elapses,
    /// reporting which happened first.
    pub fn wait_for_batch(&self, timeout: Duration) -> BatchWait {
        let guard = self.queue.lock().unwrap();
        let (guard, _result) = self
            .ready
            .wait_timeout_while(guard, timeout, |queue| queue.len() < self.batch_size)
            .unwrap();
        if guard.len() >= self.batch_size {
            BatchWait::SizeReached
        } else {
            BatchWait::TimedOut
        }
    }

    /// Swap out up to one batch of pending messages.
    ///
    /// Takes the whole live queue when it holds at most `batch_size`
    /// messages, otherwise exactly `batch_size`, leaving the remainder (and
    /// anything delivered meanwhile) for the next call. Returns an empty
    /// buffer when nothing is pending.
    pub fn drain(&self) -> VecDeque<Arc<T>> {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() <= self.batch_size {
            mem::take(&mut *queue)
        } else {
            let rest = queue.split_off(self.batch_size);
            mem::replace(&mut *queue, rest)
        }
    }
}

impl<T: Send + Sync> Subscriber<T> for BatchMailbox<T> {
    fn deliver(&self, message: Arc<T>) {
        let should_notify = {
            let mut queue = self.queue.lock().unwrap();
            queue.push_back(message);
            queue.len() >= self.batch_size
        };
        if should_notify {
            self.ready.notify_one();
        }
    }
}
