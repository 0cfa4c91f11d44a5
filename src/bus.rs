//! Payload-free control signaling between components.

use std::collections::HashMap;
use std::sync::Mutex;

/// Session control events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlEvent {
    /// Begin a logging session (no-op if one is active)
    StartLogging,
    /// End the active logging session (no-op if none)
    StopLogging,
    /// Flip the logging state
    ToggleLogging,
}

type Callback = Box<dyn Fn() + Send>;

/// Synchronous fan-out of named control events to registered callbacks.
///
/// Owned by the supervisor and handed to components as `Arc<ControlBus>`.
/// `publish` invokes every callback for the event in registration order,
/// under the bus lock held for the whole invocation; callbacks must be
/// short, must not block, and must not publish on the bus themselves.
/// There is no payload and no queuing: a publish with no listeners is lost.
pub struct ControlBus {
    listeners: Mutex<HashMap<ControlEvent, Vec<Callback>>>,
}

impl ControlBus {
    pub fn new() -> Self {
        ControlBus {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Append a callback to the event's listener list.
    pub fn subscribe<F>(&self, event: ControlEvent, callback: F)
    where
        F: Fn() + Send + 'static,
    {
        self.listeners
            .lock()
            .unwrap()
            .entry(event)
            .or_default()
            .push(Box::new(callback));
    }

    /// Invoke every callback registered for `event`, in registration order.
    pub fn publish(&self, event: ControlEvent) {
        let listeners = self.listeners.lock().unwrap();
        if let Some(callbacks) = listeners.get(&event) {
            for callback in callbacks {
                callback();
            }
        }
    }

    /// Remove all callbacks for one event.
    pub fn unsubscribe(&self, event: ControlEvent) {
        self.listeners.lock().unwrap().remove(&event);
    }

    /// Remove all callbacks for all events.
    pub fn clear(&self) {
        self.listeners.lock().unwrap().clear();
    }
}

impl Default for ControlBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_publish_invokes_each_listener_once() {
        let bus = ControlBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            bus.subscribe(ControlEvent::ToggleLogging, move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish(ControlEvent::ToggleLogging);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        bus.publish(ControlEvent::ToggleLogging);
        assert_eq!(count.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_publish_is_scoped_to_event() {
        let bus = ControlBus::new();
        let started = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicUsize::new(0));
        {
            let started = started.clone();
            bus.subscribe(ControlEvent::StartLogging, move || {
                started.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let stopped = stopped.clone();
            bus.subscribe(ControlEvent::StopLogging, move || {
                stopped.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish(ControlEvent::StartLogging);
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(stopped.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let bus = ControlBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            let order = order.clone();
            bus.subscribe(ControlEvent::StartLogging, move || {
                order.lock().unwrap().push(i);
            });
        }

        bus.publish(ControlEvent::StartLogging);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_unsubscribe_removes_event_listeners() {
        let bus = ControlBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            bus.subscribe(ControlEvent::StopLogging, move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.unsubscribe(ControlEvent::StopLogging);
        bus.publish(ControlEvent::StopLogging);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_publish_without_listeners_is_noop() {
        let bus = ControlBus::new();
        bus.publish(ControlEvent::ToggleLogging);
        bus.clear();
        bus.publish(ControlEvent::StartLogging);
    }
}
