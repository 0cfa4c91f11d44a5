//! Session trigger detection from the keyboard-event stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bus::{ControlBus, ControlEvent};
use crate::pubsub::Mailbox;
use crate::types::KeyEvent;

/// Virtual key code for the space bar.
pub const VKEY_SPACE: u16 = 0x20;

/// Tuning for the trigger sequence and the session watchdog.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Key that arms the sequence
    pub trigger_vkey: u16,
    /// Presses required to fire a toggle
    pub required_count: u32,
    /// Maximum gap between presses to keep the sequence alive
    pub interpress_timeout: Duration,
    /// Session duration after which the watchdog forces a stop
    pub auto_stop: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig {
            trigger_vkey: VKEY_SPACE,
            required_count: 3,
            interpress_timeout: Duration::from_millis(1000),
            auto_stop: Duration::from_millis(30_000),
        }
    }
}

/// Watches the keyboard stream for the repeated-key pattern and raises
/// session control events.
///
/// The detector owns its mailbox; the supervisor subscribes a clone of it
/// to the key-event publisher and drives [`poll`](TriggerDetector::poll)
/// and [`check_auto_stop`](TriggerDetector::check_auto_stop) from the
/// trigger thread.
pub struct TriggerDetector {
    mailbox: Arc<Mailbox<KeyEvent>>,
    bus: Arc<ControlBus>,
    config: TriggerConfig,
    press_count: u32,
    last_press: Instant,
    logging_active: Arc<AtomicBool>,
    session_start: Option<Instant>,
}

impl TriggerDetector {
    pub fn new(bus: Arc<ControlBus>, config: TriggerConfig) -> Self {
        TriggerDetector {
            mailbox: Arc::new(Mailbox::new()),
            bus,
            config,
            press_count: 0,
            last_press: Instant::now(),
            logging_active: Arc::new(AtomicBool::new(false)),
            session_start: None,
        }
    }

    /// Mailbox handle for subscribing to the key-event publisher.
    pub fn mailbox(&self) -> Arc<Mailbox<KeyEvent>> {
        self.mailbox.clone()
    }

    /// Shared flag other threads may read to learn the logging state.
    pub fn logging_handle(&self) -> Arc<AtomicBool> {
        self.logging_active.clone()
    }

    pub fn is_logging_active(&self) -> bool {
        self.logging_active.load(Ordering::SeqCst)
    }

    /// Elapsed time in the active session, if one is running.
    pub fn session_elapsed(&self) -> Option<Duration> {
        self.session_start.map(|start| start.elapsed())
    }

    /// Dequeue and process at most one pending key event. Returns whether
    /// a message was handled.
    pub fn poll(&mut self) -> bool {
        match self.mailbox.take() {
            Some(event) => {
                self.on_key(&event);
                true
            }
            None => false,
        }
    }

    fn on_key(&mut self, event: &KeyEvent) {
        if !event.pressed {
            return;
        }

        let now = Instant::now();

        if event.vkey == self.config.trigger_vkey {
            // A gap over the inter-press timeout restarts the sequence.
            if now.duration_since(self.last_press) > self.config.interpress_timeout {
                self.press_count = 0;
            }

            self.press_count += 1;
            self.last_press = now;

            if self.press_count >= self.config.required_count {
                self.bus.publish(ControlEvent::ToggleLogging);
                let active = !self.logging_active.load(Ordering::SeqCst);
                self.logging_active.store(active, Ordering::SeqCst);

                if active {
                    self.session_start = Some(now);
                } else {
                    self.session_start = None;
                }

                self.press_count = 0;
            }
        } else {
            // Any other key breaks the sequence.
            self.press_count = 0;
        }
    }

    /// Watchdog tick: stop an over-long session.
    ///
    /// Safe to call on every polling tick; when no session is active this
    /// is a no-op returning false. When the active session has outlived
    /// the configured auto-stop duration, publishes a single STOP, marks
    /// logging inactive, and returns true.
    pub fn check_auto_stop(&mut self) -> bool {
        if !self.logging_active.load(Ordering::SeqCst) {
            return false;
        }
        let Some(start) = self.session_start else {
            return false;
        };

        if start.elapsed() >= self.config.auto_stop {
            log::info!(
                "auto-stopping session after {:?}",
                self.config.auto_stop
            );
            self.bus.publish(ControlEvent::StopLogging);
            self.logging_active.store(false, Ordering::SeqCst);
            self.session_start = None;
            return true;
        }

        false
    }
}
