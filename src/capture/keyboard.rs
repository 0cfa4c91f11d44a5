//! System-wide keyboard capture.
//!
//! Uses rdev for cross-platform global key listening; every key press and
//! release is published as a [`KeyEvent`] to the shared publisher.

use rdev::{listen, Event, EventType, Key};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::CaptureError;
use crate::pubsub::Publisher;
use crate::types::{monotonic_ms, KeyEvent};

/// Owns the global listener thread and the key-event publisher.
pub struct KeyListener {
    publisher: Arc<Publisher<KeyEvent>>,
    /// Tells the callback to stop publishing (the OS hook itself cannot be
    /// unhooked once `listen` is running)
    stop_flag: Arc<AtomicBool>,
    listener_thread: Option<JoinHandle<()>>,
}

impl KeyListener {
    pub fn new(publisher: Arc<Publisher<KeyEvent>>) -> Self {
        KeyListener {
            publisher,
            stop_flag: Arc::new(AtomicBool::new(false)),
            listener_thread: None,
        }
    }

    pub fn publisher(&self) -> Arc<Publisher<KeyEvent>> {
        self.publisher.clone()
    }

    /// Start the background listener thread.
    ///
    /// Hook installation happens on the spawned thread; if the platform
    /// refuses the hook (missing permission, no display) the failure is
    /// logged there and the stream simply stays silent.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.listener_thread.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        let publisher = self.publisher.clone();
        let stop_flag = self.stop_flag.clone();

        let handle = thread::spawn(move || {
            let callback = move |event: Event| {
                if stop_flag.load(Ordering::SeqCst) {
                    return;
                }

                let (key, pressed) = match event.event_type {
                    EventType::KeyPress(key) => (key, true),
                    EventType::KeyRelease(key) => (key, false),
                    _ => return,
                };

                publisher.publish(Arc::new(KeyEvent {
                    vkey: virtual_key(&key),
                    scan_code: 0,
                    pressed,
                    timestamp_ms: monotonic_ms(),
                }));
            };

            // Blocks until error; on macOS this requires Accessibility
            // permission, on Linux an X11 display.
            if let Err(e) = listen(callback) {
                log::error!("keyboard listener failed: {:?}", e);
            }
        });

        self.listener_thread = Some(handle);
        Ok(())
    }

    /// Stop publishing key events.
    ///
    /// rdev's `listen` has no clean way to stop, so the thread lives until
    /// process exit; the stop flag just silences it.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.listener_thread = None;
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map an rdev key to a Windows-style virtual key code.
///
/// The trigger detector and the CSV log both speak vkey codes; unknown
/// keys map to 0 and never match a trigger.
pub fn virtual_key(key: &Key) -> u16 {
    match key {
        Key::Space => 0x20,
        Key::Return => 0x0D,
        Key::Backspace => 0x08,
        Key::Tab => 0x09,
        Key::Escape => 0x1B,
        Key::ShiftLeft | Key::ShiftRight => 0x10,
        Key::ControlLeft | Key::ControlRight => 0x11,
        Key::Alt | Key::AltGr => 0x12,
        Key::CapsLock => 0x14,
        Key::LeftArrow => 0x25,
        Key::UpArrow => 0x26,
        Key::RightArrow => 0x27,
        Key::DownArrow => 0x28,
        Key::Delete => 0x2E,
        Key::Home => 0x24,
        Key::End => 0x23,
        Key::PageUp => 0x21,
        Key::PageDown => 0x22,
        Key::Num0 => 0x30,
        Key::Num1 => 0x31,
        Key::Num2 => 0x32,
        Key::Num3 => 0x33,
        Key::Num4 => 0x34,
        Key::Num5 => 0x35,
        Key::Num6 => 0x36,
        Key::Num7 => 0x37,
        Key::Num8 => 0x38,
        Key::Num9 => 0x39,
        Key::KeyA => 0x41,
        Key::KeyB => 0x42,
        Key::KeyC => 0x43,
        Key::KeyD => 0x44,
        Key::KeyE => 0x45,
        Key::KeyF => 0x46,
        Key::KeyG => 0x47,
        Key::KeyH => 0x48,
        Key::KeyI => 0x49,
        Key::KeyJ => 0x4A,
        Key::KeyK => 0x4B,
        Key::KeyL => 0x4C,
        Key::KeyM => 0x4D,
        Key::KeyN => 0x4E,
        Key::KeyO => 0x4F,
        Key::KeyP => 0x50,
        Key::KeyQ => 0x51,
        Key::KeyR => 0x52,
        Key::KeyS => 0x53,
        Key::KeyT => 0x54,
        Key::KeyU => 0x55,
        Key::KeyV => 0x56,
        Key::KeyW => 0x57,
        Key::KeyX => 0x58,
        Key::KeyY => 0x59,
        Key::KeyZ => 0x5A,
        Key::Unknown(code) => *code as u16,
        _ => 0,
    }
}
