//! Batched CSV logging of keyboard events.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::pubsub::{BatchMailbox, BatchWait};
use crate::types::KeyEvent;

/// Appends key events to a session's `key_events.csv` in batches.
///
/// One line per event: `timestamp_ms,vkey,scan_code,pressed` with pressed
/// as `1`/`0`. The file is opened in append mode per batch; if it cannot
/// be opened that batch is skipped and the session continues.
pub struct KeyEventLogger {
    mailbox: Arc<BatchMailbox<KeyEvent>>,
    path: PathBuf,
}

impl KeyEventLogger {
    pub fn new(path: PathBuf, batch_size: usize) -> Self {
        KeyEventLogger {
            mailbox: Arc::new(BatchMailbox::new(batch_size)),
            path,
        }
    }

    /// Mailbox handle for subscribing to the key-event publisher.
    pub fn mailbox(&self) -> Arc<BatchMailbox<KeyEvent>> {
        self.mailbox.clone()
    }

    pub fn wait_for_batch(&self, timeout: Duration) -> BatchWait {
        self.mailbox.wait_for_batch(timeout)
    }

    /// Write out up to one batch of pending events.
    pub fn flush(&mut self) {
        let drained = self.mailbox.drain();
        if drained.is_empty() {
            return;
        }

        let Ok(mut file) = OpenOptions::new().append(true).create(true).open(&self.path) else {
            return;
        };

        for event in &drained {
            let _ = writeln!(
                file,
                "{},{},{},{}",
                event.timestamp_ms,
                event.vkey,
                event.scan_code,
                if event.pressed { 1 } else { 0 }
            );
        }
        let _ = file.flush();
    }

    /// Flush until the mailbox is empty.
    fn flush_all(&mut self) {
        while !self.mailbox.is_empty() {
            self.flush();
        }
    }
}

impl Drop for KeyEventLogger {
    fn drop(&mut self) {
        // Buffered events must reach disk even on early loop exit.
        self.flush_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::Subscriber;
    use tempfile::TempDir;

    fn event(vkey: u16, timestamp_ms: u64, pressed: bool) -> Arc<KeyEvent> {
        Arc::new(KeyEvent {
            vkey,
            scan_code: 42,
            pressed,
            timestamp_ms,
        })
    }

    fn read_lines(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_flush_writes_csv_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key_events.csv");
        let mut logger = KeyEventLogger::new(path.clone(), 10);

        logger.mailbox().deliver(event(0x20, 100, true));
        logger.mailbox().deliver(event(0x41, 150, false));
        logger.flush();

        let lines = read_lines(&path);
        assert_eq!(lines, vec!["100,32,42,1", "150,65,42,0"]);
    }

    #[test]
    fn test_flush_empty_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key_events.csv");
        let mut logger = KeyEventLogger::new(path.clone(), 10);
        logger.flush();
        assert!(!path.exists());
    }

    #[test]
    fn test_flushes_append_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key_events.csv");
        let mut logger = KeyEventLogger::new(path.clone(), 100);

        logger.mailbox().deliver(event(1, 1, true));
        logger.flush();
        logger.mailbox().deliver(event(2, 2, true));
        logger.flush();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("1,"));
        assert!(lines[1].starts_with("2,"));
    }

    #[test]
    fn test_drop_flushes_pending_events_exactly_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key_events.csv");
        {
            let logger = KeyEventLogger::new(path.clone(), 100);
            for i in 0..250 {
                logger.mailbox().deliver(event(1, i, true));
            }
            // Dropped with 250 pending and a batch size of 100: the drop
            // flush must still write all of them.
        }
        assert_eq!(read_lines(&path).len(), 250);
    }

    #[test]
    fn test_unwritable_path_skips_batch_silently() {
        let mut logger = KeyEventLogger::new(PathBuf::from("/nonexistent-dir/log.csv"), 10);
        logger.mailbox().deliver(event(1, 1, true));
        logger.flush();
        // The batch is gone but nothing panicked; the session survives.
        assert!(logger.mailbox().is_empty());
    }
}
