//! Batched binary logging of processed frames.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::pubsub::{BatchMailbox, BatchWait};
use crate::types::{FrameHeader, ProcessedFrame};

/// Writes each frame to its own file in the session's `frames/` directory.
///
/// Files are named `frame_NNNNNN.raw` with a zero-padded monotonically
/// increasing sequence number, and contain the little-endian
/// [`FrameHeader`] immediately followed by the raw pixel payload. A write
/// failure skips that frame.
pub struct FrameLogger {
    mailbox: Arc<BatchMailbox<ProcessedFrame>>,
    directory: PathBuf,
    frame_count: u64,
}

impl FrameLogger {
    pub fn new(directory: PathBuf, batch_size: usize) -> Self {
        FrameLogger {
            mailbox: Arc::new(BatchMailbox::new(batch_size)),
            directory,
            frame_count: 0,
        }
    }

    /// Mailbox handle for subscribing to the processed-frame publisher.
    pub fn mailbox(&self) -> Arc<BatchMailbox<ProcessedFrame>> {
        self.mailbox.clone()
    }

    pub fn wait_for_batch(&self, timeout: Duration) -> BatchWait {
        self.mailbox.wait_for_batch(timeout)
    }

    /// Write out up to one batch of pending frames.
    pub fn flush(&mut self) {
        let drained = self.mailbox.drain();
        for frame in &drained {
            self.write_frame(frame);
        }
    }

    fn write_frame(&mut self, frame: &ProcessedFrame) {
        let name = format!("frame_{:06}.raw", self.frame_count);
        self.frame_count += 1;
        let path = self.directory.join(name);

        let Ok(mut file) = File::create(&path) else {
            return;
        };
        if file.write_all(&frame.header().to_bytes()).is_err() {
            return;
        }
        let _ = file.write_all(frame.data());
    }

    /// Flush until the mailbox is empty.
    fn flush_all(&mut self) {
        while !self.mailbox.is_empty() {
            self.flush();
        }
    }
}

impl Drop for FrameLogger {
    fn drop(&mut self) {
        self.flush_all();
    }
}

/// Decode one recorded frame file back into its header and payload.
///
/// Used by `keycam inspect` and by anything replaying a session.
pub fn read_frame(path: &Path) -> std::io::Result<(FrameHeader, Vec<u8>)> {
    let mut file = File::open(path)?;
    let mut header_bytes = [0u8; FrameHeader::SIZE];
    file.read_exact(&mut header_bytes)?;
    let header = FrameHeader::from_bytes(&header_bytes);

    let mut data = vec![0u8; header.len as usize];
    file.read_exact(&mut data)?;
    Ok((header, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::Subscriber;
    use tempfile::TempDir;

    fn frame(timestamp_ms: u64) -> Arc<ProcessedFrame> {
        let data: Vec<u8> = (0..32 * 24 * 3).map(|i| (i % 251) as u8).collect();
        Arc::new(ProcessedFrame::new(timestamp_ms, 32, 24, data))
    }

    #[test]
    fn test_frames_are_written_with_sequence_names() {
        let dir = TempDir::new().unwrap();
        let mut logger = FrameLogger::new(dir.path().to_path_buf(), 10);

        for i in 0..3 {
            logger.mailbox().deliver(frame(i));
        }
        logger.flush();

        for i in 0..3 {
            assert!(dir.path().join(format!("frame_{:06}.raw", i)).exists());
        }
        assert!(!dir.path().join("frame_000003.raw").exists());
    }

    #[test]
    fn test_written_frame_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut logger = FrameLogger::new(dir.path().to_path_buf(), 10);
        let original = frame(9001);
        logger.mailbox().deliver(original.clone());
        logger.flush();

        let (header, data) = read_frame(&dir.path().join("frame_000000.raw")).unwrap();
        assert_eq!(header, *original.header());
        assert_eq!(data, original.data());
    }

    #[test]
    fn test_sequence_continues_across_flushes() {
        let dir = TempDir::new().unwrap();
        let mut logger = FrameLogger::new(dir.path().to_path_buf(), 10);

        logger.mailbox().deliver(frame(1));
        logger.flush();
        logger.mailbox().deliver(frame(2));
        logger.flush();

        assert!(dir.path().join("frame_000000.raw").exists());
        assert!(dir.path().join("frame_000001.raw").exists());
    }

    #[test]
    fn test_drop_flushes_pending_frames() {
        let dir = TempDir::new().unwrap();
        {
            let logger = FrameLogger::new(dir.path().to_path_buf(), 100);
            for i in 0..7 {
                logger.mailbox().deliver(frame(i));
            }
        }
        let written = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(written, 7);
    }

    #[test]
    fn test_read_frame_rejects_truncated_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame_000000.raw");
        std::fs::write(&path, [1, 2, 3]).unwrap();
        assert!(read_frame(&path).is_err());
    }
}
