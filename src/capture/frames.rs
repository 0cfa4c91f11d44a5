//! Frame acquisition and the fixed-period capture loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::CaptureError;
use crate::pubsub::Publisher;
use crate::types::{monotonic_ms, PixelFormat, RawFrame};

/// Pluggable frame source.
///
/// The capture loop owns exactly one grabber; real camera backends
/// implement this trait, and [`SyntheticGrabber`] ships as the default.
pub trait FrameGrabber: Send {
    /// Acquire the next frame. Blocking up to roughly one frame period is
    /// acceptable; longer delays just shift downstream timing.
    fn grab(&mut self) -> Result<RawFrame, CaptureError>;
}

/// Deterministic NV12 test-pattern source.
///
/// Produces a luma gradient that shifts one step per frame, so consecutive
/// frames are distinguishable and conversions are reproducible.
pub struct SyntheticGrabber {
    width: u32,
    height: u32,
    counter: u64,
}

impl SyntheticGrabber {
    pub fn new(width: u32, height: u32) -> Self {
        SyntheticGrabber {
            width,
            height,
            counter: 0,
        }
    }
}

impl FrameGrabber for SyntheticGrabber {
    fn grab(&mut self) -> Result<RawFrame, CaptureError> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut data = vec![0u8; PixelFormat::Nv12.frame_len(self.width, self.height)];

        let shift = self.counter as usize;
        for y in 0..h {
            for x in 0..w {
                data[y * w + x] = ((x + y + shift) % 256) as u8;
            }
        }
        // Neutral chroma (gray) for the whole UV plane.
        for byte in data[w * h..].iter_mut() {
            *byte = 128;
        }

        self.counter += 1;
        Ok(RawFrame {
            format: PixelFormat::Nv12,
            width: self.width,
            height: self.height,
            timestamp_ms: monotonic_ms(),
            data,
        })
    }
}

/// Capture loop body for the frame-capture thread.
///
/// Grabs and publishes one frame per `period` against an absolute
/// deadline, so a slow grab delays subsequent frames instead of changing
/// the cadence. A failed grab is logged and skipped. Runs until `running`
/// clears.
pub fn run_capture_loop(
    mut grabber: Box<dyn FrameGrabber>,
    publisher: Arc<Publisher<RawFrame>>,
    running: Arc<AtomicBool>,
    period: Duration,
) {
    let mut next_deadline = Instant::now();

    while running.load(Ordering::SeqCst) {
        match grabber.grab() {
            Ok(frame) => publisher.publish(Arc::new(frame)),
            Err(e) => log::warn!("frame grab failed, skipping: {}", e),
        }

        next_deadline += period;
        let now = Instant::now();
        if next_deadline > now {
            thread::sleep(next_deadline - now);
        } else {
            // Fell behind; realign rather than bursting to catch up.
            next_deadline = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::{Mailbox, Subscriber};

    #[test]
    fn test_synthetic_frames_have_expected_size() {
        let mut grabber = SyntheticGrabber::new(64, 48);
        let frame = grabber.grab().unwrap();
        assert_eq!(frame.format, PixelFormat::Nv12);
        assert_eq!(frame.data.len(), PixelFormat::Nv12.frame_len(64, 48));
    }

    #[test]
    fn test_synthetic_frames_differ_over_time() {
        let mut grabber = SyntheticGrabber::new(16, 16);
        let a = grabber.grab().unwrap();
        let b = grabber.grab().unwrap();
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_capture_loop_publishes_until_stopped() {
        let publisher = Arc::new(Publisher::new());
        let mailbox = Arc::new(Mailbox::new());
        publisher.subscribe(mailbox.clone() as Arc<dyn Subscriber<RawFrame>>);

        let running = Arc::new(AtomicBool::new(true));
        let handle = {
            let publisher = publisher.clone();
            let running = running.clone();
            thread::spawn(move || {
                run_capture_loop(
                    Box::new(SyntheticGrabber::new(16, 16)),
                    publisher,
                    running,
                    Duration::from_millis(5),
                )
            })
        };

        thread::sleep(Duration::from_millis(60));
        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        let captured = mailbox.len();
        assert!(captured >= 2, "expected several frames, got {}", captured);
        let count_after_stop = mailbox.len();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(mailbox.len(), count_after_stop);
    }
}
