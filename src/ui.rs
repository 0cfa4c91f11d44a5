//! Presentation seams for the live display and the typing surface.
//!
//! The real views (a preview window, a text-practice widget) live outside
//! this crate; the supervisor feeds whatever implementations it is given
//! from the two always-on consumer threads.

use std::time::{Duration, Instant};

use crate::types::{KeyEvent, ProcessedFrame};

/// Receives every processed frame on the display thread.
pub trait FrameSink: Send {
    fn present(&mut self, frame: &ProcessedFrame);
}

/// Receives every keyboard event on the text-UI thread.
pub trait KeySink: Send {
    fn key(&mut self, event: &KeyEvent);
}

/// Default display sink: counts frames and logs throughput periodically.
pub struct FrameRateLog {
    presented: u64,
    window_start: Instant,
    window_frames: u64,
    report_every: Duration,
}

impl FrameRateLog {
    pub fn new() -> Self {
        FrameRateLog {
            presented: 0,
            window_start: Instant::now(),
            window_frames: 0,
            report_every: Duration::from_secs(5),
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl Default for FrameRateLog {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for FrameRateLog {
    fn present(&mut self, frame: &ProcessedFrame) {
        self.presented += 1;
        self.window_frames += 1;

        let elapsed = self.window_start.elapsed();
        if elapsed >= self.report_every {
            let fps = self.window_frames as f64 / elapsed.as_secs_f64();
            log::info!(
                "display: {:.1} fps, {}x{}, {} frames total",
                fps,
                frame.header().width,
                frame.header().height,
                self.presented
            );
            self.window_start = Instant::now();
            self.window_frames = 0;
        }
    }
}

/// Default typing sink: tallies keystrokes for the periodic status line.
pub struct KeystrokeLog {
    presses: u64,
    last_report: Instant,
    report_every: Duration,
}

impl KeystrokeLog {
    pub fn new() -> Self {
        KeystrokeLog {
            presses: 0,
            last_report: Instant::now(),
            report_every: Duration::from_secs(10),
        }
    }

    pub fn presses(&self) -> u64 {
        self.presses
    }
}

impl Default for KeystrokeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySink for KeystrokeLog {
    fn key(&mut self, event: &KeyEvent) {
        if !event.pressed {
            return;
        }
        self.presses += 1;
        if self.last_report.elapsed() >= self.report_every {
            log::debug!("typing: {} keystrokes so far", self.presses);
            self.last_report = Instant::now();
        }
    }
}
