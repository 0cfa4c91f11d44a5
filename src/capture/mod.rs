//! Capture sources: the global keyboard listener and the frame grabber.

mod frames;
mod keyboard;

pub use frames::{run_capture_loop, FrameGrabber, SyntheticGrabber};
pub use keyboard::{virtual_key, KeyListener};

use thiserror::Error;

/// Errors raised while setting up a capture source.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("listener already running")]
    AlreadyRunning,
    #[error("capture device failed: {0}")]
    DeviceFailed(String),
}
