//! Session disk writers and the external post-processing worker.

mod frame_log;
mod key_log;
mod worker;

pub use frame_log::{read_frame, FrameLogger};
pub use key_log::KeyEventLogger;
pub use worker::{PostProcessor, WorkerConfig, WorkerError, SHUTDOWN_SENTINEL};
