//! External post-processing worker lifecycle.
//!
//! The worker is an arbitrary command (the reference deployment runs a
//! Python hand-landmark extractor) that watches a session's frames
//! directory. It is handed the directory path and a concurrency hint on
//! its command line, told to stop by a sentinel file, and force-terminated
//! if it overstays the grace period.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Name of the stop-signal file created in the watched directory.
pub const SHUTDOWN_SENTINEL: &str = ".shutdown";

/// Errors spawning the worker process.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker '{command}': {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },
}

/// How to launch and stop the external worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Executable to run
    pub command: String,
    /// Arguments placed before the watched directory
    pub args: Vec<String>,
    /// Concurrency hint passed as `--workers N`
    pub workers: u32,
    /// How long to wait after signaling before force-terminating
    pub grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            command: "python".to_string(),
            args: vec!["frame_postprocessor.py".to_string()],
            workers: 8,
            grace: Duration::from_secs(30),
        }
    }
}

/// A running post-processing worker bound to one session.
pub struct PostProcessor {
    child: Option<Child>,
    watch_dir: PathBuf,
    grace: Duration,
}

impl PostProcessor {
    /// Launch the worker watching `watch_dir`.
    pub fn spawn(config: &WorkerConfig, watch_dir: &Path) -> Result<Self, WorkerError> {
        let child = Command::new(&config.command)
            .args(&config.args)
            .arg(watch_dir)
            .arg("--workers")
            .arg(config.workers.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| WorkerError::SpawnFailed {
                command: config.command.clone(),
                source: e,
            })?;

        log::info!(
            "post-processing worker started (pid {}) watching {}",
            child.id(),
            watch_dir.display()
        );

        Ok(PostProcessor {
            child: Some(child),
            watch_dir: watch_dir.to_path_buf(),
            grace: config.grace,
        })
    }

    /// Whether the worker process is still alive.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Stop the worker: drop the sentinel file, wait out the grace period,
    /// then escalate to a signal and finally a kill.
    pub fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if File::create(self.watch_dir.join(SHUTDOWN_SENTINEL)).is_err() {
            log::warn!(
                "could not create shutdown sentinel in {}",
                self.watch_dir.display()
            );
        }

        let deadline = Instant::now() + self.grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    log::info!("worker exited gracefully: {}", status);
                    return;
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    log::warn!("worker wait failed: {}", e);
                    break;
                }
            }
        }

        log::warn!("worker ignored shutdown signal, terminating");

        // Ask politely once, then kill.
        #[cfg(unix)]
        unsafe {
            libc::kill(child.id() as i32, libc::SIGTERM);
        }
        std::thread::sleep(Duration::from_millis(100));

        if matches!(child.try_wait(), Ok(None)) {
            let _ = child.kill();
        }
        let _ = child.wait();
    }
}

impl Drop for PostProcessor {
    fn drop(&mut self) {
        self.terminate();
    }
}
