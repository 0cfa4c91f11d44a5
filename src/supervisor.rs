//! Thread ownership and session lifecycle.
//!
//! The supervisor starts the always-on capture, transform, display, text,
//! and trigger threads at process start, and reacts to control events by
//! spinning a session's logging threads (and its external worker) up and
//! down. Each session is bound to its own timestamped directory.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::bus::{ControlBus, ControlEvent};
use crate::capture::{run_capture_loop, CaptureError, FrameGrabber, KeyListener};
use crate::logging::{FrameLogger, KeyEventLogger, PostProcessor, WorkerConfig};
use crate::pubsub::{Mailbox, Publisher, Subscriber};
use crate::transform::{CropGeometry, FrameTransformer, TransformDevice, TransformError};
use crate::trigger::{TriggerConfig, TriggerDetector};
use crate::types::{KeyEvent, ProcessedFrame, RawFrame};
use crate::ui::{FrameSink, KeySink};

/// Poll interval for consumer loops with an empty mailbox.
const IDLE_POLL: Duration = Duration::from_millis(5);
/// Tick interval for the trigger thread (also paces the auto-stop check).
const TRIGGER_TICK: Duration = Duration::from_millis(33);

/// Errors starting the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("transform stage failed to initialize: {0}")]
    Transform(#[from] TransformError),
    #[error("capture failed to initialize: {0}")]
    Capture(#[from] CaptureError),
}

/// Everything the supervisor needs to run.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Base directory under which session directories are created
    pub session_dir: PathBuf,
    /// Nominal frame capture period (~33ms for 30 fps)
    pub frame_period: Duration,
    /// Batch size for both disk loggers
    pub batch_size: usize,
    /// Upper bound on how long a logger holds data below the batch size
    pub flush_interval: Duration,
    pub trigger: TriggerConfig,
    /// Post-processing worker; None disables it
    pub worker: Option<WorkerConfig>,
    pub geometry: CropGeometry,
    /// Whether to install the global keyboard hook (off in headless tests)
    pub install_key_hook: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            session_dir: PathBuf::from("sessions"),
            frame_period: Duration::from_millis(33),
            batch_size: 100,
            flush_interval: Duration::from_millis(500),
            trigger: TriggerConfig::default(),
            worker: Some(WorkerConfig::default()),
            geometry: CropGeometry::DEFAULT,
            install_key_hook: true,
        }
    }
}

/// An active logging session.
struct Session {
    id: String,
    started: Instant,
    key_thread: JoinHandle<()>,
    frame_thread: JoinHandle<()>,
}

/// State shared between the supervisor, its threads, and the bus callbacks.
struct Shared {
    running: Arc<AtomicBool>,
    logging: Arc<AtomicBool>,
    bus: Arc<ControlBus>,
    key_publisher: Arc<Publisher<KeyEvent>>,
    processed_publisher: Arc<Publisher<ProcessedFrame>>,
    session: Mutex<Option<Session>>,
    config: SupervisorConfig,
}

/// Owns all threads and the session state machine.
pub struct Supervisor {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
    key_listener: KeyListener,
}

impl Supervisor {
    /// Start all always-on threads and wire the control events.
    ///
    /// Fails if the transform stage cannot allocate its device resources;
    /// nothing is left running in that case.
    pub fn start(
        config: SupervisorConfig,
        grabber: Box<dyn FrameGrabber>,
        device: Box<dyn TransformDevice>,
        frame_sink: Box<dyn FrameSink>,
        key_sink: Box<dyn KeySink>,
    ) -> Result<Self, SupervisorError> {
        let mut transformer = FrameTransformer::new(device, config.geometry)?;

        let bus = Arc::new(ControlBus::new());
        let key_publisher = Arc::new(Publisher::new());
        let raw_publisher: Arc<Publisher<RawFrame>> = Arc::new(Publisher::new());
        raw_publisher.subscribe(transformer.mailbox() as Arc<dyn Subscriber<RawFrame>>);

        let shared = Arc::new(Shared {
            running: Arc::new(AtomicBool::new(true)),
            logging: Arc::new(AtomicBool::new(false)),
            bus: bus.clone(),
            key_publisher: key_publisher.clone(),
            processed_publisher: transformer.output(),
            session: Mutex::new(None),
            config,
        });

        subscribe_control_events(&shared);

        let mut threads = Vec::new();

        // Frame capture at the nominal period.
        threads.push(thread::spawn({
            let running = shared.running.clone();
            let period = shared.config.frame_period;
            move || run_capture_loop(grabber, raw_publisher, running, period)
        }));

        // Transform consumer: drains raw frames through the device.
        threads.push(thread::spawn({
            let running = shared.running.clone();
            move || {
                while running.load(Ordering::SeqCst) {
                    if !transformer.poll() {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            }
        }));

        // Live display.
        threads.push(thread::spawn({
            let running = shared.running.clone();
            let publisher = shared.processed_publisher.clone();
            let mut sink = frame_sink;
            move || {
                let mailbox: Arc<Mailbox<ProcessedFrame>> = Arc::new(Mailbox::new());
                publisher.subscribe(mailbox.clone() as Arc<dyn Subscriber<ProcessedFrame>>);
                while running.load(Ordering::SeqCst) {
                    match mailbox.take() {
                        Some(frame) => sink.present(&frame),
                        None => thread::sleep(IDLE_POLL),
                    }
                }
                publisher.unsubscribe(&(mailbox as Arc<dyn Subscriber<ProcessedFrame>>));
            }
        }));

        // Text-practice surface.
        threads.push(thread::spawn({
            let running = shared.running.clone();
            let publisher = shared.key_publisher.clone();
            let mut sink = key_sink;
            move || {
                let mailbox: Arc<Mailbox<KeyEvent>> = Arc::new(Mailbox::new());
                publisher.subscribe(mailbox.clone() as Arc<dyn Subscriber<KeyEvent>>);
                while running.load(Ordering::SeqCst) {
                    match mailbox.take() {
                        Some(event) => sink.key(&event),
                        None => thread::sleep(IDLE_POLL),
                    }
                }
                publisher.unsubscribe(&(mailbox as Arc<dyn Subscriber<KeyEvent>>));
            }
        }));

        // Trigger detection and the session watchdog.
        threads.push(thread::spawn({
            let running = shared.running.clone();
            let publisher = shared.key_publisher.clone();
            let mut detector =
                TriggerDetector::new(bus, shared.config.trigger.clone());
            move || {
                let mailbox = detector.mailbox();
                publisher.subscribe(mailbox.clone() as Arc<dyn Subscriber<KeyEvent>>);
                while running.load(Ordering::SeqCst) {
                    while detector.poll() {}
                    detector.check_auto_stop();
                    thread::sleep(TRIGGER_TICK);
                }
                publisher.unsubscribe(&(mailbox as Arc<dyn Subscriber<KeyEvent>>));
            }
        }));

        // Global keyboard hook.
        let mut key_listener = KeyListener::new(key_publisher);
        if shared.config.install_key_hook {
            key_listener.start()?;
        }

        Ok(Supervisor {
            shared,
            threads,
            key_listener,
        })
    }

    /// Control channel for raising or observing session events.
    pub fn bus(&self) -> Arc<ControlBus> {
        self.shared.bus.clone()
    }

    /// Key-event publisher; external sources may inject events here.
    pub fn key_publisher(&self) -> Arc<Publisher<KeyEvent>> {
        self.shared.key_publisher.clone()
    }

    pub fn logging_active(&self) -> bool {
        self.shared.logging.load(Ordering::SeqCst)
    }

    /// Stop everything: end any active session (flushing its writers),
    /// stop the producers, and join all always-on threads.
    pub fn shutdown(mut self) {
        log::info!("supervisor shutting down");

        if self.shared.logging.swap(false, Ordering::SeqCst) {
            stop_session(&self.shared);
        }

        self.shared.running.store(false, Ordering::SeqCst);
        self.key_listener.stop();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        self.shared.bus.clear();
    }
}

/// Wire START/STOP/TOGGLE to the session state machine.
///
/// Callbacks hold weak references; once the supervisor is gone they are
/// inert.
fn subscribe_control_events(shared: &Arc<Shared>) {
    let weak = Arc::downgrade(shared);
    shared.bus.subscribe(ControlEvent::StartLogging, {
        let weak = weak.clone();
        move || {
            if let Some(shared) = weak.upgrade() {
                if !shared.logging.swap(true, Ordering::SeqCst) {
                    start_session(&shared);
                }
            }
        }
    });

    shared.bus.subscribe(ControlEvent::StopLogging, {
        let weak = weak.clone();
        move || {
            if let Some(shared) = weak.upgrade() {
                if shared.logging.swap(false, Ordering::SeqCst) {
                    stop_session(&shared);
                }
            }
        }
    });

    shared.bus.subscribe(ControlEvent::ToggleLogging, move || {
        if let Some(shared) = weak.upgrade() {
            if !shared.logging.fetch_xor(true, Ordering::SeqCst) {
                start_session(&shared);
            } else {
                stop_session(&shared);
            }
        }
    });
}

fn session_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
        .to_string()
}

/// Create the session directory and spawn the two logging threads.
fn start_session(shared: &Arc<Shared>) {
    let id = session_id();
    let dir = shared.config.session_dir.join(&id);
    if let Err(e) = fs::create_dir_all(&dir) {
        log::error!("cannot create session directory {}: {}", dir.display(), e);
        shared.logging.store(false, Ordering::SeqCst);
        return;
    }

    log::info!("session {} started at {}", id, dir.display());

    let key_thread = thread::spawn({
        let shared = shared.clone();
        let path = dir.join("key_events.csv");
        move || {
            let mut logger = KeyEventLogger::new(path, shared.config.batch_size);
            let mailbox = logger.mailbox();
            shared
                .key_publisher
                .subscribe(mailbox.clone() as Arc<dyn Subscriber<KeyEvent>>);

            while shared.logging.load(Ordering::SeqCst) {
                // Flush on a full batch and on timeout alike, so events
                // never sit longer than the flush interval.
                logger.wait_for_batch(shared.config.flush_interval);
                logger.flush();
            }

            shared
                .key_publisher
                .unsubscribe(&(mailbox as Arc<dyn Subscriber<KeyEvent>>));
            // Dropping the logger flushes whatever is left.
        }
    });

    let frame_thread = thread::spawn({
        let shared = shared.clone();
        let frames_dir = dir.join("frames");
        move || {
            if let Err(e) = fs::create_dir_all(&frames_dir) {
                log::error!(
                    "cannot create frames directory {}: {}",
                    frames_dir.display(),
                    e
                );
                return;
            }

            let mut worker = match &shared.config.worker {
                Some(worker_config) => match PostProcessor::spawn(worker_config, &frames_dir) {
                    Ok(worker) => Some(worker),
                    Err(e) => {
                        log::error!("continuing session without worker: {}", e);
                        None
                    }
                },
                None => None,
            };

            let mut logger = FrameLogger::new(frames_dir, shared.config.batch_size);
            let mailbox = logger.mailbox();
            shared
                .processed_publisher
                .subscribe(mailbox.clone() as Arc<dyn Subscriber<ProcessedFrame>>);

            while shared.logging.load(Ordering::SeqCst) {
                logger.wait_for_batch(shared.config.flush_interval);
                logger.flush();
            }

            shared
                .processed_publisher
                .unsubscribe(&(mailbox as Arc<dyn Subscriber<ProcessedFrame>>));

            // Flush the tail before the worker is told to stop, so it sees
            // every frame of the session.
            drop(logger);
            if let Some(worker) = worker.as_mut() {
                worker.terminate();
            }
        }
    });

    let session = Session {
        id,
        started: Instant::now(),
        key_thread,
        frame_thread,
    };
    *shared.session.lock().unwrap() = Some(session);
}

/// Join the session threads; their drop-flushes have run once this
/// returns.
fn stop_session(shared: &Arc<Shared>) {
    let session = shared.session.lock().unwrap().take();
    let Some(session) = session else {
        return;
    };

    let _ = session.key_thread.join();
    let _ = session.frame_thread.join();

    log::info!(
        "session {} stopped after {:?}",
        session.id,
        session.started.elapsed()
    );
}

/// Process-wide Ctrl+C flag.
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

pub fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Install the Ctrl+C handler. Call once at startup.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}
