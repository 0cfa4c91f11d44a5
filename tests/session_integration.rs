//! End-to-end session lifecycle tests against a full supervisor.
//!
//! Tests the acceptance criteria:
//! - AC: a trigger sequence starts a session that records key events and
//!   frames into its own directory, and a second sequence ends it
//! - AC: START only activates when idle, STOP only deactivates when active
//! - AC: the post-processing worker is signaled with the sentinel file
//! - AC: the watchdog ends an over-long session on its own
//!
//! The keyboard hook is disabled throughout; events are injected through
//! the supervisor's key publisher the same way the hook would publish them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use keycam::bus::ControlEvent;
use keycam::capture::SyntheticGrabber;
use keycam::logging::{read_frame, WorkerConfig, SHUTDOWN_SENTINEL};
use keycam::supervisor::{Supervisor, SupervisorConfig};
use keycam::transform::{CpuDevice, CropGeometry};
use keycam::trigger::{TriggerConfig, VKEY_SPACE};
use keycam::types::{monotonic_ms, KeyEvent};
use keycam::ui::{FrameRateLog, KeystrokeLog};

const TEST_GEOMETRY: CropGeometry = CropGeometry {
    src_width: 64,
    src_height: 48,
    out_width: 32,
    out_height: 24,
};

fn test_config(session_dir: &Path) -> SupervisorConfig {
    SupervisorConfig {
        session_dir: session_dir.to_path_buf(),
        frame_period: Duration::from_millis(15),
        batch_size: 5,
        flush_interval: Duration::from_millis(100),
        trigger: TriggerConfig {
            trigger_vkey: VKEY_SPACE,
            required_count: 3,
            interpress_timeout: Duration::from_millis(1000),
            auto_stop: Duration::from_secs(60),
        },
        worker: None,
        geometry: TEST_GEOMETRY,
        install_key_hook: false,
    }
}

fn start_supervisor(config: SupervisorConfig) -> Supervisor {
    Supervisor::start(
        config,
        Box::new(SyntheticGrabber::new(
            TEST_GEOMETRY.src_width,
            TEST_GEOMETRY.src_height,
        )),
        Box::new(CpuDevice::new()),
        Box::new(FrameRateLog::new()),
        Box::new(KeystrokeLog::new()),
    )
    .expect("supervisor should start")
}

fn press(vkey: u16) -> Arc<KeyEvent> {
    Arc::new(KeyEvent {
        vkey,
        scan_code: 0,
        pressed: true,
        timestamp_ms: monotonic_ms(),
    })
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn session_dirs(base: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(base)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect()
        })
        .unwrap_or_default();
    dirs.sort();
    dirs
}

fn frame_files(session: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(session.join("frames"))
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map(|x| x == "raw").unwrap_or(false))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

#[test]
fn test_trigger_sequence_records_full_session() {
    let base = TempDir::new().unwrap();
    let supervisor = start_supervisor(test_config(base.path()));
    let keys = supervisor.key_publisher();

    // Three space presses toggle logging on.
    for _ in 0..3 {
        keys.publish(press(VKEY_SPACE));
    }
    assert!(
        wait_until(Duration::from_secs(3), || supervisor.logging_active()),
        "trigger sequence did not start a session"
    );
    // Let the session's logger threads subscribe before typing.
    thread::sleep(Duration::from_millis(100));

    // Type while the session runs; frames accumulate meanwhile.
    for _ in 0..12 {
        keys.publish(press(0x41));
        thread::sleep(Duration::from_millis(20));
    }
    thread::sleep(Duration::from_millis(300));

    // Another three presses toggle logging off.
    for _ in 0..3 {
        keys.publish(press(VKEY_SPACE));
    }
    assert!(
        wait_until(Duration::from_secs(3), || !supervisor.logging_active()),
        "trigger sequence did not stop the session"
    );
    // Give the toggle callback time to join the logging threads.
    thread::sleep(Duration::from_millis(500));

    let sessions = session_dirs(base.path());
    assert_eq!(sessions.len(), 1, "expected exactly one session directory");
    let session = &sessions[0];

    // The key log holds at least the typed keys.
    let csv = std::fs::read_to_string(session.join("key_events.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert!(lines.len() >= 12, "only {} key events logged", lines.len());
    for line in &lines {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields.len(), 4, "malformed CSV line: {}", line);
        let _: u64 = fields[0].parse().expect("timestamp column");
        assert!(fields[3] == "0" || fields[3] == "1");
    }

    // Frames were cropped, converted, and written with valid headers.
    let frames = frame_files(session);
    assert!(frames.len() >= 5, "only {} frames written", frames.len());
    assert!(frames[0].ends_with("frame_000000.raw"));

    let (header, data) = read_frame(&frames[0]).unwrap();
    assert_eq!(header.width, TEST_GEOMETRY.out_width);
    assert_eq!(header.height, TEST_GEOMETRY.out_height);
    assert_eq!(header.len as usize, data.len());
    assert_eq!(data.len(), TEST_GEOMETRY.rgb_len());

    // Nothing is written after the session ended.
    let count = frames.len();
    thread::sleep(Duration::from_millis(300));
    assert_eq!(frame_files(session).len(), count);

    supervisor.shutdown();
}

#[test]
fn test_start_only_when_idle_stop_only_when_active() {
    let base = TempDir::new().unwrap();
    let supervisor = start_supervisor(test_config(base.path()));
    let bus = supervisor.bus();

    bus.publish(ControlEvent::StartLogging);
    assert!(supervisor.logging_active());
    thread::sleep(Duration::from_millis(250));

    // A second START while active changes nothing.
    bus.publish(ControlEvent::StartLogging);
    assert_eq!(session_dirs(base.path()).len(), 1);

    // STOP returns synchronously once the session threads are joined.
    bus.publish(ControlEvent::StopLogging);
    assert!(!supervisor.logging_active());

    // A second STOP while idle is a no-op.
    bus.publish(ControlEvent::StopLogging);
    assert!(!supervisor.logging_active());
    assert_eq!(session_dirs(base.path()).len(), 1);

    // The finished session flushed its frames on the way out.
    let sessions = session_dirs(base.path());
    assert!(!frame_files(&sessions[0]).is_empty());

    supervisor.shutdown();
}

#[test]
fn test_toggle_event_flips_unconditionally() {
    let base = TempDir::new().unwrap();
    let supervisor = start_supervisor(test_config(base.path()));
    let bus = supervisor.bus();

    bus.publish(ControlEvent::ToggleLogging);
    assert!(supervisor.logging_active());
    thread::sleep(Duration::from_millis(150));

    bus.publish(ControlEvent::ToggleLogging);
    assert!(!supervisor.logging_active());

    bus.publish(ControlEvent::ToggleLogging);
    assert!(supervisor.logging_active());
    bus.publish(ControlEvent::ToggleLogging);
    assert!(!supervisor.logging_active());

    assert_eq!(session_dirs(base.path()).len(), 2);
    supervisor.shutdown();
}

#[test]
fn test_worker_is_signaled_with_sentinel_file() {
    let base = TempDir::new().unwrap();
    let mut config = test_config(base.path());
    // A cooperative stand-in worker: waits for the sentinel, then exits.
    // `$0` is the frames directory appended after the -c script.
    config.worker = Some(WorkerConfig {
        command: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            "while [ ! -e \"$0/.shutdown\" ]; do sleep 0.05; done".to_string(),
        ],
        workers: 1,
        grace: Duration::from_secs(5),
    });
    let supervisor = start_supervisor(config);
    let bus = supervisor.bus();

    bus.publish(ControlEvent::StartLogging);
    thread::sleep(Duration::from_millis(400));
    bus.publish(ControlEvent::StopLogging);

    let sessions = session_dirs(base.path());
    assert_eq!(sessions.len(), 1);
    let sentinel = sessions[0].join("frames").join(SHUTDOWN_SENTINEL);
    assert!(sentinel.exists(), "worker was never signaled to stop");

    supervisor.shutdown();
}

#[test]
fn test_watchdog_auto_stops_overlong_session() {
    let base = TempDir::new().unwrap();
    let mut config = test_config(base.path());
    config.trigger.auto_stop = Duration::from_millis(250);
    let supervisor = start_supervisor(config);
    let keys = supervisor.key_publisher();

    for _ in 0..3 {
        keys.publish(press(VKEY_SPACE));
    }
    assert!(wait_until(Duration::from_secs(3), || supervisor
        .logging_active()));

    // No further input: the watchdog must end the session by itself.
    assert!(
        wait_until(Duration::from_secs(3), || !supervisor.logging_active()),
        "watchdog never stopped the session"
    );
    thread::sleep(Duration::from_millis(400));

    let sessions = session_dirs(base.path());
    assert_eq!(sessions.len(), 1);
    assert!(!frame_files(&sessions[0]).is_empty());

    supervisor.shutdown();
}
