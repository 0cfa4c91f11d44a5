use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use keycam::capture::SyntheticGrabber;
use keycam::config::Config;
use keycam::logging::{read_frame, WorkerConfig};
use keycam::supervisor::{ctrlc_received, setup_ctrlc_handler, Supervisor, SupervisorConfig};
use keycam::transform::{CpuDevice, CropGeometry};
use keycam::trigger::TriggerConfig;
use keycam::ui::{FrameRateLog, KeystrokeLog};

/// Parse and validate framerate (1-120 fps)
fn parse_framerate(s: &str) -> Result<u32, String> {
    let fps: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid framerate", s))?;
    if !(1..=120).contains(&fps) {
        return Err(format!(
            "Framerate must be between 1 and 120 fps, got {}",
            fps
        ));
    }
    Ok(fps)
}

/// Parse and validate trigger press count (2-10)
fn parse_trigger_count(s: &str) -> Result<u32, String> {
    let count: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid count", s))?;
    if !(2..=10).contains(&count) {
        return Err(format!(
            "Trigger count must be between 2 and 10, got {}",
            count
        ));
    }
    Ok(count)
}

/// Parse and validate batch size (1-10000)
fn parse_batch_size(s: &str) -> Result<usize, String> {
    let size: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid batch size", s))?;
    if !(1..=10_000).contains(&size) {
        return Err(format!(
            "Batch size must be between 1 and 10000, got {}",
            size
        ));
    }
    Ok(size)
}

/// keycam: synchronized typing + camera session recorder
#[derive(Parser)]
#[command(name = "keycam")]
#[command(version, about = "Synchronized typing + camera session recorder")]
#[command(long_about = "Records system-wide keyboard events and cropped camera \
    frames into timestamped session directories. Sessions are toggled by \
    pressing the trigger key repeatedly (default: space, three times within \
    a second) and auto-stop after a configurable duration.")]
#[command(after_help = "EXAMPLES:
    # Record sessions into ./sessions with default settings
    keycam run

    # Custom trigger: 4 presses of the space bar, 10 second sessions
    keycam run --trigger-count 4 --auto-stop-ms 10000

    # Record without the external post-processing worker
    keycam run --no-worker

    # Inspect a recorded frame file
    keycam inspect sessions/1722800000000/frames/frame_000000.raw")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start capturing and wait for trigger sequences
    #[command(after_help = "EXAMPLES:
    keycam run
    keycam run --dir /data/sessions --fps 25
    keycam run --trigger-count 4 --trigger-timeout-ms 800
    keycam run --no-worker --batch-size 50

HOTKEYS (while running):
    <trigger key> xN  Toggle a logging session
    Ctrl+C            Quit")]
    Run {
        /// Base directory for session output
        #[arg(long, short = 'd')]
        dir: Option<PathBuf>,

        /// Capture framerate (1-120 fps, default: 30)
        #[arg(long, short = 'f', value_parser = parse_framerate)]
        fps: Option<u32>,

        /// Virtual key code of the trigger key (default: 32, space)
        #[arg(long)]
        trigger_key: Option<u16>,

        /// Presses required to toggle a session (2-10, default: 3)
        #[arg(long, value_parser = parse_trigger_count)]
        trigger_count: Option<u32>,

        /// Maximum gap between trigger presses in milliseconds (default: 1000)
        #[arg(long)]
        trigger_timeout_ms: Option<u64>,

        /// Auto-stop sessions after this many milliseconds (default: 30000)
        #[arg(long)]
        auto_stop_ms: Option<u64>,

        /// Messages per disk batch (1-10000, default: 100)
        #[arg(long, value_parser = parse_batch_size)]
        batch_size: Option<usize>,

        /// Maximum buffering time in milliseconds (default: 500)
        #[arg(long)]
        flush_interval_ms: Option<u64>,

        /// Disable the external post-processing worker
        #[arg(long)]
        no_worker: bool,

        /// Post-processing worker command (default: python)
        #[arg(long)]
        worker_cmd: Option<String>,

        /// Worker concurrency hint (default: 8)
        #[arg(long)]
        workers: Option<u32>,

        /// Skip installing the global keyboard hook
        #[arg(long)]
        no_hook: bool,

        /// Custom config file path (default: ~/.config/keycam/config.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Decode and print a recorded frame file's header
    Inspect {
        /// Path to a frame_NNNNNN.raw file
        file: PathBuf,
    },
}

/// Run the capture supervisor until Ctrl+C.
fn run(config: SupervisorConfig) -> Result<(), String> {
    if let Err(e) = setup_ctrlc_handler() {
        eprintln!("Warning: Could not set up Ctrl+C handler: {}", e);
    }

    let grabber = Box::new(SyntheticGrabber::new(
        config.geometry.src_width,
        config.geometry.src_height,
    ));

    let supervisor = Supervisor::start(
        config,
        grabber,
        Box::new(CpuDevice::new()),
        Box::new(FrameRateLog::new()),
        Box::new(KeystrokeLog::new()),
    )
    .map_err(|e| e.to_string())?;

    println!("Capturing. Press the trigger key repeatedly to toggle a session; Ctrl+C to quit.");

    loop {
        if ctrlc_received() {
            println!("\nShutting down...");
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    supervisor.shutdown();
    println!("Capture stopped.");
    Ok(())
}

/// Print the header of one recorded frame file.
fn run_inspect(file: &PathBuf) -> Result<(), String> {
    let (header, data) = read_frame(file)
        .map_err(|e| format!("Failed to read frame '{}': {}", file.display(), e))?;

    println!("{}", file.display());
    println!("  timestamp: {} ms", header.timestamp_ms);
    println!("  size:      {}x{}", header.width, header.height);
    println!("  payload:   {} bytes", header.len);

    let expected = header.width as usize * header.height as usize * 3;
    if data.len() != expected {
        println!(
            "  WARNING: payload is {} bytes but {}x{} RGB needs {}",
            data.len(),
            header.width,
            header.height,
            expected
        );
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            dir,
            fps,
            trigger_key,
            trigger_count,
            trigger_timeout_ms,
            auto_stop_ms,
            batch_size,
            flush_interval_ms,
            no_worker,
            worker_cmd,
            workers,
            no_hook,
            config: config_path,
        }) => {
            // Load config file; --config requires the file to parse, the
            // default path silently falls back to defaults.
            let cfg = match Config::load(config_path.as_deref()) {
                Ok(c) => c,
                Err(e) => {
                    if config_path.is_some() {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                    eprintln!("Warning: Failed to load config file: {}", e);
                    eprintln!("Using default settings.\n");
                    Config::default()
                }
            };

            // Merge settings: CLI args > config file > built-in defaults
            let session_dir = dir
                .or_else(|| cfg.session.dir.map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("sessions"));

            let fps = fps.or(cfg.capture.fps).unwrap_or(30);

            let geometry = CropGeometry {
                src_width: cfg.capture.width.unwrap_or(1920),
                src_height: cfg.capture.height.unwrap_or(1080),
                out_width: cfg.capture.crop_width.unwrap_or(912),
                out_height: cfg.capture.crop_height.unwrap_or(600),
            };

            let trigger = TriggerConfig {
                trigger_vkey: trigger_key.or(cfg.trigger.key).unwrap_or(0x20),
                required_count: trigger_count.or(cfg.trigger.count).unwrap_or(3),
                interpress_timeout: Duration::from_millis(
                    trigger_timeout_ms.or(cfg.trigger.timeout_ms).unwrap_or(1000),
                ),
                auto_stop: Duration::from_millis(
                    auto_stop_ms.or(cfg.trigger.auto_stop_ms).unwrap_or(30_000),
                ),
            };

            // --no-worker overrides config; otherwise config can disable it
            let worker_enabled = !no_worker && cfg.worker.enabled.unwrap_or(true);
            let worker = worker_enabled.then(|| {
                let defaults = WorkerConfig::default();
                WorkerConfig {
                    command: worker_cmd
                        .or(cfg.worker.command)
                        .unwrap_or(defaults.command),
                    args: cfg.worker.args.unwrap_or(defaults.args),
                    workers: workers.or(cfg.worker.workers).unwrap_or(defaults.workers),
                    grace: cfg
                        .worker
                        .grace_ms
                        .map(Duration::from_millis)
                        .unwrap_or(defaults.grace),
                }
            });

            let supervisor_config = SupervisorConfig {
                session_dir,
                frame_period: Duration::from_millis((1000 / fps.max(1)) as u64),
                batch_size: batch_size.or(cfg.batching.batch_size).unwrap_or(100),
                flush_interval: Duration::from_millis(
                    flush_interval_ms
                        .or(cfg.batching.flush_interval_ms)
                        .unwrap_or(500),
                ),
                trigger,
                worker,
                geometry,
                install_key_hook: !no_hook,
            };

            if let Err(e) = run(supervisor_config) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Inspect { file }) => {
            if let Err(e) = run_inspect(&file) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            // Show brief help when no command is provided
            println!("keycam {}", env!("CARGO_PKG_VERSION"));
            println!("Synchronized typing + camera session recorder\n");
            println!("USAGE:");
            println!("    keycam <COMMAND>\n");
            println!("COMMANDS:");
            println!("    run      Start capturing and wait for trigger sequences");
            println!("    inspect  Decode and print a recorded frame file's header");
            println!("    help     Print this message or the help of a subcommand\n");
            println!("Run 'keycam --help' for more details and examples.");
        }
    }
}
