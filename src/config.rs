//! Configuration file handling for keycam.
//!
//! Loads configuration from `~/.config/keycam/config.toml` or a custom
//! path. Every field is optional; CLI arguments override config values,
//! which override built-in defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration file structure for keycam.
/// Loaded from ~/.config/keycam/config.toml (or custom path via --config).
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub trigger: TriggerSection,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub worker: WorkerSection,
}

#[derive(Debug, Deserialize, Default)]
pub struct SessionConfig {
    /// Base directory for session output (default: ./sessions)
    pub dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CaptureConfig {
    /// Source frame width (default: 1920)
    pub width: Option<u32>,
    /// Source frame height (default: 1080)
    pub height: Option<u32>,
    /// Capture framerate (default: 30)
    pub fps: Option<u32>,
    /// Crop output width (default: 912)
    pub crop_width: Option<u32>,
    /// Crop output height (default: 600)
    pub crop_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TriggerSection {
    /// Virtual key code of the trigger key (default: 32, space)
    pub key: Option<u16>,
    /// Presses required to toggle a session (default: 3)
    pub count: Option<u32>,
    /// Maximum gap between presses in milliseconds (default: 1000)
    pub timeout_ms: Option<u64>,
    /// Session auto-stop duration in milliseconds (default: 30000)
    pub auto_stop_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct BatchingConfig {
    /// Messages per disk batch (default: 100)
    pub batch_size: Option<usize>,
    /// Maximum time events are buffered, in milliseconds (default: 500)
    pub flush_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct WorkerSection {
    /// Whether to run the post-processing worker (default: true)
    pub enabled: Option<bool>,
    /// Worker executable (default: python)
    pub command: Option<String>,
    /// Arguments placed before the frames directory
    pub args: Option<Vec<String>>,
    /// Concurrency hint passed to the worker (default: 8)
    pub workers: Option<u32>,
    /// Grace period before force-termination, in milliseconds (default: 30000)
    pub grace_ms: Option<u64>,
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("keycam").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/keycam/config.toml")
        })
}
