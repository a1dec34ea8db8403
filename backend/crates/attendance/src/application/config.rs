//! Application Configuration
//!
//! Configuration for the scanner application layer.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} must not be empty")]
    Empty { name: &'static str },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

/// Which scanner variant is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryMode {
    /// Coach scanner: every outcome goes to the history list
    #[default]
    All,
    /// Unattended kiosk: only recorded attendance is listed
    AttendanceOnly,
}

/// Sync scheduler parameters
#[derive(Debug, Clone)]
pub struct SyncSchedule {
    /// Safety-net flush period
    pub interval: Duration,
    /// Up to this much is added to each period, so scanners sharing a
    /// backend do not flush in lockstep
    pub jitter: Duration,
    /// Flush and refresh the directory on an offline to online transition
    pub trigger_on_reconnect: bool,
    /// Directory snapshot refresh period
    pub directory_refresh: Duration,
}

impl Default for SyncSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            jitter: Duration::from_secs(1),
            trigger_on_reconnect: true,
            directory_refresh: Duration::from_secs(300),
        }
    }
}

/// Scanner application configuration
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Backend base URL
    pub api_url: String,
    /// Directory holding the queue and directory snapshot files
    pub data_dir: PathBuf,
    /// Per-request budget before falling back to the offline path
    pub request_timeout: Duration,
    /// How long a resolved outcome stays on screen before scanning resumes
    pub cooldown: Duration,
    pub sync: SyncSchedule,
    /// Rolling history length
    pub history_limit: usize,
    pub history_mode: HistoryMode,
    /// Coach bearer token
    pub token: Option<String>,
    /// Coach signing key, standard base64
    pub signing_key_b64: Option<String>,
    /// Line-oriented NFC reader bridge (device node or FIFO)
    pub nfc_bridge: Option<PathBuf>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000".to_string(),
            data_dir: PathBuf::from("./scanner-data"),
            request_timeout: Duration::from_millis(4000),
            cooldown: Duration::from_millis(4200),
            sync: SyncSchedule::default(),
            history_limit: 20,
            history_mode: HistoryMode::All,
            token: None,
            signing_key_b64: None,
            nfc_bridge: None,
        }
    }
}

impl ScannerConfig {
    /// Kiosk variant: shorter history, attendance-only
    pub fn kiosk() -> Self {
        Self {
            history_limit: 15,
            history_mode: HistoryMode::AttendanceOnly,
            ..Default::default()
        }
    }

    /// Read `SCANNER_*` variables over the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`ScannerConfig::from_env`] with an explicit variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base = match var("SCANNER_MODE").as_deref() {
            Some("kiosk") => Self::kiosk(),
            _ => Self::default(),
        };

        let mut config = Self {
            api_url: var("SCANNER_API_URL").unwrap_or(base.api_url),
            data_dir: var("SCANNER_DATA_DIR").map(PathBuf::from).unwrap_or(base.data_dir),
            token: var("SCANNER_TOKEN"),
            signing_key_b64: var("SCANNER_SIGNING_KEY"),
            nfc_bridge: var("SCANNER_NFC_BRIDGE").map(PathBuf::from),
            ..base
        };

        if let Some(d) = parse_duration(&var, "SCANNER_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = d;
        }
        if let Some(d) = parse_duration(&var, "SCANNER_COOLDOWN_MS")? {
            config.cooldown = d;
        }
        if let Some(d) = parse_duration(&var, "SCANNER_SYNC_INTERVAL_MS")? {
            config.sync.interval = d;
        }
        // Zero jitter is allowed: it only disables the random spread
        if let Some(ms) = parse_var::<u64>(&var, "SCANNER_SYNC_JITTER_MS")? {
            config.sync.jitter = Duration::from_millis(ms);
        }
        if let Some(d) = parse_duration(&var, "SCANNER_DIRECTORY_REFRESH_MS")? {
            config.sync.directory_refresh = d;
        }
        if let Some(n) = parse_var::<usize>(&var, "SCANNER_HISTORY_LIMIT")? {
            config.history_limit = n;
        }

        if config.api_url.is_empty() {
            return Err(ConfigError::Empty {
                name: "SCANNER_API_URL",
            });
        }

        Ok(config)
    }

    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join("pending_scans.json")
    }

    pub fn directory_path(&self) -> PathBuf {
        self.data_dir.join("offline_directory.json")
    }
}

fn parse_var<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match var(name) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}

/// Milliseconds; zero would stall or spin the timers built from it
fn parse_duration(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    match parse_var::<u64>(var, name)? {
        Some(0) => Err(ConfigError::Zero { name }),
        other => Ok(other.map(Duration::from_millis)),
    }
}
