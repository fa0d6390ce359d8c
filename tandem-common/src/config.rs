//! Configuration loading and config file resolution
//!
//! All tuning knobs of the synchronization engine live in one TOML document.
//! Every field has a built-in default, so a missing file (or a missing key)
//! is never fatal.
//!
//! # Example
//!
//! ```toml
//! warm_up_delay_ms = 50
//! audio_start_offset_ms = 40
//! device_class = "handset"
//!
//! [calibration.handset]
//! audio_start_offset_ms = 55
//!
//! [logging]
//! level = "debug"
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "TANDEM_CONFIG";

/// Synchronization engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Lead time between "seek completed" and the shared start instant
    pub warm_up_delay_ms: u64,

    /// Delay added to the audio start instant relative to the visual one
    ///
    /// Compensates the audio engine's slower time-to-first-sample. Treated as
    /// a calibration parameter; see `calibration`.
    pub audio_start_offset_ms: u64,

    /// Lead time for restarting audio after a resync
    pub resync_lookahead_ms: u64,

    /// Drift below this is left alone
    pub drift_threshold_ms: f64,

    /// How long the starting suppression outlives the start commands
    pub start_settle_ms: u64,

    /// How long the seeking suppression outlives the seek completion
    pub seek_settle_ms: u64,

    /// Delay before the single asset-load retry
    pub asset_retry_delay_ms: u64,

    /// Seek watchdog; 0 disables it
    pub seek_timeout_ms: u64,

    /// Interval of position signals while playing; 0 disables them
    pub position_event_interval_ms: u64,

    /// Event bus buffer size
    pub event_capacity: usize,

    /// Selects an entry of `calibration`
    pub device_class: Option<String>,

    /// Per-device-class overrides
    pub calibration: HashMap<String, CalibrationProfile>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Device-class-specific calibration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CalibrationProfile {
    /// Overrides `SyncConfig::audio_start_offset_ms`
    pub audio_start_offset_ms: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            warm_up_delay_ms: 50,
            audio_start_offset_ms: 40,
            resync_lookahead_ms: 30,
            drift_threshold_ms: 25.0,
            start_settle_ms: 200,
            seek_settle_ms: 300,
            asset_retry_delay_ms: 100,
            seek_timeout_ms: 2000,
            position_event_interval_ms: 1000,
            event_capacity: 256,
            device_class: None,
            calibration: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let toml_str = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_toml_str(&toml_str)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Resolve and load the config, falling back to built-in defaults
    ///
    /// A file that is absent is not an error. A file that exists but does not
    /// parse or validate is.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
            Some(path) if path.exists() => Self::load_from_file(&path),
            Some(path) => {
                warn!("Config file {:?} not found, using built-in defaults", path);
                Ok(Self::default())
            }
            None => {
                info!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.drift_threshold_ms > 0.0) {
            return Err(Error::Config(format!(
                "drift_threshold_ms must be positive (got {})",
                self.drift_threshold_ms
            )));
        }
        if self.warm_up_delay_ms == 0 {
            return Err(Error::Config(
                "warm_up_delay_ms must exceed the pipelines' scheduling jitter".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        if let Some(class) = &self.device_class {
            if !self.calibration.contains_key(class) {
                warn!(
                    "device_class '{}' has no calibration profile, using audio_start_offset_ms={}",
                    class, self.audio_start_offset_ms
                );
            }
        }
        Ok(())
    }

    /// Audio start offset after applying the device-class calibration
    pub fn effective_audio_start_offset_ms(&self) -> u64 {
        self.device_class
            .as_ref()
            .and_then(|class| self.calibration.get(class))
            .and_then(|profile| profile.audio_start_offset_ms)
            .unwrap_or(self.audio_start_offset_ms)
    }

    pub fn warm_up_delay(&self) -> Duration {
        Duration::from_millis(self.warm_up_delay_ms)
    }

    pub fn audio_start_offset(&self) -> Duration {
        Duration::from_millis(self.effective_audio_start_offset_ms())
    }

    pub fn resync_lookahead(&self) -> Duration {
        Duration::from_millis(self.resync_lookahead_ms)
    }

    /// Drift threshold in seconds
    pub fn drift_threshold_secs(&self) -> f64 {
        self.drift_threshold_ms / 1000.0
    }

    pub fn start_settle(&self) -> Duration {
        Duration::from_millis(self.start_settle_ms)
    }

    pub fn seek_settle(&self) -> Duration {
        Duration::from_millis(self.seek_settle_ms)
    }

    pub fn asset_retry_delay(&self) -> Duration {
        Duration::from_millis(self.asset_retry_delay_ms)
    }

    /// `None` when the watchdog is disabled
    pub fn seek_timeout(&self) -> Option<Duration> {
        (self.seek_timeout_ms > 0).then(|| Duration::from_millis(self.seek_timeout_ms))
    }

    /// `None` when position signals are disabled
    pub fn position_event_interval(&self) -> Option<Duration> {
        (self.position_event_interval_ms > 0)
            .then(|| Duration::from_millis(self.position_event_interval_ms))
    }
}

/// Config file resolution, in priority order:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. Platform config directory (`<config_dir>/tandem/config.toml`), if present
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|path| path.exists())
}

/// `<config_dir>/tandem/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tandem").join("config.toml"))
}
