//! Bootstrap configuration loading
//!
//! The TOML file holds settings fixed for the life of the process (port,
//! logging, buffer sizing, notifier sizing) plus the initial values of the
//! hot-swappable fusion parameters.
//!
//! Config file resolution order:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/emofuse/config.toml`)
//! 4. Built-in defaults (no file)

use crate::params::{FusionConfig, TemporalConfig};
use crate::time::millis_to_duration;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "EMOFUSE_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    /// Initial weighting parameters
    #[serde(default)]
    pub fusion: FusionConfig,

    /// Initial smoothing and persistence parameters
    #[serde(default)]
    pub temporal: TemporalConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            logging: LoggingConfig::default(),
            store: StoreConfig::default(),
            notify: NotifyConfig::default(),
            fusion: FusionConfig::default(),
            temporal: TemporalConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve the config file and load it
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged. A file that exists but fails to parse or validate is.
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path, CONFIG_ENV_VAR) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                info!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.notify.validate()?;
        self.fusion
            .validate()
            .map_err(|e| Error::Config(format!("[fusion] {}", e)))?;
        self.temporal
            .validate()
            .map_err(|e| Error::Config(format!("[temporal] {}", e)))?;
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or full filter directive (e.g. "info", "emofuse_engine=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Which submissions run a fusion immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Fuse when an audio observation arrives, reusing the latest face reading
    #[default]
    AudioArrival,
    /// Fuse on every observation
    AnyArrival,
    /// Never fuse on submission; callers fuse explicitly
    Manual,
}

/// Observation buffer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Observations kept per room and channel
    pub max_per_channel: usize,
    /// Maximum observation age eligible for fusion
    pub freshness_window_ms: u64,
    /// Age beyond which the background sweep drops observations
    pub max_age_ms: u64,
    /// Period of the background sweep
    pub gc_interval_ms: u64,
    pub trigger_policy: TriggerPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_per_channel: 5,
            freshness_window_ms: 10_000,
            max_age_ms: 15_000,
            gc_interval_ms: 5_000,
            trigger_policy: TriggerPolicy::AudioArrival,
        }
    }
}

impl StoreConfig {
    pub fn freshness_window(&self) -> Duration {
        millis_to_duration(self.freshness_window_ms)
    }

    pub fn max_age(&self) -> Duration {
        millis_to_duration(self.max_age_ms)
    }

    pub fn gc_interval(&self) -> Duration {
        millis_to_duration(self.gc_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_per_channel == 0 {
            return Err(Error::Config("[store] max_per_channel must be at least 1".into()));
        }
        if self.freshness_window_ms == 0 {
            return Err(Error::Config("[store] freshness_window_ms must be positive".into()));
        }
        if self.max_age_ms < self.freshness_window_ms {
            return Err(Error::Config(format!(
                "[store] max_age_ms ({}) is shorter than freshness_window_ms ({})",
                self.max_age_ms, self.freshness_window_ms
            )));
        }
        if self.gc_interval_ms == 0 {
            return Err(Error::Config("[store] gc_interval_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Live subscriber notification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Events buffered per subscriber before the slowest starts lagging
    pub capacity: usize,
    /// Lag incidents tolerated before a subscriber is dropped
    pub max_lag_events: u32,
    /// SSE keep-alive period
    pub keep_alive_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            max_lag_events: 3,
            keep_alive_secs: 15,
        }
    }
}

impl NotifyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Config("[notify] capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Pick the config file path following the resolution order above
///
/// Returns `None` only when no candidate could be named at all.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir().map(|d| d.join("emofuse").join("config.toml"))
}

fn default_port() -> u16 {
    5760
}

fn default_log_level() -> String {
    "info".to_string()
}
