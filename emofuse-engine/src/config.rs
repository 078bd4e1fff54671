//! Service configuration for the emofuse daemon
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (`--port`, `--config`)
//! 2. Environment variables (`EMOFUSE_PORT`, `EMOFUSE_CONFIG`)
//! 3. TOML configuration file
//! 4. Built-in defaults
//!
//! The TOML file is read once at startup. Fusion and temporal parameters it
//! carries are only initial values; they can be replaced at runtime through
//! the config endpoints.

use crate::fusion::EngineSettings;
use emofuse_common::config::TomlConfig;
use emofuse_common::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Crates whose log level follows a bare level from the config file
const LOG_TARGETS: [&str; 3] = ["emofuse_engine", "emofuse_common", "tower_http"];

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub config_path: Option<PathBuf>,
}

/// Fully resolved startup configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub log_directive: String,
    pub keep_alive: Duration,
    pub gc_interval: Duration,
    pub max_age: Duration,
    pub engine: EngineSettings,
}

impl ServiceConfig {
    /// Load the TOML file (if any) and apply command-line overrides
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let toml = TomlConfig::load_or_default(overrides.config_path.as_deref())?;
        Ok(Self::from_toml(toml, overrides))
    }

    pub fn from_toml(toml: TomlConfig, overrides: &ConfigOverrides) -> Self {
        let port = match overrides.port {
            Some(port) => {
                if port != toml.port {
                    info!("Port {} overridden to {} from command line", toml.port, port);
                }
                port
            }
            None => toml.port,
        };

        Self {
            port,
            log_directive: log_directive(&toml.logging.level),
            keep_alive: Duration::from_secs(toml.notify.keep_alive_secs),
            gc_interval: toml.store.gc_interval(),
            max_age: toml.store.max_age(),
            engine: EngineSettings::from(&toml),
        }
    }
}

/// Expand a bare level ("debug") into a filter directive for this service
///
/// Anything already containing a target (`=`) or a list (`,`) is used as is.
pub fn log_directive(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let level = if level.is_empty() { "info" } else { level };
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use emofuse_common::config::TriggerPolicy;

    #[test]
    fn test_bare_level_expands_to_service_targets() {
        assert_eq!(
            log_directive("debug"),
            "emofuse_engine=debug,emofuse_common=debug,tower_http=debug"
        );
        assert_eq!(
            log_directive(""),
            "emofuse_engine=info,emofuse_common=info,tower_http=info"
        );
    }

    #[test]
    fn test_full_directive_is_kept() {
        assert_eq!(log_directive("emofuse_engine=trace"), "emofuse_engine=trace");
        assert_eq!(log_directive("warn,axum=debug"), "warn,axum=debug");
    }

    #[test]
    fn test_cli_port_overrides_file() {
        let toml = TomlConfig::from_toml_str(
            r#"
port = 6000

[store]
freshness_window_ms = 4000
trigger_policy = "any_arrival"
"#,
        )
        .expect("valid config");

        let config = ServiceConfig::from_toml(
            toml.clone(),
            &ConfigOverrides {
                port: Some(7000),
                config_path: None,
            },
        );
        assert_eq!(config.port, 7000);
        assert_eq!(config.engine.store.freshness_window_ms, 4000);
        assert_eq!(config.engine.store.trigger_policy, TriggerPolicy::AnyArrival);

        let config = ServiceConfig::from_toml(toml, &ConfigOverrides::default());
        assert_eq!(config.port, 6000);
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_toml(TomlConfig::default(), &ConfigOverrides::default());
        assert_eq!(config.port, 5760);
        assert_eq!(config.keep_alive, Duration::from_secs(15));
        assert_eq!(config.gc_interval, Duration::from_secs(5));
        assert_eq!(config.max_age, Duration::from_secs(15));
    }
}
