//! Tracing setup
//!
//! The subscriber is installed before the config file is read so that config
//! loading is logged. It starts from `RUST_LOG`, or from `info` for this
//! service's crates, and switches to the configured level once the file has
//! been loaded. `RUST_LOG` always wins over the file.

use crate::config::log_directive;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, reload, EnvFilter, Registry};

/// Handle for replacing the startup filter
pub struct LogFilter {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl LogFilter {
    /// Switch to `directive` unless the filter came from `RUST_LOG`
    ///
    /// Returns whether the filter changed.
    pub fn apply(&self, directive: &str) -> anyhow::Result<bool> {
        if self.from_env {
            return Ok(false);
        }
        self.handle.reload(EnvFilter::try_new(directive)?)?;
        Ok(true)
    }
}

/// Build the service subscriber writing to `make_writer`
///
/// `env_filter` is the filter taken from the environment, if any.
pub fn subscriber<W>(
    env_filter: Option<EnvFilter>,
    make_writer: W,
) -> (impl Subscriber + Send + Sync + 'static, LogFilter)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let from_env = env_filter.is_some();
    let filter = env_filter.unwrap_or_else(|| EnvFilter::new(log_directive("info")));
    let (filter, handle) = reload::Layer::new(filter);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer));
    (subscriber, LogFilter { handle, from_env })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigOverrides, ServiceConfig};
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_config_file_warning_is_logged() {
        let capture = Capture::default();
        let writer = capture.clone();
        let (subscriber, _filter) = subscriber(None, move || writer.clone());

        let missing = std::env::temp_dir().join("emofuse-absent-dir/emofuse.toml");
        let config = tracing::subscriber::with_default(subscriber, || {
            ServiceConfig::load(&ConfigOverrides {
                port: Some(7001),
                config_path: Some(missing),
            })
        })
        .expect("missing file falls back to defaults");

        assert_eq!(config.port, 7001);
        let output = capture.contents();
        assert!(output.contains("not found, using built-in defaults"), "{}", output);
        assert!(output.contains("overridden to 7001"), "{}", output);
    }

    #[test]
    fn test_config_level_applies_without_env_filter() {
        let (_subscriber, filter) = subscriber(None, std::io::sink);
        assert!(filter.apply(&log_directive("debug")).expect("valid directive"));
        assert!(filter.apply("emofuse_engine=notalevel").is_err());
    }

    #[test]
    fn test_env_filter_is_kept() {
        let (_subscriber, filter) = subscriber(Some(EnvFilter::new("warn")), std::io::sink);
        assert!(!filter.apply(&log_directive("debug")).expect("no-op"));
    }
}
