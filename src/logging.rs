//! Tracing subscriber setup.
//!
//! `RUST_LOG` always wins; otherwise the `[logging] level` directive from
//! the config applies. Output goes to stderr, or to daily rolling files when
//! `log_dir` is set.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{HcsoError, Result};

/// Parse an `EnvFilter` directive.
///
/// # Errors
///
/// Returns [`HcsoError::Logging`] if the directive is malformed.
pub fn filter_from(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| HcsoError::Logging(format!("invalid log directive {directive:?}: {e}")))
}

/// Install the global tracing subscriber.
///
/// Returns the file writer's guard when logging to files; keep it alive for
/// the life of the process or buffered lines are lost.
///
/// # Errors
///
/// Returns [`HcsoError::Logging`] if the directive is malformed or a global
/// subscriber is already installed, and [`HcsoError::Io`] if the log
/// directory cannot be created.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_from(&config.level)?,
    };

    match config.log_dir {
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_ansi(config.ansi)
                .try_init()
                .map_err(|e| HcsoError::Logging(e.to_string()))?;
            Ok(None)
        }
        Some(ref dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| HcsoError::Logging(e.to_string()))?;
            tracing::debug!(dir = %dir.display(), "logging to rolling files");
            Ok(Some(guard))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directive_parses() {
        assert!(filter_from(&LoggingConfig::default().level).is_ok());
    }

    #[test]
    fn malformed_directive_rejected() {
        let err = filter_from("hcso=loud").unwrap_err();
        assert!(matches!(err, HcsoError::Logging(_)));
    }

    // The only test in this crate that installs a global subscriber.
    #[test]
    fn file_logging_installs_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = LoggingConfig {
            log_dir: Some(dir.path().join("logs")),
            ..Default::default()
        };
        let guard = init_logging(&config).expect("first init");
        assert!(guard.is_some());
        assert!(dir.path().join("logs").is_dir());

        let second = init_logging(&LoggingConfig::default());
        assert!(matches!(second, Err(HcsoError::Logging(_))));
    }
}
