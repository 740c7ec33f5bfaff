// Logging module - tracing subscriber setup
//
// Console output always goes to stderr: in `host` mode stdout carries
// native-messaging frames and a stray log line would corrupt the stream.
// File logging is optional and writes JSON through a non-blocking rolling
// appender.
//
// Precedence: RUST_LOG env var > config file level > default "info"

use crate::config::{LogRotation, LoggingConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive used when RUST_LOG is unset
fn default_directive(config: &LoggingConfig) -> String {
    format!("privlens={}", config.level.trim().to_lowercase())
}

fn file_appender(config: &LoggingConfig) -> RollingFileAppender {
    match config.file_rotation {
        LogRotation::Hourly => {
            tracing_appender::rolling::hourly(&config.file_dir, &config.file_prefix)
        }
        LogRotation::Daily => tracing_appender::rolling::daily(&config.file_dir, &config.file_prefix),
        LogRotation::Never => tracing_appender::rolling::never(&config.file_dir, &config.file_prefix),
    }
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(config).into());

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = if config.file_enabled {
        match std::fs::create_dir_all(&config.file_dir) {
            Ok(()) => {
                // Writes happen on a background thread
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(config));
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_ansi(false);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                // Fall back to console-only logging
                eprintln!(
                    "Warning: Could not create log directory {:?}: {}",
                    config.file_dir, e
                );
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    // try_init: a second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_uses_config_level() {
        let config = LoggingConfig {
            level: " DEBUG ".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(default_directive(&config), "privlens=debug");
        assert_eq!(default_directive(&LoggingConfig::default()), "privlens=info");
    }

    #[test]
    fn test_file_logging_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            file_enabled: true,
            file_dir: dir.path().join("logs"),
            file_rotation: LogRotation::Never,
            ..LoggingConfig::default()
        };

        let guard = init(&config);
        assert!(guard.is_some());
        assert!(config.file_dir.is_dir());
    }
}
