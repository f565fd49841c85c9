use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "kt-engine.log";
const FALLBACK_LEVEL: &str = "info";

/// Keeps the background log writer alive; flushes on drop
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// Filter for `level`, or `info` when the directives do not parse
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|err| {
        eprintln!("invalid log level {level:?} ({err}), using {FALLBACK_LEVEL}");
        EnvFilter::new(FALLBACK_LEVEL)
    })
}

/// Daily rolling file under the configured dir, when file logs are on
fn file_appender(config: &LoggingConfig) -> Option<RollingFileAppender> {
    if !config.file_logs {
        return None;
    }
    match std::fs::create_dir_all(&config.dir) {
        Ok(()) => Some(RollingFileAppender::new(
            Rotation::DAILY,
            &config.dir,
            LOG_FILE_PREFIX,
        )),
        Err(err) => {
            eprintln!("failed to create log directory {}: {err}", config.dir.display());
            None
        }
    }
}

/// Install the global subscriber
///
/// Logs go to stderr, leaving stdout for command output. With
/// `file_logs` on, a daily rolling file receives a copy.
pub fn init_tracing(config: &LoggingConfig) -> Option<FileLogGuard> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    let registry = tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(stderr_layer);

    match file_appender(config) {
        Some(appender) => {
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true);
            registry.with(file_layer).init();
            Some(FileLogGuard { _guard: guard })
        }
        None => {
            registry.init();
            None
        }
    }
}
