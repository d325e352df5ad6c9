//! Logging setup
//!
//! Diagnostics go to the console and to a file under the configured log
//! directory that rolls over daily (`flashgate.YYYY-MM-DD.log`). The level is
//! taken from the `FLASHGATE_LOG` environment variable, `info` by default.

use std::backtrace::Backtrace;
use std::path::Path;
use thiserror::Error;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "FLASHGATE_LOG";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file: {0}")]
    Appender(#[from] InitError),

    #[error("failed to install subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer when dropped, so keep it alive
/// for as long as the process runs.
pub fn init(log_dir: &Path) -> Result<WorkerGuard, LoggingError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("flashgate")
        .filename_suffix("log")
        .build(log_dir)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()?;

    install_panic_hook();
    Ok(guard)
}

/// Routes panics (with a backtrace) through the log sink, so a fault inside a
/// session or decoder task is recorded next to the rest of the diagnostics.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        error!(panic = %info, %backtrace, "Task panicked");
    }));
}
