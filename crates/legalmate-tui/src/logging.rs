use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives for the log file, e.g. `LEGALMATE_LOG=legalmate_core=debug`.
pub const LOG_ENV: &str = "LEGALMATE_LOG";

/// Logs go to a daily file under `log_dir`; the terminal belongs to the UI.
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::daily(log_dir, "legalmate.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_writer(non_blocking_file);

    // try_init: a subscriber may already be installed (tests)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_log_directory() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let _guard = init_logging(&log_dir).unwrap();
        assert!(log_dir.is_dir());
    }
}
