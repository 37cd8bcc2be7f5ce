use anyhow::{anyhow, Result};
use livemd_config::LogConfig;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Log files above this size are started over.
const MAX_LOG_FILE_SIZE: u64 = 8 * 1024 * 1024;

/// The log file from, in order of precedence, `--log`, `LIVEMD_LOG_PATH` and
/// the config file.
fn log_file(cli_log: Option<PathBuf>, config: &LogConfig) -> Option<PathBuf> {
    if let Some(log_path) = cli_log {
        Some(log_path)
    } else if let Ok(log_path) = std::env::var("LIVEMD_LOG_PATH").map(PathBuf::from) {
        Some(log_path)
    } else {
        config.log_file.as_ref().map(PathBuf::from)
    }
}

fn filter_directive(config: &LogConfig) -> String {
    if config.log_target.is_empty() {
        config.max_level.clone()
    } else {
        format!("{},{}", config.max_level, config.log_target)
    }
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(config)))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber.
///
/// The returned guard flushes the log file on drop and must be kept alive
/// until exit.
pub fn init(cli_log: Option<PathBuf>, config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let Some(log_path) = log_file(cli_log, config) else {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter(config))
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(None);
    };

    if let Ok(metadata) = std::fs::metadata(&log_path) {
        if log_path.is_file() && metadata.len() > MAX_LOG_FILE_SIZE {
            std::fs::remove_file(&log_path)?;
        }
    }

    let file_name = log_path
        .file_name()
        .ok_or_else(|| anyhow!("no file name in {log_path:?}"))?;

    let directory = log_path
        .parent()
        .ok_or_else(|| anyhow!("{log_path:?} has no parent"))?;

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_line_number(true)
        .with_writer(non_blocking)
        .with_ansi(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(Some(guard))
}
