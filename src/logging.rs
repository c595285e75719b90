//! Log sink setup shared by the orchestrator and its workers.
//!
//! Console mode writes to stdout. File mode appends to a single file that
//! every process of the fleet shares, with ANSI colours off. The filter is
//! taken from `APIFLEET_LOG`, then `RUST_LOG`, else `info`.

use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const FILTER_ENV: &str = "APIFLEET_LOG";
const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Append here instead of writing to the console.
    pub file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("failed to open log file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to configure tracing subscriber: {0}")]
    Configure(String),
}

/// Install the global subscriber. The returned guard flushes buffered
/// lines when dropped, so keep it alive for the life of the process.
pub fn init(config: &LogConfig) -> Result<WorkerGuard, InitError> {
    let (writer, guard) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| InitError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| InitError::Configure(err.to_string()))?;
    Ok(guard)
}

fn env_filter() -> EnvFilter {
    [FILTER_ENV, EnvFilter::DEFAULT_ENV]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
