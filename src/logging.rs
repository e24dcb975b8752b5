use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::errors::{EvalError, Result};

/// Configures the global tracing subscriber for the evaluation run.
///
/// Always logs to stdout, filtered by `RUST_LOG` with an `info` fallback.
/// When `save_dir` is non-empty, an ANSI-free copy of the stream is appended
/// to `save_dir/file_name`, creating the directory and file as needed.
///
/// Returns whether the log file already existed before this run.
pub fn initialize_logging(save_dir: &Path, file_name: &str) -> Result<bool> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let ansi = std::io::stdout().is_terminal();
    let stdout_layer = fmt::layer().with_target(true).with_ansi(ansi);

    if save_dir.as_os_str().is_empty() {
        Registry::default()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .map_err(|e| EvalError::Configuration {
                message: format!("failed to initialize tracing subscriber: {e}"),
            })?;
        return Ok(false);
    }

    std::fs::create_dir_all(save_dir).map_err(|e| EvalError::FileSystem {
        path: save_dir.to_path_buf(),
        operation: "create log directory".to_string(),
        source: e,
    })?;

    let log_path = save_dir.join(file_name);
    let log_file_exists = log_path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| EvalError::FileSystem {
            path: log_path.clone(),
            operation: "open log file".to_string(),
            source: e,
        })?;

    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    Registry::default()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| EvalError::Configuration {
            message: format!("failed to initialize tracing subscriber: {e}"),
        })?;

    Ok(log_file_exists)
}
