//! Logging setup for evaluation runs.
//!
//! Installs a global `tracing` subscriber with two sinks: a human-readable stderr layer
//! and a plain-text per-run log file (truncated on every run).

use crate::error::{EvalError, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Per-run log file name for a model/dataset pair.
pub fn log_file_name(model: &str, dataset: &str) -> String {
    format!("linear_{}_{}.log", model, dataset)
}

/// Full log path under `logs_dir`.
pub fn log_path(logs_dir: &Path, model: &str, dataset: &str) -> PathBuf {
    logs_dir.join(log_file_name(model, dataset))
}

/// Configures the global tracing subscriber.
///
/// The filter defaults to `info` and can be overridden with `RUST_LOG`.
pub fn init_logging(log_path: &Path) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| EvalError::data_access(parent, e))?;
        }
    }
    let file = File::create(log_path).map_err(|e| EvalError::data_access(log_path, e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    Registry::default()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| EvalError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        assert_eq!(log_file_name("byol", "cifar10"), "linear_byol_cifar10.log");
    }

    #[test]
    fn test_log_path_joins_dir() {
        let path = log_path(Path::new("logs"), "simclr", "shenzhen_cxr");
        assert_eq!(path, Path::new("logs").join("linear_simclr_shenzhen_cxr.log"));
    }
}
