//! Configuration for an evaluation run
//!
//! Settings can come from a JSON file, from the command line, or both (command-line values
//! win). Every field has a default, so an empty JSON object is a valid configuration.

use crate::data::{self, DataOptions};
use crate::error::{EvalError, Result};
use crate::evaluation::DEFAULT_WD_VALUES;
use crate::utils::logging;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Compute device for the backbone forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
}

impl FromStr for Device {
    type Err = EvalError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            other => Err(EvalError::config(format!(
                "unsupported device '{}'. Only 'cpu' is available",
                other
            ))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
        }
    }
}

/// Settings of one linear evaluation.
///
/// # Example
///
/// ```json
/// {
///   "model": "simclr",
///   "dataset": "diabetic_retinopathy",
///   "batch_size": 32,
///   "wd_values": 5,
///   "normalise": false
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    /// Checkpoint name, loaded from `<models_dir>/<model>.safetensors`
    pub model: String,

    /// Registry key of the dataset
    pub dataset: String,

    pub batch_size: usize,
    pub image_size: u32,

    /// Number of log-spaced weight decay candidates to validate
    pub wd_values: usize,

    /// Fixed inverse regularisation strength; skips the validation search when set
    #[serde(rename = "C", alias = "c")]
    pub c: Option<f64>,

    /// ImageNet mean/std normalisation of the input images
    pub normalise: bool,

    pub device: String,
    pub valid_size: f64,
    pub seed: u64,
    pub num_workers: usize,
    pub models_dir: PathBuf,
    pub logs_dir: PathBuf,

    /// Overrides the dataset root from the registry
    pub data_dir: Option<PathBuf>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            model: "byol".to_string(),
            dataset: "cifar10".to_string(),
            batch_size: 64,
            image_size: 224,
            wd_values: DEFAULT_WD_VALUES,
            c: None,
            normalise: true,
            device: "cpu".to_string(),
            valid_size: 0.2,
            seed: 0,
            num_workers: 1,
            models_dir: PathBuf::from("models"),
            logs_dir: PathBuf::from("logs"),
            data_dir: None,
        }
    }
}

impl EvalConfig {
    pub fn data_options(&self) -> DataOptions {
        DataOptions {
            batch_size: self.batch_size,
            image_size: self.image_size,
            normalise: self.normalise,
            valid_size: self.valid_size,
            seed: self.seed,
            num_workers: self.num_workers,
        }
    }

    /// `<logs_dir>/linear_<model>_<dataset>.log`
    pub fn log_path(&self) -> PathBuf {
        logging::log_path(&self.logs_dir, &self.model, &self.dataset)
    }

    pub fn device(&self) -> Result<Device> {
        self.device.parse()
    }
}

/// Loads an evaluation configuration from a JSON file and validates it.
///
/// # Examples
///
/// ```no_run
/// use linear_eval::config::load_config;
/// use std::path::Path;
///
/// let cfg = load_config(Path::new("config/cifar10_byol.json")).unwrap();
/// assert_eq!(cfg.dataset, "cifar10");
/// ```
pub fn load_config(path: &Path) -> Result<EvalConfig> {
    let config = read_config(path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Parses a JSON configuration without range checks.
///
/// Callers that merge further overrides must run [`validate_config`] on the result.
pub fn read_config(path: &Path) -> Result<EvalConfig> {
    let contents = fs::read_to_string(path).map_err(|e| EvalError::data_access(path, e))?;
    serde_json::from_str(&contents)
        .map_err(|e| EvalError::config(format!("invalid config {}: {}", path.display(), e)))
}

/// Checks every setting that can be rejected without touching the filesystem.
pub fn validate_config(config: &EvalConfig) -> Result<()> {
    if config.model.trim().is_empty() {
        return Err(EvalError::config("model name must not be empty"));
    }
    data::lookup(&config.dataset)?;
    data::split::check_valid_size(config.valid_size)?;

    if config.batch_size == 0 {
        return Err(EvalError::config("batch_size must be positive"));
    }
    if config.image_size == 0 {
        return Err(EvalError::config("image_size must be positive"));
    }
    if config.wd_values == 0 {
        return Err(EvalError::config("wd_values must be positive"));
    }
    if let Some(c) = config.c {
        if !(c.is_finite() && c > 0.0) {
            return Err(EvalError::config(format!("C must be positive and finite, got {}", c)));
        }
    }
    config.device()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EvalConfig::default();
        validate_config(&config).unwrap();
        assert_eq!(config.log_path(), Path::new("logs").join("linear_byol_cifar10.log"));
        assert_eq!(config.data_options(), DataOptions::default());
    }

    #[test]
    fn test_device_names() {
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert!("cuda".parse::<Device>().unwrap_err().is_configuration());
    }
}
