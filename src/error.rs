//! Error taxonomy for a linear evaluation run
//!
//! Every fallible operation in the crate returns [`Result`]. Configuration problems are
//! reported before any I/O happens; checkpoint, data and fit failures abort the run.

use std::path::PathBuf;

/// Errors produced while configuring or executing a linear evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// Invalid user-supplied setting (valid_size, metric, dataset key, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Backbone weights file is missing or does not match the architecture.
    #[error("checkpoint error for {}: {reason}", path.display())]
    Checkpoint { path: PathBuf, reason: String },

    /// Dataset file could not be opened or read.
    #[error("failed to access data at {}: {source}", path.display())]
    DataAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Dataset image could not be decoded.
    #[error("failed to decode image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Dataset content is readable but structurally invalid.
    #[error("malformed dataset: {0}")]
    MalformedData(String),

    /// Buffer or matrix dimensions disagree.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// Classifier could not be fit or scored.
    #[error("classifier fit failed: {0}")]
    Fit(String),

    /// The regularization strength was read before it was selected.
    #[error("hyperparameter C has not been selected yet")]
    NotSelected,

    /// An orchestrator operation was called out of order.
    #[error("invalid phase transition: {0}")]
    Phase(String),

    /// Logging could not be initialised.
    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl EvalError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        EvalError::Configuration(message.into())
    }

    pub(crate) fn checkpoint(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        EvalError::Checkpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn data_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EvalError::DataAccess {
            path: path.into(),
            source,
        }
    }

    /// Whether this error belongs to the configuration class (raised before any I/O).
    pub fn is_configuration(&self) -> bool {
        matches!(self, EvalError::Configuration(_))
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_display() {
        let err = EvalError::config("valid_size should be in the range [0, 1]");
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "configuration error: valid_size should be in the range [0, 1]"
        );
    }

    #[test]
    fn test_checkpoint_display_includes_path() {
        let err = EvalError::checkpoint("models/byol.safetensors", "missing key conv1.weight");
        assert!(!err.is_configuration());
        let message = err.to_string();
        assert!(message.contains("models/byol.safetensors"));
        assert!(message.contains("conv1.weight"));
    }

    #[test]
    fn test_data_access_keeps_source() {
        use std::error::Error;
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = EvalError::data_access("data/CIFAR10/test_batch.bin", io);
        assert!(err.source().is_some());
    }
}
