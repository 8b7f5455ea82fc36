//! Linear classifier fit on frozen features
//!
//! - `LogisticRegression`: multinomial, L2-regularised, solved with L-BFGS
//! - `metrics`: accuracy and mean per-class accuracy

pub mod logistic;
pub mod metrics;

pub use logistic::LogisticRegression;
pub use metrics::{accuracy, mean_per_class_accuracy, ConfusionMatrix};

use crate::error::{EvalError, Result};
use std::fmt;
use std::str::FromStr;

/// Score reported by [`LogisticRegression::fit_and_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Accuracy,
    MeanPerClassAccuracy,
}

impl Metric {
    pub fn score(self, y_true: &[usize], y_pred: &[usize]) -> Result<f64> {
        match self {
            Metric::Accuracy => accuracy(y_true, y_pred),
            Metric::MeanPerClassAccuracy => mean_per_class_accuracy(y_true, y_pred),
        }
    }
}

impl FromStr for Metric {
    type Err = EvalError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "accuracy" => Ok(Metric::Accuracy),
            "mean per-class accuracy" | "mean-per-class-accuracy" | "mean_per_class_accuracy" => {
                Ok(Metric::MeanPerClassAccuracy)
            }
            _ => Err(EvalError::config(format!(
                "unsupported metric '{}'. Must be one of: accuracy, mean per-class accuracy",
                name
            ))),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Accuracy => f.write_str("accuracy"),
            Metric::MeanPerClassAccuracy => f.write_str("mean per-class accuracy"),
        }
    }
}
