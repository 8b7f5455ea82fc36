//! Deterministic train/validation partitioning of a training pool.

use crate::error::{EvalError, Result};
use crate::utils::SimpleRng;

/// Index sets produced by [`train_valid_split`]. Together they partition `0..num_train`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

/// Rejects a held-out fraction outside `[0, 1]` (NaN included).
pub fn check_valid_size(valid_size: f64) -> Result<()> {
    if (0.0..=1.0).contains(&valid_size) {
        Ok(())
    } else {
        Err(EvalError::config(format!(
            "valid_size should be in the range [0, 1], got {}",
            valid_size
        )))
    }
}

/// Splits `0..num_train` into training and held-out indices.
///
/// The indices are shuffled with a fresh `SimpleRng::new(seed)` (when `shuffle` is set);
/// the first `floor(valid_size * num_train)` go to validation and the rest to training.
///
/// # Errors
///
/// `EvalError::Configuration` if `valid_size` is outside `[0, 1]`. The check runs before
/// any shuffling.
///
/// # Examples
///
/// ```
/// use linear_eval::data::split::train_valid_split;
/// let split = train_valid_split(10, 0.2, 0, true).unwrap();
/// assert_eq!(split.valid.len(), 2);
/// assert_eq!(split.train.len(), 8);
/// ```
pub fn train_valid_split(
    num_train: usize,
    valid_size: f64,
    seed: u64,
    shuffle: bool,
) -> Result<SplitIndices> {
    check_valid_size(valid_size)?;

    let mut indices: Vec<usize> = (0..num_train).collect();
    let split = (valid_size * num_train as f64).floor() as usize;
    if shuffle {
        let mut rng = SimpleRng::new(seed);
        rng.shuffle_usize(&mut indices);
    }

    let train = indices.split_off(split.min(num_train));
    Ok(SplitIndices {
        train,
        valid: indices,
    })
}
