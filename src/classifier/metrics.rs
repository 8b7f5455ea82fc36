//! Scoring of predicted labels against ground truth
//!
//! Both scores are percentages in [0, 100].

use crate::error::{EvalError, Result};
use ndarray::Array2;

/// Counts of (true, predicted) label pairs.
///
/// Rows and columns are indexed by the sorted union of the labels that occur in either
/// vector; row `i` holds the samples whose true class is `classes()[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    classes: Vec<usize>,
    counts: Array2<usize>,
}

impl ConfusionMatrix {
    pub fn new(y_true: &[usize], y_pred: &[usize]) -> Result<Self> {
        check_lengths(y_true, y_pred)?;

        let mut classes: Vec<usize> = y_true.iter().chain(y_pred).copied().collect();
        classes.sort_unstable();
        classes.dedup();

        let mut counts = Array2::<usize>::zeros((classes.len(), classes.len()));
        for (t, p) in y_true.iter().zip(y_pred) {
            // Both labels are in `classes` by construction.
            let row = classes.binary_search(t).unwrap_or_default();
            let col = classes.binary_search(p).unwrap_or_default();
            counts[[row, col]] += 1;
        }
        Ok(Self { classes, counts })
    }

    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    /// Count for a (true, predicted) label pair; zero for labels never seen.
    pub fn get(&self, true_label: usize, predicted: usize) -> usize {
        match (
            self.classes.binary_search(&true_label),
            self.classes.binary_search(&predicted),
        ) {
            (Ok(row), Ok(col)) => self.counts[[row, col]],
            _ => 0,
        }
    }

    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    /// Recall of every class, `None` for a class with no true samples.
    pub fn per_class_recall(&self) -> Vec<Option<f64>> {
        self.counts
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let support: usize = row.sum();
                (support > 0).then(|| row[i] as f64 / support as f64)
            })
            .collect()
    }
}

fn check_lengths(y_true: &[usize], y_pred: &[usize]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(EvalError::Shape(format!(
            "{} true labels but {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(EvalError::Fit("cannot score an empty evaluation set".into()));
    }
    Ok(())
}

/// Percentage of predictions equal to the true label.
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(100.0 * correct as f64 / y_true.len() as f64)
}

/// Mean of the per-class recalls, as a percentage.
///
/// Classes that only occur among the predictions have no true samples; they are left out
/// of the mean rather than contributing 0/0.
pub fn mean_per_class_accuracy(y_true: &[usize], y_pred: &[usize]) -> Result<f64> {
    let matrix = ConfusionMatrix::new(y_true, y_pred)?;
    let recalls: Vec<f64> = matrix.per_class_recall().into_iter().flatten().collect();
    Ok(100.0 * recalls.iter().sum::<f64>() / recalls.len() as f64)
}
