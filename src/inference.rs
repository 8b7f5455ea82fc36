//! Embedding every sample of a split
//!
//! The backbone is run over each batch exactly once and the outputs are stacked in
//! iteration order, so row `i` of the feature matrix always belongs to label `i`.

use crate::backbone::FeatureExtractor;
use crate::data::Batch;
use crate::error::{EvalError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array2;
use tracing::info;

/// Feature matrix (N × feature_dim) and the parallel label vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    features: Array2<f32>,
    labels: Vec<usize>,
}

impl FeatureSet {
    pub fn new(features: Array2<f32>, labels: Vec<usize>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(EvalError::Shape(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    pub fn features(&self) -> &Array2<f32> {
        &self.features
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn feature_dim(&self) -> usize {
        self.features.ncols()
    }
}

fn progress_bar(len: usize, split: &str) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} batches") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(format!("Computing features for {} set", split));
    bar
}

/// Runs `extractor` over every batch and concatenates the embeddings.
///
/// # Errors
///
/// Propagates loading and extraction failures; `EvalError::Shape` if a batch's image
/// buffer or the extractor output has the wrong length.
pub fn extract_features<I, E>(batches: I, extractor: &E, split: &str) -> Result<FeatureSet>
where
    I: IntoIterator<Item = Result<Batch>>,
    E: FeatureExtractor + ?Sized,
{
    let batches = batches.into_iter();
    let dim = extractor.feature_dim();
    let bar = progress_bar(batches.size_hint().0, split);

    let mut values = Vec::new();
    let mut labels = Vec::new();
    for batch in batches {
        let batch = batch?;
        if batch.images.len() != batch.len() * extractor.sample_len() {
            return Err(EvalError::Shape(format!(
                "batch of {} labels carries {} image values, expected {} per image",
                batch.len(),
                batch.images.len(),
                extractor.sample_len()
            )));
        }

        let embedded = extractor.extract(&batch.images, batch.len())?;
        if embedded.len() != batch.len() * dim {
            return Err(EvalError::Shape(format!(
                "extractor returned {} values for {} images of dimension {}",
                embedded.len(),
                batch.len(),
                dim
            )));
        }
        values.extend_from_slice(&embedded);
        labels.extend_from_slice(&batch.labels);
        bar.inc(1);
    }
    bar.finish_and_clear();

    let features = Array2::from_shape_vec((labels.len(), dim), values)
        .map_err(|e| EvalError::Shape(e.to_string()))?;
    info!(split, samples = labels.len(), feature_dim = dim, "Computed features");
    FeatureSet::new(features, labels)
}
