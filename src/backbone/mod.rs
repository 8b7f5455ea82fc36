//! Frozen feature extractors
//!
//! A backbone maps a batch of preprocessed images (batch × 3 × H × W, row-major) to one
//! embedding per image. Weights come from a [`Checkpoint`] and are never updated.

pub mod checkpoint;
pub mod resnet;

pub use checkpoint::{Checkpoint, TensorData};
pub use resnet::{ResNetBackbone, ResNetConfig};

use crate::error::Result;

/// Inference-only image embedding.
pub trait FeatureExtractor {
    /// Length of one embedding.
    fn feature_dim(&self) -> usize;

    /// Number of f32 values making up one input image.
    fn sample_len(&self) -> usize;

    /// Embeds `batch_size` images stored contiguously in `images`.
    ///
    /// Returns a row-major `batch_size × feature_dim` buffer.
    fn extract(&self, images: &[f32], batch_size: usize) -> Result<Vec<f32>>;
}
