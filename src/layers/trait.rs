//! Layer trait definition for frozen backbone layers
//!
//! Layers only run forward: weights come from a checkpoint and never change afterwards.
//! Besides forward propagation the trait exposes the layer's named state tensors so a
//! checkpoint can be matched against the architecture.

/// Core trait for inference-only neural network layers.
///
/// All layer types (Conv2D, BatchNorm2D, pooling) implement this trait to provide
/// a uniform interface for forward propagation and checkpoint loading.
///
/// Layers work on flat row-major f32 buffers, one sample after another.
///
/// # Example
///
/// ```ignore
/// let mut output = vec![0.0f32; batch_size * layer.output_size()];
/// layer.forward(&input, &mut output, batch_size);
/// ```
pub trait Layer {
    /// Forward propagation through the layer.
    ///
    /// # Arguments
    ///
    /// * `input` - Input data flattened as a 1D array (batch_size × input_size)
    /// * `output` - Output buffer to store results (batch_size × output_size)
    /// * `batch_size` - Number of samples in the batch
    ///
    /// # Panics
    ///
    /// Implementations panic if input/output lengths don't match the layer geometry.
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize);

    /// Number of input values per sample.
    fn input_size(&self) -> usize;

    /// Number of output values per sample.
    fn output_size(&self) -> usize;

    /// Named state tensors with their shapes, in checkpoint naming (`weight`, `bias`,
    /// `running_mean`, `running_var`). Parameter-free layers return an empty list.
    fn state_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        Vec::new()
    }

    /// Mutable access to the state tensors listed by [`Layer::state_shapes`], same order.
    fn state_mut(&mut self) -> Vec<(&'static str, &mut [f32])> {
        Vec::new()
    }

    /// Number of learnable parameters (buffers such as running statistics excluded).
    fn parameter_count(&self) -> usize;
}
