//! Batch normalization layer implementation (inference mode)
//!
//! A frozen backbone always normalizes with its accumulated running statistics:
//!
//! ```text
//! y = γ * (x - running_mean) / sqrt(running_var + ε) + β
//! ```
//!
//! Statistics are per channel and shared across every spatial position, matching
//! `BatchNorm2d` semantics. Nothing is updated during the forward pass.
//!
//! # References
//!
//! Ioffe, S., & Szegedy, C. (2015). Batch Normalization: Accelerating Deep Network Training
//! by Reducing Internal Covariate Shift. ICML.

use crate::layers::Layer;

/// Default epsilon used by the backbone's normalization layers.
pub const DEFAULT_EPSILON: f32 = 1e-5;

/// Channel-wise batch normalization over (channels × height × width) feature maps.
///
/// # Fields
///
/// * `channels` - Number of feature maps
/// * `spatial` - Positions per feature map (height × width)
/// * `epsilon` - Small constant for numerical stability
/// * `gamma` / `beta` - Learned scale and shift (checkpoint `weight` / `bias`)
/// * `running_mean` / `running_var` - Accumulated statistics used for normalization
pub struct BatchNorm2DLayer {
    channels: usize,
    spatial: usize,
    epsilon: f32,
    gamma: Vec<f32>,
    beta: Vec<f32>,
    running_mean: Vec<f32>,
    running_var: Vec<f32>,
}

impl BatchNorm2DLayer {
    /// Creates an identity-initialised layer: γ = 1, β = 0, mean = 0, var = 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use linear_eval::layers::{BatchNorm2DLayer, Layer};
    /// let layer = BatchNorm2DLayer::new(64, 56, 56, 1e-5);
    /// assert_eq!(layer.input_size(), 64 * 56 * 56);
    /// assert_eq!(layer.parameter_count(), 128);
    /// ```
    pub fn new(channels: usize, height: usize, width: usize, epsilon: f32) -> Self {
        assert!(epsilon > 0.0, "epsilon must be positive");

        Self {
            channels,
            spatial: height * width,
            epsilon,
            gamma: vec![1.0f32; channels],
            beta: vec![0.0f32; channels],
            running_mean: vec![0.0f32; channels],
            running_var: vec![1.0f32; channels],
        }
    }

    /// Get the epsilon value used for numerical stability.
    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Number of channels normalized by this layer.
    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl Layer for BatchNorm2DLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let total_size = batch_size * self.input_size();
        assert_eq!(
            input.len(),
            total_size,
            "input len mismatch: expected {}, got {}",
            total_size,
            input.len()
        );
        assert_eq!(
            output.len(),
            total_size,
            "output len mismatch: expected {}, got {}",
            total_size,
            output.len()
        );
        if total_size == 0 {
            return;
        }

        // Fold statistics and affine parameters into one scale/shift per channel.
        let (scale, shift): (Vec<f32>, Vec<f32>) = (0..self.channels)
            .map(|c| {
                let scale = self.gamma[c] / (self.running_var[c] + self.epsilon).sqrt();
                (scale, self.beta[c] - self.running_mean[c] * scale)
            })
            .unzip();

        for (i, (src, dst)) in input
            .chunks_exact(self.spatial)
            .zip(output.chunks_exact_mut(self.spatial))
            .enumerate()
        {
            let c = i % self.channels;
            for (d, &x) in dst.iter_mut().zip(src) {
                *d = x * scale[c] + shift[c];
            }
        }
    }

    fn input_size(&self) -> usize {
        self.channels * self.spatial
    }

    fn output_size(&self) -> usize {
        self.channels * self.spatial
    }

    fn state_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        vec![
            ("weight", vec![self.channels]),
            ("bias", vec![self.channels]),
            ("running_mean", vec![self.channels]),
            ("running_var", vec![self.channels]),
        ]
    }

    fn state_mut(&mut self) -> Vec<(&'static str, &mut [f32])> {
        vec![
            ("weight", self.gamma.as_mut_slice()),
            ("bias", self.beta.as_mut_slice()),
            ("running_mean", self.running_mean.as_mut_slice()),
            ("running_var", self.running_var.as_mut_slice()),
        ]
    }

    fn parameter_count(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "epsilon must be positive")]
    fn test_batchnorm_invalid_epsilon_zero() {
        BatchNorm2DLayer::new(4, 2, 2, 0.0);
    }

    #[test]
    fn test_batchnorm_identity_initialisation() {
        let layer = BatchNorm2DLayer::new(2, 1, 2, DEFAULT_EPSILON);
        let input = vec![1.0, -2.0, 3.0, 0.5];
        let mut output = vec![0.0; 4];
        layer.forward(&input, &mut output, 1);

        for (o, i) in output.iter().zip(&input) {
            assert!((o - i).abs() < 1e-4);
        }
    }

    #[test]
    fn test_batchnorm_uses_running_statistics() {
        let mut layer = BatchNorm2DLayer::new(2, 1, 2, 1e-5);
        for (name, values) in layer.state_mut() {
            match name {
                "weight" => values.copy_from_slice(&[2.0, 1.0]),
                "bias" => values.copy_from_slice(&[0.0, 1.0]),
                "running_mean" => values.copy_from_slice(&[1.0, 0.0]),
                "running_var" => values.copy_from_slice(&[4.0, 1.0]),
                _ => unreachable!(),
            }
        }

        // two samples of two channels with two positions each
        let input = vec![1.0, 3.0, 0.0, 2.0, 5.0, -1.0, -1.0, 0.0];
        let mut output = vec![0.0; 8];
        layer.forward(&input, &mut output, 2);

        let expected = [0.0, 2.0, 1.0, 3.0, 4.0, -2.0, 0.0, 1.0];
        for (o, e) in output.iter().zip(expected.iter()) {
            assert!((o - e).abs() < 1e-4, "got {} expected {}", o, e);
        }
    }

    #[test]
    fn test_batchnorm_forward_is_repeatable() {
        let layer = BatchNorm2DLayer::new(3, 2, 2, 1e-5);
        let input: Vec<f32> = (0..12).map(|v| v as f32 * 0.1).collect();
        let mut first = vec![0.0; 12];
        let mut second = vec![0.0; 12];
        layer.forward(&input, &mut first, 1);
        layer.forward(&input, &mut second, 1);
        assert_eq!(first, second);
    }
}
