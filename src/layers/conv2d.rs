//! 2D Convolutional layer implementation
//!
//! Convolution is computed per sample as an im2col expansion followed by a single
//! GEMM (`ndarray`), with samples of a batch processed in parallel.

use crate::layers::Layer;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

/// 2D Convolutional layer with square kernels.
///
/// # Fields
///
/// * `in_channels` - Number of input channels (e.g., 3 for RGB)
/// * `out_channels` - Number of output feature maps (number of filters)
/// * `kernel_size` - Size of the convolutional kernel (kernel_size × kernel_size)
/// * `padding` - Zero-padding applied to input (symmetric on all sides)
/// * `stride` - Stride for the convolution operation
/// * `input_height` / `input_width` - Spatial size of the input feature map
/// * `weights` - Filters (out_channels × in_channels × kernel_size × kernel_size)
/// * `biases` - Optional bias per output channel
///
/// # Example
///
/// ```ignore
/// use linear_eval::layers::Conv2DLayer;
///
/// // 3 input channels, 64 filters, 7x7 kernel, padding=3, stride=2, 224x224 input
/// let layer = Conv2DLayer::new(3, 64, 7, 3, 2, 224, 224, false);
/// assert_eq!(layer.output_height(), 112);
/// ```
pub struct Conv2DLayer {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    padding: isize,
    stride: usize,
    input_height: usize,
    input_width: usize,
    weights: Vec<f32>,
    biases: Option<Vec<f32>>,
}

impl Conv2DLayer {
    /// Create a new Conv2DLayer with zeroed weights.
    ///
    /// Weights are expected to be filled from a checkpoint through [`Layer::state_mut`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: isize,
        stride: usize,
        input_height: usize,
        input_width: usize,
        bias: bool,
    ) -> Self {
        assert!(stride > 0, "stride must be positive");
        assert!(kernel_size > 0, "kernel_size must be positive");
        let weight_count = out_channels * in_channels * kernel_size * kernel_size;

        Self {
            in_channels,
            out_channels,
            kernel_size,
            padding,
            stride,
            input_height,
            input_width,
            weights: vec![0.0f32; weight_count],
            biases: bias.then(|| vec![0.0f32; out_channels]),
        }
    }

    /// Get the number of input channels.
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Get the number of output channels (filters).
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Get the kernel size.
    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Get the stride.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Get the output height after convolution.
    ///
    /// Calculated as: (input_height + 2*padding - kernel_size) / stride + 1
    pub fn output_height(&self) -> usize {
        ((self.input_height as isize + 2 * self.padding - self.kernel_size as isize)
            / self.stride as isize
            + 1) as usize
    }

    /// Get the output width after convolution.
    ///
    /// Calculated as: (input_width + 2*padding - kernel_size) / stride + 1
    pub fn output_width(&self) -> usize {
        ((self.input_width as isize + 2 * self.padding - self.kernel_size as isize)
            / self.stride as isize
            + 1) as usize
    }

    fn is_pointwise(&self) -> bool {
        self.kernel_size == 1 && self.stride == 1 && self.padding == 0
    }

    /// Expand one sample into a (in_channels·k·k) × (out_h·out_w) column matrix.
    fn im2col(&self, sample: &[f32]) -> Array2<f32> {
        let k = self.kernel_size;
        let out_h = self.output_height();
        let out_w = self.output_width();
        let in_spatial = self.input_height * self.input_width;
        let mut cols = Array2::<f32>::zeros((self.in_channels * k * k, out_h * out_w));

        for ic in 0..self.in_channels {
            let channel = &sample[ic * in_spatial..(ic + 1) * in_spatial];
            for ky in 0..k {
                for kx in 0..k {
                    let row = (ic * k + ky) * k + kx;
                    for oy in 0..out_h {
                        let iy = (oy * self.stride) as isize + ky as isize - self.padding;
                        if iy < 0 || iy >= self.input_height as isize {
                            continue;
                        }
                        for ox in 0..out_w {
                            let ix = (ox * self.stride) as isize + kx as isize - self.padding;
                            if ix < 0 || ix >= self.input_width as isize {
                                continue;
                            }
                            cols[[row, oy * out_w + ox]] =
                                channel[iy as usize * self.input_width + ix as usize];
                        }
                    }
                }
            }
        }
        cols
    }

    fn forward_sample(&self, weights: &ArrayView2<f32>, sample: &[f32], out: &mut [f32]) {
        let out_spatial = self.output_height() * self.output_width();
        let result = if self.is_pointwise() {
            let cols = ArrayView2::from_shape(
                (self.in_channels, self.input_height * self.input_width),
                sample,
            )
            .expect("pointwise input matches (in_channels, h*w)");
            weights.dot(&cols)
        } else {
            weights.dot(&self.im2col(sample))
        };

        for (oc, row) in result.outer_iter().enumerate() {
            let bias = self.biases.as_ref().map_or(0.0, |b| b[oc]);
            let dst = &mut out[oc * out_spatial..(oc + 1) * out_spatial];
            for (d, &v) in dst.iter_mut().zip(row.iter()) {
                *d = v + bias;
            }
        }
    }
}

impl Layer for Conv2DLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let in_size = self.input_size();
        let out_size = self.output_size();
        assert_eq!(
            input.len(),
            batch_size * in_size,
            "conv input len mismatch: expected {}, got {}",
            batch_size * in_size,
            input.len()
        );
        assert_eq!(
            output.len(),
            batch_size * out_size,
            "conv output len mismatch: expected {}, got {}",
            batch_size * out_size,
            output.len()
        );

        let ckk = self.in_channels * self.kernel_size * self.kernel_size;
        let weights = ArrayView2::from_shape((self.out_channels, ckk), &self.weights[..])
            .expect("weights match (out_channels, in_channels*k*k)");

        output
            .par_chunks_mut(out_size)
            .zip(input.par_chunks(in_size))
            .for_each(|(out, sample)| self.forward_sample(&weights, sample, out));
    }

    fn input_size(&self) -> usize {
        self.in_channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.out_channels * self.output_height() * self.output_width()
    }

    fn state_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        let mut shapes = vec![(
            "weight",
            vec![
                self.out_channels,
                self.in_channels,
                self.kernel_size,
                self.kernel_size,
            ],
        )];
        if self.biases.is_some() {
            shapes.push(("bias", vec![self.out_channels]));
        }
        shapes
    }

    fn state_mut(&mut self) -> Vec<(&'static str, &mut [f32])> {
        let mut state: Vec<(&'static str, &mut [f32])> =
            vec![("weight", self.weights.as_mut_slice())];
        if let Some(biases) = self.biases.as_mut() {
            state.push(("bias", biases.as_mut_slice()));
        }
        state
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.as_ref().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(layer: &mut Conv2DLayer, weights: &[f32]) {
        for (name, values) in layer.state_mut() {
            if name == "weight" {
                values.copy_from_slice(weights);
            }
        }
    }

    #[test]
    fn test_conv2d_output_dimensions() {
        let layer = Conv2DLayer::new(3, 64, 7, 3, 2, 224, 224, false);
        assert_eq!(layer.output_height(), 112);
        assert_eq!(layer.output_width(), 112);
        assert_eq!(layer.output_size(), 64 * 112 * 112);
    }

    #[test]
    fn test_conv2d_output_dimensions_no_padding() {
        let layer = Conv2DLayer::new(1, 8, 3, 0, 1, 28, 28, false);
        assert_eq!(layer.output_height(), 26);
        assert_eq!(layer.output_width(), 26);
    }

    #[test]
    fn test_conv2d_parameter_count() {
        let with_bias = Conv2DLayer::new(1, 8, 3, 1, 1, 28, 28, true);
        assert_eq!(with_bias.parameter_count(), 8 * 9 + 8);

        let without_bias = Conv2DLayer::new(1, 8, 3, 1, 1, 28, 28, false);
        assert_eq!(without_bias.parameter_count(), 8 * 9);
        assert_eq!(without_bias.state_shapes(), vec![("weight", vec![8, 1, 3, 3])]);
    }

    #[test]
    fn test_conv2d_box_filter_with_padding() {
        // 3x3 ones kernel over a 3x3 ones input with padding 1 counts in-bounds neighbours.
        let mut layer = Conv2DLayer::new(1, 1, 3, 1, 1, 3, 3, false);
        fill(&mut layer, &[1.0; 9]);

        let input = vec![1.0f32; 9];
        let mut output = vec![0.0f32; 9];
        layer.forward(&input, &mut output, 1);

        assert_eq!(output, vec![4.0, 6.0, 4.0, 6.0, 9.0, 6.0, 4.0, 6.0, 4.0]);
    }

    #[test]
    fn test_conv2d_stride_two() {
        let mut layer = Conv2DLayer::new(1, 1, 1, 0, 2, 4, 4, false);
        fill(&mut layer, &[2.0]);

        let input: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let mut output = vec![0.0f32; 4];
        layer.forward(&input, &mut output, 1);

        assert_eq!(output, vec![0.0, 4.0, 16.0, 20.0]);
    }

    #[test]
    fn test_conv2d_pointwise_mixes_channels_and_adds_bias() {
        let mut layer = Conv2DLayer::new(2, 1, 1, 0, 1, 1, 2, true);
        for (name, values) in layer.state_mut() {
            match name {
                "weight" => values.copy_from_slice(&[1.0, -1.0]),
                "bias" => values.copy_from_slice(&[0.5]),
                _ => unreachable!(),
            }
        }

        // batch of two samples, channels-first
        let input = vec![3.0, 4.0, 1.0, 1.0, 0.0, 0.0, 2.0, 5.0];
        let mut output = vec![0.0f32; 4];
        layer.forward(&input, &mut output, 2);

        assert_eq!(output, vec![2.5, 3.5, -1.5, -4.5]);
    }
}
