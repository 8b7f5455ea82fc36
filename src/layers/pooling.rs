//! Parameter-free pooling layers
//!
//! - `MaxPool2DLayer`: windowed maximum with implicit -inf padding
//! - `GlobalAvgPool`: mean over all spatial positions, flattening to one value per channel

use crate::layers::Layer;

/// Max pooling over square windows.
pub struct MaxPool2DLayer {
    channels: usize,
    input_height: usize,
    input_width: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

impl MaxPool2DLayer {
    pub fn new(
        channels: usize,
        input_height: usize,
        input_width: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        assert!(stride > 0, "stride must be positive");
        assert!(
            padding * 2 <= kernel_size,
            "padding must be at most half the kernel size"
        );
        Self {
            channels,
            input_height,
            input_width,
            kernel_size,
            stride,
            padding,
        }
    }

    /// Output height: (input_height + 2*padding - kernel_size) / stride + 1
    pub fn output_height(&self) -> usize {
        (self.input_height + 2 * self.padding - self.kernel_size) / self.stride + 1
    }

    /// Output width: (input_width + 2*padding - kernel_size) / stride + 1
    pub fn output_width(&self) -> usize {
        (self.input_width + 2 * self.padding - self.kernel_size) / self.stride + 1
    }
}

impl Layer for MaxPool2DLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let in_spatial = self.input_height * self.input_width;
        let out_h = self.output_height();
        let out_w = self.output_width();
        assert_eq!(input.len(), batch_size * self.input_size(), "maxpool input len mismatch");
        assert_eq!(output.len(), batch_size * self.output_size(), "maxpool output len mismatch");

        for (plane, out_plane) in input
            .chunks_exact(in_spatial)
            .zip(output.chunks_exact_mut(out_h * out_w))
        {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut max_value = f32::NEG_INFINITY;
                    for ky in 0..self.kernel_size {
                        let iy = (oy * self.stride + ky) as isize - self.padding as isize;
                        if iy < 0 || iy >= self.input_height as isize {
                            continue;
                        }
                        for kx in 0..self.kernel_size {
                            let ix = (ox * self.stride + kx) as isize - self.padding as isize;
                            if ix < 0 || ix >= self.input_width as isize {
                                continue;
                            }
                            let value = plane[iy as usize * self.input_width + ix as usize];
                            if value > max_value {
                                max_value = value;
                            }
                        }
                    }
                    out_plane[oy * out_w + ox] = max_value;
                }
            }
        }
    }

    fn input_size(&self) -> usize {
        self.channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.channels * self.output_height() * self.output_width()
    }

    fn parameter_count(&self) -> usize {
        0
    }
}

/// Adaptive average pooling to 1×1 followed by flatten.
pub struct GlobalAvgPool {
    channels: usize,
    spatial: usize,
}

impl GlobalAvgPool {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            spatial: height * width,
        }
    }
}

impl Layer for GlobalAvgPool {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        assert_eq!(input.len(), batch_size * self.input_size(), "avgpool input len mismatch");
        assert_eq!(output.len(), batch_size * self.channels, "avgpool output len mismatch");
        if self.spatial == 0 {
            return;
        }

        let inv = 1.0f32 / self.spatial as f32;
        for (plane, out) in input.chunks_exact(self.spatial).zip(output.iter_mut()) {
            *out = plane.iter().sum::<f32>() * inv;
        }
    }

    fn input_size(&self) -> usize {
        self.channels * self.spatial
    }

    fn output_size(&self) -> usize {
        self.channels
    }

    fn parameter_count(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maxpool_resnet_stem_geometry() {
        let pool = MaxPool2DLayer::new(64, 112, 112, 3, 2, 1);
        assert_eq!(pool.output_height(), 56);
        assert_eq!(pool.output_width(), 56);
    }

    #[test]
    fn test_maxpool_padding_ignores_border() {
        // Negative values must not be replaced by an implicit zero padding.
        let pool = MaxPool2DLayer::new(1, 2, 2, 3, 2, 1);
        let input = vec![-4.0, -3.0, -2.0, -1.0];
        let mut output = vec![0.0; 1];
        pool.forward(&input, &mut output, 1);
        assert_eq!(output, vec![-1.0]);
    }

    #[test]
    fn test_maxpool_windows() {
        let pool = MaxPool2DLayer::new(1, 4, 4, 2, 2, 0);
        let input: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let mut output = vec![0.0; 4];
        pool.forward(&input, &mut output, 1);
        assert_eq!(output, vec![5.0, 7.0, 13.0, 15.0]);
    }

    #[test]
    fn test_global_avg_pool() {
        let pool = GlobalAvgPool::new(2, 2, 2);
        let input = vec![1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 8.0];
        let mut output = vec![0.0; 2];
        pool.forward(&input, &mut output, 1);
        assert_eq!(output, vec![2.5, 2.0]);
        assert_eq!(pool.output_size(), 2);
    }
}
