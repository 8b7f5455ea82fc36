//! Image preprocessing shared by every split
//!
//! Resize (shorter side, bicubic) -> center crop -> scale to [0, 1] -> CHW -> normalise.

use crate::error::{EvalError, Result};
use image::imageops::FilterType;
use image::DynamicImage;

/// Per-channel mean of the ImageNet training set.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel standard deviation of the ImageNet training set.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Channel normalisation `(x - mean) / std`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalisation {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalisation {
    pub fn imagenet() -> Self {
        Self {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    /// Leaves the [0, 1] pixel values untouched.
    pub fn identity() -> Self {
        Self {
            mean: [0.0; 3],
            std: [1.0; 3],
        }
    }

    pub fn from_flag(normalise: bool) -> Self {
        if normalise {
            Self::imagenet()
        } else {
            Self::identity()
        }
    }
}

/// Turns a decoded image into a `3 × image_size × image_size` f32 tensor.
#[derive(Debug, Clone)]
pub struct ImageTransform {
    image_size: u32,
    normalisation: Normalisation,
}

impl ImageTransform {
    /// # Errors
    ///
    /// `EvalError::Configuration` when `image_size` is zero.
    pub fn new(image_size: u32, normalisation: Normalisation) -> Result<Self> {
        if image_size == 0 {
            return Err(EvalError::config("image_size must be positive"));
        }
        Ok(Self {
            image_size,
            normalisation,
        })
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Number of values produced per image.
    pub fn sample_len(&self) -> usize {
        let side = self.image_size as usize;
        3 * side * side
    }

    pub fn apply(&self, image: &DynamicImage) -> Vec<f32> {
        let size = self.image_size;
        let (width, height) = resized_dims(image.width(), image.height(), size);
        let resized = if (width, height) == (image.width(), image.height()) {
            image.clone()
        } else {
            image.resize_exact(width, height, FilterType::CatmullRom)
        };

        let left = crop_offset(width, size);
        let top = crop_offset(height, size);
        let rgb = resized.crop_imm(left, top, size, size).to_rgb8();

        let side = size as usize;
        let plane = side * side;
        let mut out = vec![0.0f32; 3 * plane];
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let offset = y as usize * side + x as usize;
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                out[c * plane + offset] =
                    (value - self.normalisation.mean[c]) / self.normalisation.std[c];
            }
        }
        out
    }
}

/// Target size when the shorter side is scaled to `size` (longer side truncated).
fn resized_dims(width: u32, height: u32, size: u32) -> (u32, u32) {
    if width <= height {
        let long = (size as u64 * height as u64 / width.max(1) as u64) as u32;
        (size, long.max(size))
    } else {
        let long = (size as u64 * width as u64 / height.max(1) as u64) as u32;
        (long.max(size), size)
    }
}

/// Center-crop offset, rounding half to even.
fn crop_offset(length: u32, size: u32) -> u32 {
    let excess = length.saturating_sub(size) as f64;
    (excess / 2.0).round_ties_even() as u32
}
