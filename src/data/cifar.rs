//! CIFAR-10 / CIFAR-100 binary-format readers
//!
//! Each record is the label byte(s) followed by 3072 pixel bytes (1024 red, 1024 green,
//! 1024 blue, row-major 32x32). CIFAR-100 records carry a coarse and a fine label; the
//! fine label is used.

use crate::data::{Dataset, RawSample};
use crate::error::{EvalError, Result};
use image::{DynamicImage, Rgb, RgbImage};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Side of a CIFAR image in pixels.
pub const CIFAR_IMAGE_SIDE: u32 = 32;
const PIXELS_PER_IMAGE: usize = 3 * 32 * 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CifarVariant {
    Cifar10,
    Cifar100,
}

impl CifarVariant {
    pub fn num_classes(self) -> usize {
        match self {
            CifarVariant::Cifar10 => 10,
            CifarVariant::Cifar100 => 100,
        }
    }

    fn label_bytes(self) -> usize {
        match self {
            CifarVariant::Cifar10 => 1,
            CifarVariant::Cifar100 => 2,
        }
    }

    /// Files making up a split, relative to the dataset root.
    pub fn files(self, train: bool) -> Vec<String> {
        match (self, train) {
            (CifarVariant::Cifar10, true) => (1..=5)
                .map(|i| format!("cifar-10-batches-bin/data_batch_{}.bin", i))
                .collect(),
            (CifarVariant::Cifar10, false) => vec!["cifar-10-batches-bin/test_batch.bin".into()],
            (CifarVariant::Cifar100, true) => vec!["cifar-100-binary/train.bin".into()],
            (CifarVariant::Cifar100, false) => vec!["cifar-100-binary/test.bin".into()],
        }
    }
}

/// One CIFAR split held fully in memory as raw bytes.
pub struct CifarDataset {
    pixels: Vec<u8>,
    labels: Vec<usize>,
}

impl CifarDataset {
    /// Reads the train (`train = true`) or test split under `root`.
    ///
    /// # Errors
    ///
    /// `EvalError::DataAccess` if a file is missing, `EvalError::MalformedData` if a file is
    /// truncated or holds an out-of-range label.
    pub fn open(root: &Path, variant: CifarVariant, train: bool) -> Result<Self> {
        let record_len = variant.label_bytes() + PIXELS_PER_IMAGE;
        let mut pixels = Vec::new();
        let mut labels = Vec::new();

        for file in variant.files(train) {
            let path = root.join(&file);
            let bytes = fs::read(&path).map_err(|e| EvalError::data_access(&path, e))?;
            if bytes.len() % record_len != 0 {
                return Err(EvalError::MalformedData(format!(
                    "{} is {} bytes, not a multiple of the {}-byte record",
                    path.display(),
                    bytes.len(),
                    record_len
                )));
            }

            for record in bytes.chunks_exact(record_len) {
                let label = record[variant.label_bytes() - 1] as usize;
                if label >= variant.num_classes() {
                    return Err(EvalError::MalformedData(format!(
                        "{} contains label {} but the dataset has {} classes",
                        path.display(),
                        label,
                        variant.num_classes()
                    )));
                }
                labels.push(label);
                pixels.extend_from_slice(&record[variant.label_bytes()..]);
            }
        }

        Ok(Self { pixels, labels })
    }

    pub fn cifar10(root: &Path, train: bool) -> Result<Arc<dyn Dataset>> {
        Ok(Arc::new(Self::open(root, CifarVariant::Cifar10, train)?))
    }

    pub fn cifar100(root: &Path, train: bool) -> Result<Arc<dyn Dataset>> {
        Ok(Arc::new(Self::open(root, CifarVariant::Cifar100, train)?))
    }
}

impl Dataset for CifarDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> Result<RawSample> {
        let label = *self.labels.get(index).ok_or_else(|| {
            EvalError::MalformedData(format!(
                "index {} out of range for {} samples",
                index,
                self.labels.len()
            ))
        })?;

        let record = &self.pixels[index * PIXELS_PER_IMAGE..(index + 1) * PIXELS_PER_IMAGE];
        let plane = (CIFAR_IMAGE_SIDE * CIFAR_IMAGE_SIDE) as usize;
        let image = RgbImage::from_fn(CIFAR_IMAGE_SIDE, CIFAR_IMAGE_SIDE, |x, y| {
            let i = (y * CIFAR_IMAGE_SIDE + x) as usize;
            Rgb([record[i], record[plane + i], record[2 * plane + i]])
        });

        Ok(RawSample {
            image: DynamicImage::ImageRgb8(image),
            label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(label_bytes: &[u8], red: u8) -> Vec<u8> {
        let mut bytes = label_bytes.to_vec();
        bytes.extend(std::iter::repeat(red).take(1024));
        bytes.extend(std::iter::repeat(0u8).take(2048));
        bytes
    }

    #[test]
    fn test_cifar100_uses_fine_label() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("cifar-100-binary");
        fs::create_dir_all(&sub).unwrap();
        let mut bytes = record(&[3, 77], 200);
        bytes.extend(record(&[1, 5], 10));
        fs::write(sub.join("test.bin"), bytes).unwrap();

        let dataset = CifarDataset::open(dir.path(), CifarVariant::Cifar100, false).unwrap();
        assert_eq!(dataset.len(), 2);
        let sample = dataset.get(0).unwrap();
        assert_eq!(sample.label, 77);
        assert_eq!(sample.image.to_rgb8().get_pixel(5, 7).0, [200, 0, 0]);
        assert_eq!(dataset.get(1).unwrap().label, 5);
    }

    #[test]
    fn test_truncated_file_is_malformed() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("cifar-10-batches-bin");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("test_batch.bin"), vec![0u8; 100]).unwrap();

        let result = CifarDataset::open(dir.path(), CifarVariant::Cifar10, false);
        assert!(matches!(result, Err(EvalError::MalformedData(_))));
    }

    #[test]
    fn test_missing_train_batches() {
        let dir = tempdir().unwrap();
        let result = CifarDataset::open(dir.path(), CifarVariant::Cifar10, true);
        assert!(matches!(result, Err(EvalError::DataAccess { .. })));
    }
}
