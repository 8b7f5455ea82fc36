//! Dataset access and the four evaluation splits
//!
//! - `Dataset`: indexable source of decoded `(image, label)` samples
//! - `split`: deterministic train/validation partition of the training pool
//! - `loader`: batched, transformed iteration over a subset of a dataset
//! - `registry`: the datasets known to the evaluation tool
//!
//! [`prepare_data`] wires them together into [`SplitLoaders`].

pub mod cifar;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod split;
pub mod transform;

pub use cifar::{CifarDataset, CifarVariant};
pub use loader::DataLoader;
pub use manifest::ImageManifestDataset;
pub use registry::{lookup, DatasetSpec, SplitAccess, LINEAR_DATASETS};
pub use split::{train_valid_split, SplitIndices};
pub use transform::{ImageTransform, Normalisation, IMAGENET_MEAN, IMAGENET_STD};

use crate::error::{EvalError, Result};
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// A decoded image and its class id.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub image: DynamicImage,
    pub label: usize,
}

/// Transformed images (row-major, one `sample_len` block per image) and their labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub images: Vec<f32>,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Random-access sample source. Implementations are shared across loader workers.
pub trait Dataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Result<RawSample>;
}

/// Dataset backed by already-decoded samples.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataset {
    samples: Vec<RawSample>,
}

impl InMemoryDataset {
    pub fn new(samples: Vec<RawSample>) -> Self {
        Self { samples }
    }

    pub fn push(&mut self, image: DynamicImage, label: usize) {
        self.samples.push(RawSample { image, label });
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<RawSample> {
        self.samples.get(index).cloned().ok_or_else(|| {
            EvalError::MalformedData(format!(
                "index {} out of range for {} samples",
                index,
                self.samples.len()
            ))
        })
    }
}

/// Loader settings shared by every split.
#[derive(Debug, Clone, PartialEq)]
pub struct DataOptions {
    pub batch_size: usize,
    pub image_size: u32,
    pub normalise: bool,
    pub valid_size: f64,
    pub seed: u64,
    pub num_workers: usize,
}

impl Default for DataOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            image_size: 224,
            normalise: true,
            valid_size: 0.2,
            seed: 0,
            num_workers: 1,
        }
    }
}

impl DataOptions {
    fn validate(&self) -> Result<()> {
        split::check_valid_size(self.valid_size)?;
        if self.batch_size == 0 {
            return Err(EvalError::config("batch_size must be positive"));
        }
        if self.image_size == 0 {
            return Err(EvalError::config("image_size must be positive"));
        }
        Ok(())
    }
}

/// Loaders for the four evaluation splits.
///
/// `train` and `valid` partition the training pool; `trainval` visits all of it; `test` is
/// the dataset's native test partition in its stored order.
pub struct SplitLoaders {
    pub train: DataLoader,
    pub valid: DataLoader,
    pub trainval: DataLoader,
    pub test: DataLoader,
}

impl SplitLoaders {
    /// Builds the four loaders from an opened training pool and test set.
    pub fn from_datasets(
        train_pool: Arc<dyn Dataset>,
        test: Arc<dyn Dataset>,
        options: &DataOptions,
    ) -> Result<Self> {
        options.validate()?;
        let indices = train_valid_split(train_pool.len(), options.valid_size, options.seed, true)?;

        let transform = Arc::new(ImageTransform::new(
            options.image_size,
            Normalisation::from_flag(options.normalise),
        )?);
        let pool = loader::worker_pool(options.num_workers)?;
        let batch_size = options.batch_size;

        let train = DataLoader::new(train_pool.clone(), indices.train, batch_size, transform.clone())?
            .with_shuffle(options.seed)
            .with_pool(pool.clone());
        let valid = DataLoader::new(train_pool.clone(), indices.valid, batch_size, transform.clone())?
            .with_shuffle(options.seed)
            .with_pool(pool.clone());
        let trainval = DataLoader::all(train_pool, batch_size, transform.clone())?
            .with_shuffle(options.seed)
            .with_pool(pool.clone());
        let test = DataLoader::all(test, batch_size, transform)?.with_pool(pool);

        info!(
            train = train.len(),
            valid = valid.len(),
            trainval = trainval.len(),
            test = test.len(),
            "Prepared dataset splits"
        );
        Ok(Self {
            train,
            valid,
            trainval,
            test,
        })
    }
}

/// Opens a registered dataset and builds its split loaders.
///
/// Options are validated before the dataset is touched. `data_dir` overrides the
/// registry's root directory.
pub fn prepare_data(
    spec: &DatasetSpec,
    data_dir: Option<&Path>,
    options: &DataOptions,
) -> Result<SplitLoaders> {
    options.validate()?;
    let root = data_dir.unwrap_or_else(|| Path::new(spec.root));
    info!(dataset = spec.name, root = %root.display(), access = ?spec.access, "Opening dataset");

    let train_pool = spec.access.open_train(root)?;
    let test = spec.access.open_test(root)?;
    SplitLoaders::from_datasets(train_pool, test, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn tiny(n: usize) -> Arc<dyn Dataset> {
        let mut dataset = InMemoryDataset::default();
        for i in 0..n {
            dataset.push(
                DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]))),
                i % 2,
            );
        }
        Arc::new(dataset)
    }

    #[test]
    fn test_split_loader_sizes() {
        let options = DataOptions {
            batch_size: 3,
            image_size: 2,
            ..DataOptions::default()
        };
        let loaders = SplitLoaders::from_datasets(tiny(10), tiny(4), &options).unwrap();
        assert_eq!(loaders.train.len(), 8);
        assert_eq!(loaders.valid.len(), 2);
        assert_eq!(loaders.trainval.len(), 10);
        assert_eq!(loaders.test.len(), 4);
        assert_eq!(loaders.test.indices(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_invalid_valid_size_fails_before_opening() {
        let options = DataOptions {
            valid_size: -0.1,
            ..DataOptions::default()
        };
        let spec = lookup("cifar10").unwrap();
        let missing = Path::new("/nonexistent/linear-eval-data");
        let err = prepare_data(spec, Some(missing), &options).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_dataset_is_data_access_error() {
        let spec = lookup("cifar10").unwrap();
        let missing = Path::new("/nonexistent/linear-eval-data");
        let err = prepare_data(spec, Some(missing), &DataOptions::default()).err().unwrap();
        assert!(matches!(err, EvalError::DataAccess { .. }));
    }

    #[test]
    fn test_in_memory_out_of_range() {
        assert!(tiny(1).get(1).is_err());
    }
}
