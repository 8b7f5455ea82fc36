//! Batched iteration over a subset of a dataset
//!
//! Images of one batch are decoded and transformed on an optional rayon pool; the loader
//! itself is read-only, so every call to [`DataLoader::iter`] replays the same order.

use crate::data::transform::ImageTransform;
use crate::data::{Batch, Dataset};
use crate::error::{EvalError, Result};
use crate::utils::SimpleRng;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::Arc;

/// Builds the decoding pool shared by a run's loaders. `num_workers <= 1` decodes inline.
pub fn worker_pool(num_workers: usize) -> Result<Option<Arc<ThreadPool>>> {
    if num_workers <= 1 {
        return Ok(None);
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .thread_name(|i| format!("loader-{}", i))
        .build()
        .map(|pool| Some(Arc::new(pool)))
        .map_err(|e| EvalError::config(format!("cannot start {} loader workers: {}", num_workers, e)))
}

pub struct DataLoader {
    dataset: Arc<dyn Dataset>,
    indices: Vec<usize>,
    batch_size: usize,
    transform: Arc<ImageTransform>,
    shuffle_seed: Option<u64>,
    pool: Option<Arc<ThreadPool>>,
}

impl DataLoader {
    /// Loader over the given dataset indices, in order.
    ///
    /// # Errors
    ///
    /// `EvalError::Configuration` when `batch_size` is zero.
    pub fn new(
        dataset: Arc<dyn Dataset>,
        indices: Vec<usize>,
        batch_size: usize,
        transform: Arc<ImageTransform>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(EvalError::config("batch_size must be positive"));
        }
        Ok(Self {
            dataset,
            indices,
            batch_size,
            transform,
            shuffle_seed: None,
            pool: None,
        })
    }

    /// Loader over every sample of the dataset.
    pub fn all(
        dataset: Arc<dyn Dataset>,
        batch_size: usize,
        transform: Arc<ImageTransform>,
    ) -> Result<Self> {
        let indices = (0..dataset.len()).collect();
        Self::new(dataset, indices, batch_size, transform)
    }

    /// Visits the indices in a seeded random order.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    pub fn with_pool(mut self, pool: Option<Arc<ThreadPool>>) -> Self {
        self.pool = pool;
        self
    }

    /// Number of samples visited per pass.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn iter(&self) -> Batches<'_> {
        let mut order = self.indices.clone();
        if let Some(seed) = self.shuffle_seed {
            SimpleRng::new(seed).shuffle_usize(&mut order);
        }
        Batches {
            loader: self,
            order,
            position: 0,
        }
    }

    fn load_sample(&self, index: usize) -> Result<(Vec<f32>, usize)> {
        let sample = self.dataset.get(index)?;
        Ok((self.transform.apply(&sample.image), sample.label))
    }

    fn load_batch(&self, indices: &[usize]) -> Result<Batch> {
        let samples: Vec<(Vec<f32>, usize)> = match &self.pool {
            Some(pool) => pool.install(|| {
                indices
                    .par_iter()
                    .map(|&i| self.load_sample(i))
                    .collect::<Result<Vec<_>>>()
            })?,
            None => indices
                .iter()
                .map(|&i| self.load_sample(i))
                .collect::<Result<Vec<_>>>()?,
        };

        let mut batch = Batch {
            images: Vec::with_capacity(samples.len() * self.transform.sample_len()),
            labels: Vec::with_capacity(samples.len()),
        };
        for (image, label) in samples {
            batch.images.extend_from_slice(&image);
            batch.labels.push(label);
        }
        Ok(batch)
    }
}

/// Iterator returned by [`DataLoader::iter`]; the last batch may be short.
pub struct Batches<'a> {
    loader: &'a DataLoader,
    order: Vec<usize>,
    position: usize,
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.loader.batch_size).min(self.order.len());
        let batch = self.loader.load_batch(&self.order[self.position..end]);
        self.position = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.position).div_ceil(self.loader.batch_size);
        (remaining, Some(remaining))
    }
}

impl<'a> IntoIterator for &'a DataLoader {
    type Item = Result<Batch>;
    type IntoIter = Batches<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
