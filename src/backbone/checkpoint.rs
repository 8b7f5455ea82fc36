//! Persisted backbone weights.
//!
//! Checkpoints are safetensors files named `<model_name>.safetensors` inside a models
//! directory, mapping state-dict keys (`conv1.weight`, `layer1.0.bn1.running_var`, ...)
//! to tensors. Only floating point tensors are kept; `num_batches_tracked` counters are
//! dropped on load.

use crate::error::{EvalError, Result};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File extension of persisted checkpoints.
pub const CHECKPOINT_EXTENSION: &str = "safetensors";

const IGNORED_SUFFIX: &str = "num_batches_tracked";

/// One named tensor: shape plus row-major values.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

/// In-memory state dict.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    tensors: BTreeMap<String, TensorData>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the checkpoint for `model_name` under `models_dir`.
    pub fn path_for(models_dir: &Path, model_name: &str) -> PathBuf {
        models_dir.join(format!("{}.{}", model_name, CHECKPOINT_EXTENSION))
    }

    /// Reads a safetensors file.
    ///
    /// # Errors
    ///
    /// `EvalError::Checkpoint` if the file is missing, unparsable, or holds a
    /// tensor with an unsupported dtype.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .map_err(|e| EvalError::checkpoint(path, format!("cannot read file: {}", e)))?;
        let parsed = SafeTensors::deserialize(&bytes)
            .map_err(|e| EvalError::checkpoint(path, format!("invalid safetensors data: {}", e)))?;

        let mut tensors = BTreeMap::new();
        for (name, view) in parsed.tensors() {
            if name.ends_with(IGNORED_SUFFIX) {
                continue;
            }
            let values = decode_values(&view).ok_or_else(|| {
                EvalError::checkpoint(
                    path,
                    format!("tensor {} has unsupported dtype {:?}", name, view.dtype()),
                )
            })?;
            tensors.insert(
                name,
                TensorData {
                    shape: view.shape().to_vec(),
                    values,
                },
            );
        }
        Ok(Self { tensors })
    }

    /// Writes all tensors as little-endian F32.
    pub fn save(&self, path: &Path) -> Result<()> {
        let encoded: Vec<(&str, Vec<usize>, Vec<u8>)> = self
            .tensors
            .iter()
            .map(|(name, tensor)| {
                let bytes = tensor.values.iter().flat_map(|v| v.to_le_bytes()).collect();
                (name.as_str(), tensor.shape.clone(), bytes)
            })
            .collect();

        let mut views = Vec::with_capacity(encoded.len());
        for (name, shape, bytes) in &encoded {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map_err(|e| EvalError::checkpoint(path, format!("tensor {}: {}", name, e)))?;
            views.push((*name, view));
        }

        let data = safetensors::serialize(views, &None)
            .map_err(|e| EvalError::checkpoint(path, format!("serialization failed: {}", e)))?;
        fs::write(path, data)
            .map_err(|e| EvalError::checkpoint(path, format!("cannot write file: {}", e)))
    }

    /// Adds or replaces a tensor. Fails if the value count does not match the shape.
    pub fn insert(&mut self, name: impl Into<String>, shape: Vec<usize>, values: Vec<f32>) -> Result<()> {
        let name = name.into();
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(EvalError::Shape(format!(
                "tensor {} has shape {:?} ({} values) but {} values were given",
                name,
                shape,
                expected,
                values.len()
            )));
        }
        self.tensors.insert(name, TensorData { shape, values });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TensorData> {
        self.tensors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

fn decode_values(view: &TensorView<'_>) -> Option<Vec<f32>> {
    let data = view.data();
    match view.dtype() {
        Dtype::F32 => Some(
            data.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        ),
        Dtype::F64 => Some(
            data.chunks_exact(8)
                .map(|b| {
                    f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
                })
                .collect(),
        ),
        _ => None,
    }
}
