//! Image folders described by a CSV manifest
//!
//! A split named `train` lives in `<root>/train.csv`; every row is `relative/path.png,label`.
//! A first row whose label column is not an integer is treated as a header.

use crate::data::{Dataset, RawSample};
use crate::error::{EvalError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct ImageManifestDataset {
    root: PathBuf,
    entries: Vec<(PathBuf, usize)>,
}

impl ImageManifestDataset {
    /// Location of the manifest for `split` under `root`.
    pub fn manifest_path(root: &Path, split: &str) -> PathBuf {
        root.join(format!("{}.csv", split))
    }

    /// Reads the manifest of `split`. Images are decoded lazily by [`Dataset::get`].
    pub fn open(root: &Path, split: &str) -> Result<Self> {
        let path = Self::manifest_path(root, split);
        let contents = fs::read_to_string(&path).map_err(|e| EvalError::data_access(&path, e))?;

        let mut entries = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (file, label) = line.rsplit_once(',').ok_or_else(|| {
                EvalError::MalformedData(format!(
                    "{}:{}: expected `path,label`",
                    path.display(),
                    line_no + 1
                ))
            })?;
            match label.trim().parse::<usize>() {
                Ok(label) => entries.push((PathBuf::from(file.trim()), label)),
                Err(_) if line_no == 0 => continue,
                Err(_) => {
                    return Err(EvalError::MalformedData(format!(
                        "{}:{}: invalid label {:?}",
                        path.display(),
                        line_no + 1,
                        label.trim()
                    )))
                }
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    pub fn open_split(root: &Path, split: &str) -> Result<Arc<dyn Dataset>> {
        Ok(Arc::new(Self::open(root, split)?))
    }
}

impl Dataset for ImageManifestDataset {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, index: usize) -> Result<RawSample> {
        let (file, label) = self.entries.get(index).ok_or_else(|| {
            EvalError::MalformedData(format!(
                "index {} out of range for {} samples",
                index,
                self.entries.len()
            ))
        })?;
        let path = self.root.join(file);
        let image = image::open(&path).map_err(|source| EvalError::Image { path, source })?;
        Ok(RawSample {
            image,
            label: *label,
        })
    }
}
