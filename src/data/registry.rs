//! Datasets available for linear evaluation
//!
//! Each entry records where the data lives, how many classes it has, which metric it is
//! scored with and how its native train/test partitions are opened. Sources that take a
//! train/test flag and sources that take a split name are distinguished by
//! [`SplitAccess`], fixed when the table is written.

use crate::classifier::Metric;
use crate::data::cifar::CifarDataset;
use crate::data::manifest::ImageManifestDataset;
use crate::data::Dataset;
use crate::error::{EvalError, Result};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub type FlagSplitOpen = fn(&Path, bool) -> Result<Arc<dyn Dataset>>;
pub type NamedSplitOpen = fn(&Path, &str) -> Result<Arc<dyn Dataset>>;

/// How a dataset source selects its native partition.
#[derive(Clone, Copy)]
pub enum SplitAccess {
    /// Constructor takes `train: bool`.
    FlagSplit(FlagSplitOpen),
    /// Constructor takes a split name (`"train"` / `"test"`).
    NamedSplit(NamedSplitOpen),
}

impl SplitAccess {
    pub fn open_train(&self, root: &Path) -> Result<Arc<dyn Dataset>> {
        match self {
            SplitAccess::FlagSplit(open) => open(root, true),
            SplitAccess::NamedSplit(open) => open(root, "train"),
        }
    }

    pub fn open_test(&self, root: &Path) -> Result<Arc<dyn Dataset>> {
        match self {
            SplitAccess::FlagSplit(open) => open(root, false),
            SplitAccess::NamedSplit(open) => open(root, "test"),
        }
    }
}

impl fmt::Debug for SplitAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitAccess::FlagSplit(_) => f.write_str("FlagSplit"),
            SplitAccess::NamedSplit(_) => f.write_str("NamedSplit"),
        }
    }
}

/// One registry row.
#[derive(Debug, Clone, Copy)]
pub struct DatasetSpec {
    pub name: &'static str,
    pub root: &'static str,
    pub num_classes: usize,
    pub metric: &'static str,
    pub access: SplitAccess,
}

impl DatasetSpec {
    pub fn metric(&self) -> Result<Metric> {
        self.metric.parse()
    }
}

pub const LINEAR_DATASETS: &[DatasetSpec] = &[
    DatasetSpec {
        name: "cifar10",
        root: "./data/CIFAR10",
        num_classes: 10,
        metric: "accuracy",
        access: SplitAccess::FlagSplit(CifarDataset::cifar10),
    },
    DatasetSpec {
        name: "cifar100",
        root: "./data/CIFAR100",
        num_classes: 100,
        metric: "accuracy",
        access: SplitAccess::FlagSplit(CifarDataset::cifar100),
    },
    DatasetSpec {
        name: "shenzhen_cxr",
        root: "./data/shenzhen_cxr",
        num_classes: 2,
        metric: "accuracy",
        access: SplitAccess::NamedSplit(ImageManifestDataset::open_split),
    },
    DatasetSpec {
        name: "montgomery_cxr",
        root: "./data/montgomery_cxr",
        num_classes: 2,
        metric: "accuracy",
        access: SplitAccess::NamedSplit(ImageManifestDataset::open_split),
    },
    DatasetSpec {
        name: "diabetic_retinopathy",
        root: "./data/diabetic_retinopathy",
        num_classes: 5,
        metric: "mean per-class accuracy",
        access: SplitAccess::NamedSplit(ImageManifestDataset::open_split),
    },
];

/// Finds a dataset by key.
///
/// # Errors
///
/// `EvalError::Configuration` listing the known keys when `name` is not registered.
pub fn lookup(name: &str) -> Result<&'static DatasetSpec> {
    LINEAR_DATASETS
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| {
            let known: Vec<&str> = LINEAR_DATASETS.iter().map(|spec| spec.name).collect();
            EvalError::config(format!(
                "unknown dataset '{}'. Must be one of: {}",
                name,
                known.join(", ")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_datasets() {
        let spec = lookup("diabetic_retinopathy").unwrap();
        assert_eq!(spec.num_classes, 5);
        assert_eq!(spec.metric().unwrap(), Metric::MeanPerClassAccuracy);
        assert!(matches!(lookup("cifar10").unwrap().access, SplitAccess::FlagSplit(_)));
        assert!(matches!(
            lookup("shenzhen_cxr").unwrap().access,
            SplitAccess::NamedSplit(_)
        ));
    }

    #[test]
    fn test_lookup_unknown_dataset() {
        let err = lookup("imagenet").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("cifar100"));
    }

    #[test]
    fn test_every_registered_metric_parses() {
        for spec in LINEAR_DATASETS {
            assert!(spec.metric().is_ok(), "{}", spec.name);
        }
    }
}
