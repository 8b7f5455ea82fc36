//! Linear evaluation of frozen visual backbones
//!
//! Features are extracted once per split from a pretrained network whose weights never
//! change, and a multinomial logistic regression is fit on top. The regularisation
//! strength is chosen on a held-out validation split, then the classifier is refit on
//! train+validation and scored on the test split.
//!
//! # Modules
//!
//! - `layers`: Inference-only layers (Conv2D, BatchNorm, pooling) behind the `Layer` trait
//! - `backbone`: `FeatureExtractor` trait, ResNet trunk and safetensors checkpoints
//! - `data`: Datasets, transforms, deterministic splits and batched loaders
//! - `inference`: Feature matrices for a whole split
//! - `optimizers`: L-BFGS minimiser
//! - `classifier`: Logistic regression and scoring metrics
//! - `evaluation`: Hyperparameter search and the final fit
//! - `config`: Run configuration (JSON + validation)
//! - `utils`: RNG, activation helpers, logging setup
//! - `error`: Error type shared by the crate

pub mod backbone;
pub mod classifier;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod inference;
pub mod layers;
pub mod optimizers;
pub mod utils;

pub use error::{EvalError, Result};
