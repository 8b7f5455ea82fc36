//! Layer abstractions for the frozen backbone
//!
//! This module provides the Layer trait and the inference-only layers needed to run
//! a ResNet trunk: convolution, batch normalization and pooling.

mod r#trait;
pub mod batchnorm;
pub mod conv2d;
pub mod pooling;

pub use batchnorm::BatchNorm2DLayer;
pub use conv2d::Conv2DLayer;
pub use pooling::{GlobalAvgPool, MaxPool2DLayer};
pub use r#trait::Layer;
