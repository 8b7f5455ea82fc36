//! Shared utilities
//!
//! This module provides common utilities like random number generation,
//! activation functions and logging setup used across the crate.

pub mod activations;
pub mod logging;
pub mod rng;

pub use activations::{log_sum_exp, relu_inplace, softmax_rows};
pub use rng::SimpleRng;
