//! Deterministic solvers for smooth objectives
//!
//! The linear classifier is fit by minimising a convex loss over all of its coefficients
//! at once, so instead of per-step update rules this module exposes a full minimiser.
//!
//! # Overview
//!
//! An [`Objective`] reports its value and gradient at a point. [`Lbfgs`] repeatedly
//! evaluates it, building a low-rank curvature estimate from recent steps, until the
//! gradient or the relative decrease falls below tolerance.
//!
//! # Example
//!
//! ```
//! use linear_eval::optimizers::{Lbfgs, Objective};
//!
//! struct Bowl;
//!
//! impl Objective for Bowl {
//!     fn dimension(&self) -> usize {
//!         2
//!     }
//!
//!     fn evaluate(&self, x: &[f64], grad: &mut [f64]) -> f64 {
//!         grad[0] = 2.0 * (x[0] - 1.0);
//!         grad[1] = 2.0 * (x[1] + 2.0);
//!         (x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2)
//!     }
//! }
//!
//! let minimum = Lbfgs::default().minimize(&Bowl, vec![0.0, 0.0]);
//! assert!(minimum.converged);
//! assert!((minimum.params[0] - 1.0).abs() < 1e-4);
//! ```

pub mod lbfgs;

pub use lbfgs::{Lbfgs, Minimum};

/// Smooth function to be minimised.
///
/// # Notes
///
/// - `evaluate` must fill `grad` completely; the solver never zeroes it first
/// - Returning a non-finite value tells the line search to shorten its step
pub trait Objective {
    /// Number of free parameters.
    fn dimension(&self) -> usize;

    /// Returns `f(params)` and writes `∇f(params)` into `grad`.
    fn evaluate(&self, params: &[f64], grad: &mut [f64]) -> f64;
}
