//! Limited-memory BFGS
//!
//! The search direction is the two-loop recursion over the last `memory` curvature pairs
//! `(s, y)`; the step length comes from backtracking until the Armijo condition holds:
//!
//! ```text
//! f(x + α d) <= f(x) + c1 · α · ∇f(x)ᵀ d
//! ```
//!
//! Iteration stops when `max |∇f| <= gtol`, when the relative decrease
//! `(f_k - f_{k+1}) / max(|f_k|, |f_{k+1}|, 1)` drops to `ftol`, or after `max_iter` steps.
//!
//! # Reference
//!
//! Nocedal, J. (1980). Updating Quasi-Newton Matrices with Limited Storage.
//! Mathematics of Computation, 35(151).

use crate::optimizers::Objective;
use std::collections::VecDeque;

const ARMIJO_C1: f64 = 1e-4;
const MAX_LINE_SEARCH_STEPS: usize = 40;
const CURVATURE_EPS: f64 = 1e-10;

/// Solver settings.
///
/// # Fields
///
/// * `memory` - Number of curvature pairs kept (10)
/// * `max_iter` - Iteration limit (100)
/// * `gtol` - Projected gradient tolerance (1e-4)
/// * `ftol` - Relative decrease tolerance (2.22e-9)
#[derive(Debug, Clone, PartialEq)]
pub struct Lbfgs {
    pub memory: usize,
    pub max_iter: usize,
    pub gtol: f64,
    pub ftol: f64,
}

impl Default for Lbfgs {
    fn default() -> Self {
        Self {
            memory: 10,
            max_iter: 100,
            gtol: 1e-4,
            ftol: 2.220_446_049_250_313e-9,
        }
    }
}

/// Result of [`Lbfgs::minimize`]. `converged` is false when the iteration limit was hit
/// or the line search could not make progress; `params` is still the best point found.
#[derive(Debug, Clone)]
pub struct Minimum {
    pub params: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

struct CurvaturePair {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()))
}

impl Lbfgs {
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }

    /// Minimises `objective` starting from `initial`.
    ///
    /// # Panics
    ///
    /// Panics if `initial.len()` differs from `objective.dimension()`.
    pub fn minimize<O: Objective + ?Sized>(&self, objective: &O, initial: Vec<f64>) -> Minimum {
        let n = objective.dimension();
        assert_eq!(initial.len(), n, "initial point has wrong dimension");

        let mut x = initial;
        let mut grad = vec![0.0f64; n];
        let mut value = objective.evaluate(&x, &mut grad);
        let mut history: VecDeque<CurvaturePair> = VecDeque::with_capacity(self.memory);
        let mut iterations = 0;

        let mut direction = vec![0.0f64; n];
        let mut x_next = vec![0.0f64; n];
        let mut grad_next = vec![0.0f64; n];

        while value.is_finite() {
            if max_abs(&grad) <= self.gtol {
                return Minimum {
                    params: x,
                    value,
                    iterations,
                    converged: true,
                };
            }
            if iterations >= self.max_iter {
                break;
            }

            self.search_direction(&grad, &history, &mut direction);
            let mut slope = dot(&direction, &grad);
            if slope >= 0.0 {
                // Curvature estimate went bad; restart from steepest descent.
                history.clear();
                for (d, g) in direction.iter_mut().zip(&grad) {
                    *d = -g;
                }
                slope = -dot(&grad, &grad);
            }

            let mut step = if history.is_empty() {
                (1.0 / dot(&grad, &grad).sqrt()).min(1.0)
            } else {
                1.0
            };
            let mut accepted = None;
            for _ in 0..MAX_LINE_SEARCH_STEPS {
                for ((xn, xi), d) in x_next.iter_mut().zip(&x).zip(&direction) {
                    *xn = xi + step * d;
                }
                let candidate = objective.evaluate(&x_next, &mut grad_next);
                if candidate.is_finite() && candidate <= value + ARMIJO_C1 * step * slope {
                    accepted = Some(candidate);
                    break;
                }
                step *= 0.5;
            }
            let Some(value_next) = accepted else {
                break;
            };
            iterations += 1;

            let s: Vec<f64> = x_next.iter().zip(&x).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = grad_next.iter().zip(&grad).map(|(a, b)| a - b).collect();
            let sy = dot(&s, &y);
            if sy > CURVATURE_EPS {
                if history.len() == self.memory {
                    history.pop_front();
                }
                history.push_back(CurvaturePair { s, y, rho: 1.0 / sy });
            }

            let decrease = (value - value_next) / value.abs().max(value_next.abs()).max(1.0);
            std::mem::swap(&mut x, &mut x_next);
            std::mem::swap(&mut grad, &mut grad_next);
            value = value_next;

            if decrease <= self.ftol {
                return Minimum {
                    params: x,
                    value,
                    iterations,
                    converged: true,
                };
            }
        }

        Minimum {
            params: x,
            value,
            iterations,
            converged: false,
        }
    }

    /// Two-loop recursion: `direction = -H·grad`.
    fn search_direction(
        &self,
        grad: &[f64],
        history: &VecDeque<CurvaturePair>,
        direction: &mut [f64],
    ) {
        for (d, g) in direction.iter_mut().zip(grad) {
            *d = -g;
        }
        if self.memory == 0 || history.is_empty() {
            return;
        }

        let mut alphas = Vec::with_capacity(history.len());
        for pair in history.iter().rev() {
            let alpha = pair.rho * dot(&pair.s, direction);
            for (d, y) in direction.iter_mut().zip(&pair.y) {
                *d -= alpha * y;
            }
            alphas.push(alpha);
        }

        if let Some(last) = history.back() {
            let gamma = 1.0 / (last.rho * dot(&last.y, &last.y));
            for d in direction.iter_mut() {
                *d *= gamma;
            }
        }

        for (pair, alpha) in history.iter().zip(alphas.iter().rev()) {
            let beta = pair.rho * dot(&pair.y, direction);
            for (d, s) in direction.iter_mut().zip(&pair.s) {
                *d += (alpha - beta) * s;
            }
        }
    }
}
