//! Multinomial logistic regression
//!
//! Minimises the mean softmax cross-entropy plus an L2 penalty on the coefficients:
//!
//! ```text
//! L(W, b) = 1/n Σ_i [ logsumexp(W x_i + b) - (W x_i + b)_{y_i} ] + ‖W‖² / (2 · C · n)
//! ```
//!
//! The intercepts `b` are not penalised. Larger `C` means weaker regularisation.

use crate::classifier::Metric;
use crate::error::{EvalError, Result};
use crate::optimizers::{Lbfgs, Objective};
use crate::utils::{log_sum_exp, softmax_rows};
use ndarray::{aview1, Array1, Array2, ArrayView2, Axis};
use tracing::debug;

/// Coefficients learned by the last fit.
#[derive(Debug, Clone)]
struct FittedState {
    classes: Vec<usize>,
    coef: Array2<f64>,
    intercept: Array1<f64>,
}

impl FittedState {
    fn flatten(&self) -> Vec<f64> {
        self.coef.iter().chain(self.intercept.iter()).copied().collect()
    }
}

/// Softmax cross-entropy over a fixed design matrix.
struct SoftmaxLoss<'a> {
    x: ArrayView2<'a, f64>,
    targets: &'a [usize],
    num_classes: usize,
    l2: f64,
}

impl SoftmaxLoss<'_> {
    fn input_dim(&self) -> usize {
        self.x.ncols()
    }
}

impl Objective for SoftmaxLoss<'_> {
    fn dimension(&self) -> usize {
        self.num_classes * (self.input_dim() + 1)
    }

    fn evaluate(&self, params: &[f64], grad: &mut [f64]) -> f64 {
        let (k, d) = (self.num_classes, self.input_dim());
        let n = self.x.nrows();
        let (weights, bias) = params.split_at(k * d);
        // Row c of the (k, d) block holds the coefficients of class c.
        let Ok(w) = ArrayView2::from_shape((k, d), weights) else {
            return f64::NAN;
        };

        let mut logits = self.x.dot(&w.t());
        logits += &aview1(bias);

        // Turn logits into (softmax - one_hot) in place while accumulating the loss.
        let mut loss = 0.0;
        for (mut row, &target) in logits.rows_mut().into_iter().zip(self.targets) {
            let lse = match row.as_slice() {
                Some(values) => log_sum_exp(values),
                None => log_sum_exp(&row.to_vec()),
            };
            loss += lse - row[target];
            row.mapv_inplace(|v| (v - lse).exp());
            row[target] -= 1.0;
        }
        let inv_n = 1.0 / n as f64;
        let penalty: f64 = weights.iter().map(|w| w * w).sum();

        let (grad_w, grad_b) = grad.split_at_mut(k * d);
        let g = logits.t().dot(&self.x);
        for ((out, gi), wi) in grad_w.iter_mut().zip(g.iter()).zip(weights) {
            *out = gi * inv_n + self.l2 * wi;
        }
        for (out, sum) in grad_b.iter_mut().zip(logits.sum_axis(Axis(0)).iter()) {
            *out = sum * inv_n;
        }

        loss * inv_n + 0.5 * self.l2 * penalty
    }
}

/// Multinomial logistic regression with a selectable scoring metric.
///
/// # Fields
///
/// * `input_dim` - Feature dimension
/// * `num_classes` - Labels must lie in `0..num_classes`
/// * `metric` - Score returned by `fit_and_score`, fixed at construction
/// * `c` - Inverse regularisation strength
/// * `warm_start` - Reuse the previous solution as the starting point of the next fit
///
/// # Example
///
/// ```
/// use linear_eval::classifier::{LogisticRegression, Metric};
/// use ndarray::array;
///
/// let mut clf = LogisticRegression::new(1, 2, Metric::Accuracy);
/// clf.set_params(10.0).unwrap();
/// let x = array![[-2.0f32], [-1.0], [1.0], [2.0]];
/// let score = clf.fit_and_score(&x, &[0, 0, 1, 1], &x, &[0, 0, 1, 1]).unwrap();
/// assert_eq!(score, 100.0);
/// ```
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    input_dim: usize,
    num_classes: usize,
    metric: Metric,
    c: f64,
    warm_start: bool,
    solver: Lbfgs,
    state: Option<FittedState>,
}

impl LogisticRegression {
    pub fn new(input_dim: usize, num_classes: usize, metric: Metric) -> Self {
        Self {
            input_dim,
            num_classes,
            metric,
            c: 1.0,
            warm_start: true,
            solver: Lbfgs::default(),
            state: None,
        }
    }

    /// Like [`LogisticRegression::new`] with the metric given by name.
    ///
    /// # Errors
    ///
    /// `EvalError::Configuration` for an unsupported metric name.
    pub fn from_metric_name(input_dim: usize, num_classes: usize, metric: &str) -> Result<Self> {
        Ok(Self::new(input_dim, num_classes, metric.parse()?))
    }

    pub fn with_warm_start(mut self, warm_start: bool) -> Self {
        self.warm_start = warm_start;
        self
    }

    pub fn with_solver(mut self, solver: Lbfgs) -> Self {
        self.solver = solver;
        self
    }

    /// Sets `C` for the next fit. Already fitted coefficients are kept.
    pub fn set_params(&mut self, c: f64) -> Result<()> {
        if !(c.is_finite() && c > 0.0) {
            return Err(EvalError::config(format!("C must be positive and finite, got {}", c)));
        }
        self.c = c;
        Ok(())
    }

    pub fn c(&self) -> f64 {
        self.c
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Classes seen by the last fit, sorted.
    pub fn classes(&self) -> Option<&[usize]> {
        self.state.as_ref().map(|s| s.classes.as_slice())
    }

    fn check_features(&self, x: &Array2<f32>) -> Result<()> {
        if x.ncols() != self.input_dim {
            return Err(EvalError::Shape(format!(
                "classifier expects {} features, got {}",
                self.input_dim,
                x.ncols()
            )));
        }
        Ok(())
    }

    /// Fits on `(x, y)`; one row of `x` per label.
    ///
    /// # Errors
    ///
    /// - `EvalError::Shape` if rows and labels disagree or the feature width is wrong
    /// - `EvalError::Fit` if a label is out of range or fewer than two classes are present
    pub fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<()> {
        self.check_features(x)?;
        if x.nrows() != y.len() {
            return Err(EvalError::Shape(format!(
                "{} feature rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        if let Some(&bad) = y.iter().find(|&&label| label >= self.num_classes) {
            return Err(EvalError::Fit(format!(
                "label {} is outside 0..{}",
                bad, self.num_classes
            )));
        }

        let mut classes = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(EvalError::Fit(format!(
                "needs samples of at least 2 classes, got {}",
                classes.len()
            )));
        }

        let targets: Vec<usize> = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or_default())
            .collect();
        let x64 = x.mapv(f64::from);
        let loss = SoftmaxLoss {
            x: x64.view(),
            targets: &targets,
            num_classes: classes.len(),
            l2: 1.0 / (self.c * y.len() as f64),
        };

        let initial = match &self.state {
            Some(state) if self.warm_start && state.classes == classes => state.flatten(),
            _ => vec![0.0; loss.dimension()],
        };
        let minimum = self.solver.minimize(&loss, initial);
        if !minimum.converged {
            debug!(
                c = self.c,
                iterations = minimum.iterations,
                "lbfgs did not converge, using last iterate"
            );
        }

        let k = classes.len();
        let (weights, bias) = minimum.params.split_at(k * self.input_dim);
        let coef = Array2::from_shape_fn((k, self.input_dim), |(c, j)| weights[c * self.input_dim + j]);
        self.state = Some(FittedState {
            classes,
            coef,
            intercept: Array1::from(bias.to_vec()),
        });
        debug!(c = self.c, loss = minimum.value, iterations = minimum.iterations, "fit done");
        Ok(())
    }

    fn fitted(&self) -> Result<&FittedState> {
        self.state
            .as_ref()
            .ok_or_else(|| EvalError::Fit("classifier used before fit".into()))
    }

    /// Linear scores `x Wᵀ + b`, one column per fitted class.
    pub fn decision_function(&self, x: &Array2<f32>) -> Result<Array2<f64>> {
        let state = self.fitted()?;
        self.check_features(x)?;
        Ok(x.mapv(f64::from).dot(&state.coef.t()) + &state.intercept)
    }

    /// Class probabilities, columns ordered like [`LogisticRegression::classes`].
    pub fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f64>> {
        let mut scores = self.decision_function(x)?;
        let (rows, cols) = scores.dim();
        match scores.as_slice_mut() {
            Some(values) => softmax_rows(values, rows, cols),
            None => return Err(EvalError::Shape("score matrix is not contiguous".into())),
        }
        Ok(scores)
    }

    /// Arg-max class per row (lowest class on ties).
    pub fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        let state = self.fitted()?;
        let scores = self.decision_function(x)?;
        Ok(scores
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (i, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = i;
                    }
                }
                state.classes[best]
            })
            .collect())
    }

    /// Fits on the training set and scores predictions on the test set with the bound metric.
    pub fn fit_and_score(
        &mut self,
        x_train: &Array2<f32>,
        y_train: &[usize],
        x_test: &Array2<f32>,
        y_test: &[usize],
    ) -> Result<f64> {
        self.fit(x_train, y_train)?;
        let predictions = self.predict(x_test)?;
        self.metric.score(y_test, &predictions)
    }
}
