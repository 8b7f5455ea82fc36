//! Linear evaluation protocol
//!
//! ```text
//! Init -> FeaturizeVal -> Search -> Selected -> FeaturizeTest -> FinalFit -> Done
//!    \________________ use_fixed_c ____/
//! ```
//!
//! The regularisation strength is tuned on the train/validation split (or supplied
//! directly), then the classifier is refit on train+validation and scored on the test set.

use crate::backbone::FeatureExtractor;
use crate::classifier::LogisticRegression;
use crate::data::SplitLoaders;
use crate::error::{EvalError, Result};
use crate::inference::extract_features;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use tracing::{debug, info};

/// Exponents of the default weight-decay grid, `10^-6 ..= 10^5`.
pub const WD_EXPONENTS: (f64, f64) = (-6.0, 5.0);

/// Default number of weight-decay candidates.
pub const DEFAULT_WD_VALUES: usize = 10;

/// `count` weight-decay values log-spaced over [`WD_EXPONENTS`], increasing.
///
/// # Examples
///
/// ```
/// use linear_eval::evaluation::wd_range;
/// let grid = wd_range(12).unwrap();
/// assert!((grid[0] - 1e-6).abs() < 1e-18);
/// assert!((grid[11] - 1e5).abs() < 1e-6);
/// ```
pub fn wd_range(count: usize) -> Result<Vec<f64>> {
    if count == 0 {
        return Err(EvalError::config("the number of weight decay values must be positive"));
    }
    let (start, end) = WD_EXPONENTS;
    if count == 1 {
        return Ok(vec![10f64.powf(start)]);
    }
    let step = (end - start) / (count - 1) as f64;
    Ok((0..count)
        .map(|i| 10f64.powf(start + step * i as f64))
        .collect())
}

fn check_candidates(wd_values: &[f64]) -> Result<()> {
    if wd_values.is_empty() {
        return Err(EvalError::config("at least one weight decay value is required"));
    }
    if let Some(bad) = wd_values.iter().find(|wd| !(wd.is_finite() && **wd > 0.0)) {
        return Err(EvalError::config(format!(
            "weight decay values must be positive and finite, got {}",
            bad
        )));
    }
    Ok(())
}

/// Winner of a hyperparameter search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub wd: f64,
    pub c: f64,
    pub score: f64,
}

/// Scores `C = 1 / wd` for every candidate in order and keeps the first strict maximum.
///
/// A later candidate only replaces the current best when its score is strictly greater,
/// so ties go to the earliest candidate.
pub fn select_best<F>(wd_values: &[f64], mut score_fn: F) -> Result<Selection>
where
    F: FnMut(f64) -> Result<f64>,
{
    check_candidates(wd_values)?;

    let bar = ProgressBar::new(wd_values.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message("Selecting best hyperparameters");

    let mut best: Option<Selection> = None;
    let mut best_score = f64::NEG_INFINITY;
    for &wd in wd_values {
        let c = 1.0 / wd;
        let score = score_fn(c)?;
        debug!(wd, c, score, "scored candidate");
        if score > best_score {
            best_score = score;
            best = Some(Selection { wd, c, score });
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    best.ok_or_else(|| EvalError::Fit("no candidate produced a comparable score".into()))
}

/// Regularisation strength chosen for the final fit. Written exactly once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BestParams {
    c: Option<f64>,
}

impl BestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, c: f64) -> Result<()> {
        if let Some(existing) = self.c {
            return Err(EvalError::Phase(format!(
                "C was already selected ({}), refusing to overwrite with {}",
                existing, c
            )));
        }
        self.c = Some(c);
        Ok(())
    }

    /// The selected C.
    ///
    /// # Errors
    ///
    /// `EvalError::NotSelected` before search or injection.
    pub fn c(&self) -> Result<f64> {
        self.c.ok_or(EvalError::NotSelected)
    }

    pub fn is_set(&self) -> bool {
        self.c.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    FeaturizeVal,
    Search,
    Selected,
    FeaturizeTest,
    FinalFit,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::FeaturizeVal => "featurize-val",
            Phase::Search => "search",
            Phase::Selected => "selected",
            Phase::FeaturizeTest => "featurize-test",
            Phase::FinalFit => "final-fit",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Output of a completed evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationResult {
    pub score: f64,
    pub c: f64,
}

/// The durable result line written to stdout and the run log.
pub fn final_report_line(model: &str, dataset: &str, result: &EvaluationResult) -> String {
    format!(
        "Final accuracy for {} on {}: {:.2}% using hyperparameter C: {:.3}",
        model, dataset, result.score, result.c
    )
}

/// Drives one linear evaluation of a frozen extractor.
pub struct LinearTester<E> {
    extractor: E,
    loaders: SplitLoaders,
    classifier: LogisticRegression,
    wd_values: Vec<f64>,
    best_params: BestParams,
    phase: Phase,
}

impl<E: FeatureExtractor> LinearTester<E> {
    /// # Errors
    ///
    /// `EvalError::Configuration` for an unsupported metric or an invalid candidate list.
    pub fn new(
        extractor: E,
        loaders: SplitLoaders,
        num_classes: usize,
        metric: &str,
        wd_values: Vec<f64>,
    ) -> Result<Self> {
        check_candidates(&wd_values)?;
        let classifier =
            LogisticRegression::from_metric_name(extractor.feature_dim(), num_classes, metric)?;
        Ok(Self {
            extractor,
            loaders,
            classifier,
            wd_values,
            best_params: BestParams::new(),
            phase: Phase::Init,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn best_params(&self) -> &BestParams {
        &self.best_params
    }

    pub fn wd_values(&self) -> &[f64] {
        &self.wd_values
    }

    fn expect_phase(&self, expected: Phase, operation: &str) -> Result<()> {
        if self.phase != expected {
            return Err(EvalError::Phase(format!(
                "{} requires phase {}, current phase is {}",
                operation, expected, self.phase
            )));
        }
        Ok(())
    }

    /// Tunes C on the validation split.
    pub fn validate(&mut self) -> Result<Selection> {
        self.expect_phase(Phase::Init, "validate")?;

        self.phase = Phase::FeaturizeVal;
        let train = extract_features(&self.loaders.train, &self.extractor, "train")?;
        let valid = extract_features(&self.loaders.valid, &self.extractor, "val")?;

        self.phase = Phase::Search;
        let classifier = &mut self.classifier;
        let selection = select_best(&self.wd_values, |c| {
            classifier.set_params(c)?;
            classifier.fit_and_score(train.features(), train.labels(), valid.features(), valid.labels())
        })?;

        self.best_params.set(selection.c)?;
        self.phase = Phase::Selected;
        info!(
            c = selection.c,
            wd = selection.wd,
            score = selection.score,
            "Selected hyperparameters on validation set"
        );
        Ok(selection)
    }

    /// Skips the search and uses `c` for the final fit.
    pub fn use_fixed_c(&mut self, c: f64) -> Result<()> {
        self.expect_phase(Phase::Init, "use_fixed_c")?;
        self.classifier.set_params(c)?;
        self.best_params.set(c)?;
        self.phase = Phase::Selected;
        info!(c, "Using supplied hyperparameter");
        Ok(())
    }

    /// Refits on train+validation with the selected C and scores the test split.
    pub fn evaluate(&mut self) -> Result<EvaluationResult> {
        self.expect_phase(Phase::Selected, "evaluate")?;
        let c = self.best_params.c()?;
        info!(c, "Best hyperparameters");

        self.phase = Phase::FeaturizeTest;
        let trainval = extract_features(&self.loaders.trainval, &self.extractor, "train")?;
        let test = extract_features(&self.loaders.test, &self.extractor, "test")?;

        self.phase = Phase::FinalFit;
        self.classifier.set_params(c)?;
        let score = self.classifier.fit_and_score(
            trainval.features(),
            trainval.labels(),
            test.features(),
            test.labels(),
        )?;

        self.phase = Phase::Done;
        Ok(EvaluationResult { score, c })
    }
}
