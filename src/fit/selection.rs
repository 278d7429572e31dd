//! Fit several catalog models to one series and rank them by BIC.
//!
//! For each model we compute:
//! - the weighted chi-square and reduced chi-square
//! - BIC = n * ln(χ²/n) + k * ln(n)
//!
//! Ranking rules:
//! 1. Failed fits are listed separately with their reason
//! 2. Successful fits are sorted by BIC, lowest first
//! 3. The preferred model is the one with the fewest free parameters among
//!    those within ΔBIC < 2 of the best

use rayon::prelude::*;

use crate::domain::{FitFailure, FitOutcome, FitResult, SampleSeries};
use crate::fit::fitter::{fit_model, FitOptions};
use crate::models::ModelDescriptor;

const DELTA_BIC_TIE: f64 = 2.0;

/// Output of fitting several models to the same data.
#[derive(Debug, Clone)]
pub struct ModelComparison {
    /// Successful fits, best BIC first.
    pub fits: Vec<FitResult>,
    pub failures: Vec<FitFailure>,
}

impl ModelComparison {
    pub fn best(&self) -> Option<&FitResult> {
        self.fits.first()
    }

    /// Simplest model statistically indistinguishable from the best.
    pub fn preferred(&self) -> Option<&FitResult> {
        let best = self.best()?;
        self.fits
            .iter()
            .filter(|f| f.quality.bic - best.quality.bic < DELTA_BIC_TIE)
            .min_by(|a, b| {
                a.quality
                    .n_free
                    .cmp(&b.quality.n_free)
                    .then(a.quality.bic.total_cmp(&b.quality.bic))
            })
    }
}

/// Fit every model in `models` to `series`.
///
/// Fits are independent and run in parallel; input order is kept for ties.
pub fn compare_models(models: &[ModelDescriptor], series: &SampleSeries, opts: &FitOptions) -> ModelComparison {
    let outcomes: Vec<FitOutcome> = models.par_iter().map(|m| fit_model(m, series, opts)).collect();

    let mut fits = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            FitOutcome::Success(fit) => fits.push(fit),
            FitOutcome::Failure(failure) => failures.push(failure),
        }
    }
    fits.sort_by(|a, b| a.quality.bic.total_cmp(&b.quality.bic));

    ModelComparison { fits, failures }
}
