//! Bounded nonlinear least-squares fit of one model to one flow curve.
//!
//! Given:
//! - shear rates `x_i` and stresses `y_i`
//! - an immutable `ModelDescriptor` (function, starts, bounds, fixed flags)
//! - a weighting policy
//!
//! we minimize `Σ (w_i (f(x_i; p) - y_i))²` over the free parameters with the
//! bounded Levenberg-Marquardt solver, then estimate standard errors from the
//! covariance at the optimum.
//!
//! Nothing here panics or returns an error for a bad sample: every problem is
//! reported as a `FitFailure` with a reason code so batch callers can move on.

use crate::domain::{
    FailureReason, FitFailure, FitOutcome, FitQuality, FitResult, ParameterEstimate, SampleSeries,
    Weighting,
};
use crate::math::lm::{self, Interval, LmError, LmSettings};
use crate::models::ModelDescriptor;

/// Options that affect how each model is calibrated.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub weighting: Weighting,
    pub max_iterations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            weighting: Weighting::Relative,
            max_iterations: 200,
        }
    }
}

impl FitOptions {
    /// Defaults of the HB + TC flow-curve analysis: unweighted residuals, so
    /// points with zero stress stay usable.
    pub fn flow_curve() -> Self {
        Self {
            weighting: Weighting::Uniform,
            ..Self::default()
        }
    }
}

/// Fit `model` to `series`.
pub fn fit_model(model: &ModelDescriptor, series: &SampleSeries, opts: &FitOptions) -> FitOutcome {
    let kind = model.kind();
    let fail = |reason: FailureReason, detail: String| {
        FitOutcome::Failure(FitFailure {
            model: kind,
            reason,
            detail,
        })
    };

    let n = series.len();
    if n == 0 {
        return fail(FailureReason::NoData, String::new());
    }
    if series.points().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return fail(FailureReason::NonFiniteInput, String::new());
    }

    let free: Vec<usize> = (0..model.params().len()).filter(|&k| !model.params()[k].fixed).collect();
    let p = free.len();
    if n <= p {
        return fail(
            FailureReason::TooFewPoints,
            format!("{n} points for {p} free parameters"),
        );
    }

    let weights: Vec<f64> = match opts.weighting {
        Weighting::Relative => {
            if let Some(y) = series.stress.iter().find(|&&y| y <= 0.0) {
                return fail(FailureReason::NonPositiveStress, format!("stress {y}"));
            }
            series.stress.iter().map(|y| 1.0 / y).collect()
        }
        Weighting::Uniform => {
            if series.stress.iter().all(|&y| y <= 0.0) {
                return fail(FailureReason::NonPositiveStress, "no positive stress".to_string());
            }
            vec![1.0; n]
        }
    };

    let base = model.defaults();
    let expand = |free_values: &[f64]| -> Vec<f64> {
        let mut full = base.clone();
        for (&k, &v) in free.iter().zip(free_values) {
            full[k] = v;
        }
        full
    };
    let residual = |free_values: &[f64]| -> Vec<f64> {
        let full = expand(free_values);
        series
            .points()
            .zip(&weights)
            .map(|((x, y), w)| (model.predict(x, &full) - y) * w)
            .collect()
    };

    let start: Vec<f64> = free.iter().map(|&k| base[k]).collect();
    let bounds: Vec<Interval> = free.iter().map(|&k| model.params()[k].bounds).collect();
    let settings = LmSettings {
        max_iterations: opts.max_iterations,
        ..LmSettings::default()
    };

    let report = match lm::minimize(&residual, &start, &bounds, &settings) {
        Ok(r) => r,
        Err(LmError::NoConvergence { iterations }) => {
            return fail(
                FailureReason::NoConvergence,
                format!("stopped after {iterations} evaluations"),
            );
        }
        Err(err) => return fail(FailureReason::NonFiniteModel, err.to_string()),
    };

    let cov = if p == 0 {
        None
    } else {
        match lm::covariance(&residual, &report.params, &bounds, report.cost) {
            Some(c) => Some(c),
            None => return fail(FailureReason::SingularCovariance, String::new()),
        }
    };

    let values = expand(&report.params);
    let mut params = Vec::with_capacity(values.len());
    let mut hit_bounds = false;
    for (k, spec) in model.params().iter().enumerate() {
        let slot = free.iter().position(|&f| f == k);
        let at_bound = slot.is_some() && spec.bounds.touches(values[k]);
        hit_bounds |= at_bound;
        params.push(ParameterEstimate {
            name: spec.name.to_string(),
            value: values[k],
            stderr: match (slot, &cov) {
                (Some(s), Some(c)) => Some(c[(s, s)].sqrt()),
                _ => None,
            },
            fixed: spec.fixed,
            at_bound,
        });
    }

    let quality = quality_metrics(n, p, report.cost, report.iterations, report.nfev);
    tracing::debug!(
        model = %kind,
        nfev = quality.nfev,
        redchi = quality.redchi,
        "fit converged"
    );

    FitOutcome::Success(FitResult {
        model: kind,
        params,
        covariance: cov.map(|c| c.row_iter().map(|row| row.iter().copied().collect()).collect()),
        quality,
        weighting: opts.weighting,
        hit_bounds,
    })
}

/// Evaluate a fitted model on a grid of shear rates.
pub fn evaluate(fit: &FitResult, grid: &[f64]) -> Vec<(f64, f64)> {
    let values = fit.values();
    grid.iter()
        .map(|&x| (x, crate::models::predict(fit.model, x, &values)))
        .collect()
}

fn quality_metrics(n: usize, p: usize, chisqr: f64, iterations: usize, nfev: usize) -> FitQuality {
    let nf = n as f64;
    let neg2_log_likelihood = nf * (chisqr.max(1e-250) / nf).ln();
    FitQuality {
        n,
        n_free: p,
        iterations,
        nfev,
        chisqr,
        redchi: chisqr / (n - p) as f64,
        aic: neg2_log_likelihood + 2.0 * p as f64,
        bic: neg2_log_likelihood + nf.ln() * p as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelKind;
    use crate::fit::log_space;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn hb_series(noise: f64, seed: u64) -> SampleSeries {
        let xs = log_space(1e-2, 1e2, 30).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let ys = xs
            .iter()
            .map(|&x| {
                let clean = 5.0 + 2.0 * x.sqrt();
                clean * (1.0 + noise * normal.sample(&mut rng))
            })
            .collect();
        SampleSeries::new("hb", xs, ys)
    }

    fn fit_hb(series: &SampleSeries) -> FitResult {
        let outcome = fit_model(&ModelKind::Hb.descriptor(), series, &FitOptions::default());
        outcome.into_result().unwrap()
    }

    #[test]
    fn recovers_herschel_bulkley_parameters() {
        let fit = fit_hb(&hb_series(0.01, 42));
        let ys = fit.value("ystress").unwrap();
        let k = fit.value("K").unwrap();
        let n = fit.value("n").unwrap();
        assert!((ys - 5.0).abs() / 5.0 < 0.05, "ystress {ys}");
        assert!((k - 2.0).abs() / 2.0 < 0.05, "K {k}");
        assert!((n - 0.5).abs() / 0.5 < 0.05, "n {n}");
        assert!(fit.params.iter().all(|p| p.stderr.is_some()));
        assert!(!fit.hit_bounds);
    }

    #[test]
    fn standard_errors_shrink_with_noise() {
        let loud = fit_hb(&hb_series(0.02, 3));
        let quiet = fit_hb(&hb_series(0.002, 3));
        for name in ["ystress", "K", "n"] {
            assert!(
                quiet.stderr(name).unwrap() < loud.stderr(name).unwrap(),
                "{name}"
            );
        }
    }

    #[test]
    fn exact_linear_data_fits_bingham() {
        let xs: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 + 0.5 * x).collect();
        let series = SampleSeries::new("b", xs, ys);
        let opts = FitOptions {
            weighting: Weighting::Uniform,
            ..FitOptions::default()
        };
        let fit = fit_model(&ModelKind::Bingham.descriptor(), &series, &opts)
            .into_result()
            .unwrap();
        assert!((fit.value("ystress").unwrap() - 3.0).abs() < 1e-6);
        assert!((fit.value("eta_bg").unwrap() - 0.5).abs() < 1e-6);
        assert!(fit.quality.chisqr < 1e-12);
    }

    #[test]
    fn fixed_parameters_are_held() {
        let series = hb_series(0.0, 1);
        let model = ModelKind::Hb.descriptor().with_fixed("n", 0.5).unwrap();
        let fit = fit_model(&model, &series, &FitOptions::default()).into_result().unwrap();
        let n = fit.param("n").unwrap();
        assert_eq!(n.value, 0.5);
        assert!(n.fixed);
        assert!(n.stderr.is_none());
        assert_eq!(fit.quality.n_free, 2);
    }

    #[test]
    fn zero_stress_fails_with_reason() {
        let series = SampleSeries::new("zero", vec![0.1, 1.0, 10.0, 100.0], vec![0.0; 4]);
        let outcome = fit_model(&ModelKind::Hb.descriptor(), &series, &FitOptions::default());
        match outcome {
            FitOutcome::Failure(f) => assert_eq!(f.reason, FailureReason::NonPositiveStress),
            FitOutcome::Success(_) => panic!("zero stress must not fit"),
        }

        let opts = FitOptions {
            weighting: Weighting::Uniform,
            ..FitOptions::default()
        };
        let outcome = fit_model(&ModelKind::Hb.descriptor(), &series, &opts);
        assert!(matches!(
            outcome,
            FitOutcome::Failure(FitFailure { reason: FailureReason::NonPositiveStress, .. })
        ));
    }

    #[test]
    fn empty_and_short_series_fail() {
        let empty = SampleSeries::default();
        let outcome = fit_model(&ModelKind::Hb.descriptor(), &empty, &FitOptions::default());
        assert!(matches!(
            outcome,
            FitOutcome::Failure(FitFailure { reason: FailureReason::NoData, .. })
        ));

        let short = SampleSeries::new("s", vec![1.0, 2.0], vec![1.0, 2.0]);
        let outcome = fit_model(&ModelKind::Hb.descriptor(), &short, &FitOptions::default());
        assert!(matches!(
            outcome,
            FitOutcome::Failure(FitFailure { reason: FailureReason::TooFewPoints, .. })
        ));
    }
}
