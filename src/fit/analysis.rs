//! Herschel-Bulkley + Three-Component analysis of one flow curve.
//!
//! For one sample at one temperature:
//!
//! 1. select the matching runs (inverse sweeps of flow-curve experiments)
//! 2. merge all runs into one series ordered by shear rate
//! 3. fit HB, then TC
//! 4. round every parameter against its standard error
//! 5. derive the critical strain and the crossover shear rate
//!
//! Every way this can go wrong is a `SampleOutcome` variant; nothing here
//! returns an error.

use crate::domain::{
    FitFailure, FitResult, MeasurementRun, ModelKind, ParameterEstimate, SampleKey, SampleSeries,
};
use crate::fit::derived::{critical_strain, crossover_rate, round_estimate, round_or_raw};
use crate::fit::fitter::{fit_model, FitOptions};
use crate::math::{merge_runs, round_significant, RoundedValue};
use crate::models::ModelDescriptor;

/// Which runs of a long table belong to the analysis.
#[derive(Debug, Clone)]
pub struct RunSelection {
    pub sweep_direction: String,
    pub experiment_type: String,
}

impl Default for RunSelection {
    fn default() -> Self {
        Self {
            sweep_direction: "inverse".to_string(),
            experiment_type: "flow_curve".to_string(),
        }
    }
}

impl RunSelection {
    pub fn matches(&self, run: &MeasurementRun, key: &SampleKey) -> bool {
        run.key == *key
            && run.sweep_direction.eq_ignore_ascii_case(&self.sweep_direction)
            && run.experiment_type.eq_ignore_ascii_case(&self.experiment_type)
    }

    /// Series of every run matching `key`, in table order.
    pub fn select(&self, runs: &[MeasurementRun], key: &SampleKey) -> Vec<SampleSeries> {
        runs.iter()
            .filter(|r| self.matches(r, key))
            .map(|r| r.series.clone())
            .collect()
    }
}

/// Rounded Herschel-Bulkley parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct HbParams {
    pub ystress: RoundedValue,
    pub k: RoundedValue,
    pub n: RoundedValue,
}

/// Rounded Three-Component parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TcParams {
    pub ystress: RoundedValue,
    pub gamma_dotc: RoundedValue,
    pub etas: RoundedValue,
}

/// Everything a successful analysis produces.
#[derive(Debug, Clone)]
pub struct FlowCurveFits {
    pub key: SampleKey,
    /// Merged data the fits ran on.
    pub data: SampleSeries,
    pub hb_fit: FitResult,
    pub tc_fit: FitResult,
    pub hb: HbParams,
    pub tc: TcParams,
    pub gammac: RoundedValue,
    /// `tauc / etas`, from the rounded values.
    pub crossover_rate: Option<f64>,
}

impl FlowCurveFits {
    /// HB parameter vector from the rounded values, in model order.
    pub fn hb_values(&self) -> [f64; 3] {
        [self.hb.ystress.value, self.hb.k.value, self.hb.n.value]
    }

    /// TC parameter vector from the rounded values, in model order.
    pub fn tc_values(&self) -> [f64; 3] {
        [self.tc.ystress.value, self.tc.etas.value, self.tc.gamma_dotc.value]
    }
}

#[derive(Debug, Clone)]
pub enum SampleOutcome {
    Fitted(Box<FlowCurveFits>),
    /// No runs matched the key, or they held no points.
    NoData { key: SampleKey },
    /// The runs could not be merged into one series.
    InvalidData { key: SampleKey, message: String },
    FitFailed { key: SampleKey, failure: FitFailure },
    /// The TC viscosity rounds to zero: no high-shear regime.
    NoHighShearRegime { key: SampleKey, tc_fit: Box<FitResult> },
}

impl SampleOutcome {
    pub fn key(&self) -> &SampleKey {
        match self {
            SampleOutcome::Fitted(fits) => &fits.key,
            SampleOutcome::NoData { key }
            | SampleOutcome::InvalidData { key, .. }
            | SampleOutcome::FitFailed { key, .. }
            | SampleOutcome::NoHighShearRegime { key, .. } => key,
        }
    }

    pub fn fitted(&self) -> Option<&FlowCurveFits> {
        match self {
            SampleOutcome::Fitted(fits) => Some(fits),
            _ => None,
        }
    }

    /// One-line status for progress output.
    pub fn describe(&self) -> String {
        match self {
            SampleOutcome::Fitted(fits) => format!(
                "fitted (σy HB = {}, σy TC = {})",
                fits.hb.ystress, fits.tc.ystress
            ),
            SampleOutcome::NoData { .. } => "no data".to_string(),
            SampleOutcome::InvalidData { message, .. } => format!("invalid data: {message}"),
            SampleOutcome::FitFailed { failure, .. } => failure.to_string(),
            SampleOutcome::NoHighShearRegime { .. } => "no high shear regime".to_string(),
        }
    }
}

/// Analyze the runs of one sample.
pub fn analyze_runs(key: SampleKey, runs: &[SampleSeries], opts: &FitOptions) -> SampleOutcome {
    analyze_with_models(key, runs, opts, &hb_descriptor(), &tc_descriptor())
}

/// `analyze_runs` with caller-adjusted HB and TC descriptors, e.g. with a
/// parameter held fixed.
pub fn analyze_with_models(
    key: SampleKey,
    runs: &[SampleSeries],
    opts: &FitOptions,
    hb_model: &ModelDescriptor,
    tc_model: &ModelDescriptor,
) -> SampleOutcome {
    let data = match merge_runs(runs) {
        Ok(d) => d,
        Err(err) => {
            return SampleOutcome::InvalidData {
                key,
                message: err.to_string(),
            };
        }
    };
    if data.is_empty() {
        return SampleOutcome::NoData { key };
    }

    let hb_fit = match fit_model(hb_model, &data, opts).into_result() {
        Ok(fit) => fit,
        Err(failure) => return SampleOutcome::FitFailed { key, failure },
    };
    let tc_fit = match fit_model(tc_model, &data, opts).into_result() {
        Ok(fit) => fit,
        Err(failure) => return SampleOutcome::FitFailed { key, failure },
    };

    let hb = match (hb_fit.param("ystress"), hb_fit.param("K"), hb_fit.param("n")) {
        (Some(ys), Some(k), Some(n)) => HbParams {
            ystress: round_estimate(ys),
            k: round_estimate(k),
            n: round_estimate(n),
        },
        _ => return SampleOutcome::NoData { key },
    };

    let (tc_ys, tc_eta, tc_gdc) = match (
        tc_fit.param("ystress"),
        tc_fit.param("eta_bg"),
        tc_fit.param("gammadot_crit"),
    ) {
        (Some(ys), Some(eta), Some(gdc)) => (ys, eta, gdc),
        _ => return SampleOutcome::NoData { key },
    };

    let Some(etas) = high_shear_viscosity(tc_eta) else {
        return SampleOutcome::NoHighShearRegime {
            key,
            tc_fit: Box::new(tc_fit),
        };
    };

    let tc = TcParams {
        ystress: round_estimate(tc_ys),
        gamma_dotc: round_estimate(tc_gdc),
        etas,
    };

    let gammac = match critical_strain(
        tc.ystress.value,
        tc.ystress.uncertainty,
        tc.gamma_dotc.value,
        tc.gamma_dotc.uncertainty,
        tc.etas.value,
        tc.etas.uncertainty,
    ) {
        Some((g, e)) => round_or_raw(g, e),
        None => RoundedValue::unrounded(f64::NAN),
    };
    let crossover_rate = crossover_rate(tc.ystress.value, tc.etas.value);

    SampleOutcome::Fitted(Box::new(FlowCurveFits {
        key,
        data,
        hb_fit,
        tc_fit,
        hb,
        tc,
        gammac,
        crossover_rate,
    }))
}

/// Rounded background viscosity, or `None` when it is zero even at one
/// significant digit.
pub fn high_shear_viscosity(eta: &ParameterEstimate) -> Option<RoundedValue> {
    let mut etas = round_estimate(eta);
    if etas.value == 0.0 {
        // The error swamps the viscosity; keep its leading digit instead.
        etas.value = round_significant(eta.value);
    }
    (etas.value != 0.0).then_some(etas)
}

/// Select the runs for `key` from a long table and analyze them.
pub fn analyze_sample(
    runs: &[MeasurementRun],
    key: &SampleKey,
    selection: &RunSelection,
    opts: &FitOptions,
) -> SampleOutcome {
    let series = selection.select(runs, key);
    if series.is_empty() {
        return SampleOutcome::NoData { key: key.clone() };
    }
    analyze_runs(key.clone(), &series, opts)
}

/// HB with the flow-curve bounds `[0, 0, 0]..[∞, ∞, 1]`.
pub fn hb_descriptor() -> ModelDescriptor {
    ModelKind::Hb.descriptor()
}

/// TC with the flow-curve bounds `[0, 0, 0]..[∞, ∞, ∞]`.
pub fn tc_descriptor() -> ModelDescriptor {
    ModelKind::Tc.descriptor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::predict;

    fn tc_curve(ys: f64, eta: f64, gdc: f64, wobble: f64) -> SampleSeries {
        tc_curve_n(ys, eta, gdc, wobble, 40)
    }

    fn tc_curve_n(ys: f64, eta: f64, gdc: f64, wobble: f64, n: usize) -> SampleSeries {
        let xs = crate::fit::log_space(1e-3, 1e3, n).unwrap();
        let stress: Vec<f64> = xs
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                predict(ModelKind::Tc, x, &[ys, eta, gdc]) * (1.0 + wobble * sign)
            })
            .collect();
        SampleSeries::new("tc", xs, stress)
    }

    fn run(key: &SampleKey, sweep: &str, experiment: &str, series: SampleSeries) -> MeasurementRun {
        MeasurementRun {
            key: key.clone(),
            sweep_direction: sweep.to_string(),
            experiment_type: experiment.to_string(),
            run: "1".to_string(),
            series,
        }
    }

    #[test]
    fn tc_data_gives_full_analysis() {
        let key = SampleKey::new("7", 20.0);
        let outcome = analyze_runs(key.clone(), &[tc_curve(3.0, 0.05, 0.2, 0.005)], &FitOptions::default());
        let fits = outcome.fitted().expect("fitted");

        assert!((fits.tc.ystress.value - 3.0).abs() / 3.0 < 0.05);
        assert!((fits.tc.etas.value - 0.05).abs() / 0.05 < 0.05);
        assert!((fits.tc.gamma_dotc.value - 0.2).abs() / 0.2 < 0.1);

        let expected = fits.tc.gamma_dotc.value * fits.tc.etas.value / fits.tc.ystress.value;
        assert!((fits.gammac.value - expected).abs() <= fits.gammac.uncertainty.max(1e-12));
        assert_eq!(
            fits.crossover_rate,
            Some(fits.tc.ystress.value / fits.tc.etas.value)
        );
        assert_eq!(fits.data.len(), 40);
    }

    #[test]
    fn repeated_runs_are_merged_before_fitting() {
        let key = SampleKey::new("7", 20.0);
        let runs = [tc_curve(3.0, 0.05, 0.2, 0.005), tc_curve(3.0, 0.05, 0.2, -0.005)];
        let fits = analyze_runs(key, &runs, &FitOptions::default());
        let fits = fits.fitted().expect("fitted");
        assert_eq!(fits.data.len(), 80);
        assert!(fits.data.shear_rate.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn missing_runs_report_no_data() {
        let key = SampleKey::new("1", 20.0);
        let other = SampleKey::new("1", 40.0);
        let runs = vec![
            run(&other, "inverse", "flow_curve", tc_curve(1.0, 0.1, 0.1, 0.0)),
            run(&key, "forward", "flow_curve", tc_curve(1.0, 0.1, 0.1, 0.0)),
            run(&key, "inverse", "amplitude_sweep", tc_curve(1.0, 0.1, 0.1, 0.0)),
        ];
        let outcome = analyze_sample(&runs, &key, &RunSelection::default(), &FitOptions::default());
        assert!(matches!(outcome, SampleOutcome::NoData { .. }));
    }

    #[test]
    fn selection_is_case_insensitive_on_labels() {
        let key = SampleKey::new("1", 20.0);
        let runs = vec![run(&key, "Inverse", "FLOW_CURVE", tc_curve(1.0, 0.1, 0.1, 0.0))];
        assert_eq!(RunSelection::default().select(&runs, &key).len(), 1);
    }

    #[test]
    fn zero_stress_sample_reports_failure() {
        let key = SampleKey::new("0", 20.0);
        let zero = SampleSeries::new("zero", vec![0.1, 1.0, 10.0, 100.0, 1000.0], vec![0.0; 5]);
        let outcome = analyze_runs(key, &[zero], &FitOptions::default());
        match outcome {
            SampleOutcome::FitFailed { failure, .. } => assert_eq!(failure.model, ModelKind::Hb),
            other => panic!("unexpected outcome: {}", other.describe()),
        }
    }

    #[test]
    fn zero_stress_point_is_usable_under_flow_curve_defaults() {
        let key = SampleKey::new("3", 20.0);
        let mut curve = tc_curve_n(3.0, 0.05, 0.2, 0.0, 30);
        curve.stress[0] = 0.0;

        let outcome = analyze_runs(key.clone(), &[curve.clone()], &FitOptions::flow_curve());
        let fits = outcome.fitted().expect("fitted");
        assert!((fits.tc.ystress.value - 3.0).abs() / 3.0 < 0.15, "{}", fits.tc.ystress.value);
        assert!((fits.tc.etas.value - 0.05).abs() / 0.05 < 0.05, "{}", fits.tc.etas.value);

        // Relative weighting cannot divide by the zero point.
        let relative = analyze_runs(key, &[curve], &FitOptions::default());
        assert!(matches!(relative, SampleOutcome::FitFailed { .. }));
    }

    fn estimate(value: f64, stderr: Option<f64>) -> ParameterEstimate {
        ParameterEstimate {
            name: "eta_bg".to_string(),
            value,
            stderr,
            fixed: false,
            at_bound: false,
        }
    }

    #[test]
    fn swamped_viscosity_keeps_its_leading_digit() {
        // 0.0034 ± 0.5 rounds to 0 at the error's decimal.
        let etas = high_shear_viscosity(&estimate(0.0034, Some(0.5))).expect("rescued");
        assert!((etas.value - 0.003).abs() < 1e-12, "{}", etas.value);
        assert_eq!(etas.uncertainty, 0.5);

        let plain = high_shear_viscosity(&estimate(0.0512, Some(0.002))).unwrap();
        assert!((plain.value - 0.051).abs() < 1e-12, "{}", plain.value);

        assert!(high_shear_viscosity(&estimate(0.0, Some(0.5))).is_none());
        assert!(high_shear_viscosity(&estimate(0.0, None)).is_none());
    }

    #[test]
    fn zero_background_viscosity_has_no_high_shear_regime() {
        let key = SampleKey::new("9", 20.0);
        let tc = tc_descriptor().with_fixed("eta_bg", 0.0).unwrap();
        let outcome = analyze_with_models(
            key,
            &[tc_curve(3.0, 0.05, 0.2, 0.005)],
            &FitOptions::flow_curve(),
            &hb_descriptor(),
            &tc,
        );
        match outcome {
            SampleOutcome::NoHighShearRegime { tc_fit, .. } => {
                assert_eq!(tc_fit.value("eta_bg"), Some(0.0));
            }
            other => panic!("unexpected outcome: {}", other.describe()),
        }
    }
}
