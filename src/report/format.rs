//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized (the tests below pin the layouts)

use clap::ValueEnum;

use crate::domain::{FitFailure, FitResult};
use crate::fit::{derived::round_estimate, BatchSummary, FlowCurveFits, ModelComparison, SampleOutcome};
use crate::io::PointResidual;
use crate::math::RoundedValue;
use crate::models::ModelDescriptor;

/// `σy = 5.0 ± 0.2 Pa`
pub fn value_label(symbol: &str, value: &RoundedValue, unit: &str) -> String {
    let label = format!("{symbol} = {value}");
    if unit.is_empty() {
        label
    } else {
        format!("{label} {unit}")
    }
}

/// Parameter table plus quality line for one fit.
pub fn format_fit(fit: &FitResult) -> String {
    let descriptor = fit.model.descriptor();
    let mut out = String::new();

    out.push_str(&format!("{} ({})\n", fit.model.display_name(), descriptor.expression()));
    out.push_str(
        format!(
            "{:<14} {:>14} {:>12} {:<22} {:<8}\n",
            "param", "value", "stderr", "rounded", "unit"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<14} {:-<14} {:-<12} {:-<22} {:-<8}\n", "", "", "", "", "").trim_end());
    out.push('\n');

    for p in &fit.params {
        let unit = descriptor.param(&p.name).map(|s| s.unit).unwrap_or("");
        let stderr = match (p.fixed, p.stderr) {
            (true, _) => "fixed".to_string(),
            (false, Some(e)) => format!("{e:.4e}"),
            (false, None) => "-".to_string(),
        };
        let mut rounded = round_estimate(p).to_string();
        if p.at_bound {
            rounded.push_str(" (bound)");
        }
        out.push_str(
            format!(
                "{:<14} {:>14.6e} {:>12} {:<22} {:<8}\n",
                truncate(&p.name, 14),
                p.value,
                stderr,
                truncate(&rounded, 22),
                unit
            )
            .trim_end(),
        );
        out.push('\n');
    }

    let q = &fit.quality;
    out.push_str(&format!(
        "n={} free={} nfev={} chisqr={:.4e} redchi={:.4e} AIC={:.3} BIC={:.3}\n",
        q.n, q.n_free, q.nfev, q.chisqr, q.redchi, q.aic, q.bic
    ));
    if fit.covariance.is_none() {
        out.push_str("warning: covariance unavailable; standard errors omitted\n");
    }
    if fit.hit_bounds {
        out.push_str("warning: at least one estimate sits on a bound\n");
    }
    out
}

/// Model diagnostics for a multi-model comparison; `*` marks the preferred fit.
pub fn format_comparison(comparison: &ModelComparison) -> String {
    let mut out = String::new();
    let preferred = comparison.preferred().map(|f| f.model);

    out.push_str("Model diagnostics:\n");
    for fit in &comparison.fits {
        let mark = if Some(fit.model) == preferred { "*" } else { " " };
        out.push_str(&format!(
            "{mark} {:<24} k={} chisqr={:.4e} redchi={:.4e} BIC={:.3}\n",
            fit.model.display_name(),
            fit.quality.n_free,
            fit.quality.chisqr,
            fit.quality.redchi,
            fit.quality.bic
        ));
    }
    for failure in &comparison.failures {
        out.push_str(&format!("  (failed {}) {}\n", failure.model.display_name(), failure.reason));
    }
    out
}

/// Result block for one analyzed sample.
pub fn format_sample(fits: &FlowCurveFits) -> String {
    let mut out = String::new();
    let stats = fits.data.stats();

    out.push_str(&format!("=== {} ===\n", fits.key));
    if let Some(s) = stats {
        out.push_str(&format!(
            "Points: n={} | rate=[{:.3e}, {:.3e}] 1/s | stress=[{:.3e}, {:.3e}] Pa\n",
            s.n_points, s.rate_min, s.rate_max, s.stress_min, s.stress_max
        ));
    }

    out.push_str("Herschel-Bulkley:\n");
    out.push_str(&format!("  {}\n", value_label("σy", &fits.hb.ystress, "Pa")));
    out.push_str(&format!("  {}\n", value_label("K", &fits.hb.k, "Pa·sⁿ")));
    out.push_str(&format!("  {}\n", value_label("n", &fits.hb.n, "")));
    out.push_str(&format!("  BIC={:.3} redchi={:.4e}\n", fits.hb_fit.quality.bic, fits.hb_fit.quality.redchi));

    out.push_str("Three-Component:\n");
    out.push_str(&format!("  {}\n", value_label("σy", &fits.tc.ystress, "Pa")));
    out.push_str(&format!("  {}\n", value_label("γ̇c", &fits.tc.gamma_dotc, "1/s")));
    out.push_str(&format!("  {}\n", value_label("ηs", &fits.tc.etas, "Pa·s")));
    out.push_str(&format!("  BIC={:.3} redchi={:.4e}\n", fits.tc_fit.quality.bic, fits.tc_fit.quality.redchi));

    out.push_str(&format!("Derived: {}", value_label("γc", &fits.gammac, "")));
    if let Some(rate) = fits.crossover_rate {
        out.push_str(&format!(" | σy/ηs = {rate:.4e} 1/s"));
    }
    out.push('\n');
    out
}

/// Catalog listing for `rheo models`.
pub fn format_models(models: &[ModelDescriptor]) -> String {
    let mut out = String::new();
    for m in models {
        let cli_name = m
            .kind()
            .to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default();
        out.push_str(&format!("{:<10} {:<22} {}\n", cli_name, m.name(), m.expression()));
        for p in m.params() {
            out.push_str(&format!(
                "    {:<14} start={:<8} bounds=[{}, {}]{}\n",
                p.name,
                p.default,
                p.bounds.lower,
                p.bounds.upper,
                if p.fixed { " fixed" } else { "" }
            ));
        }
    }
    out
}

/// Summary of a batch run, listing every sample that did not fit.
pub fn format_batch(summary: &BatchSummary, outcomes: &[SampleOutcome]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Samples: {} | fitted={} no_data={} invalid={} failed={} no_high_shear={}\n",
        summary.total(),
        summary.fitted,
        summary.no_data,
        summary.invalid,
        summary.failed,
        summary.no_high_shear
    ));
    for o in outcomes.iter().filter(|o| o.fitted().is_none()) {
        out.push_str(&format!("  {}: {}\n", o.key(), o.describe()));
    }
    out
}

pub fn format_failure(failure: &FitFailure) -> String {
    format!("{failure}\n")
}

/// The `top_n` points with the largest relative residuals.
pub fn format_residuals(residuals: &[PointResidual], top_n: usize) -> String {
    let mut out = String::new();
    out.push_str(format!("{:>12} {:>12} {:>12} {:>10}\n", "rate", "stress", "fit", "rel").trim_end());
    out.push('\n');
    for r in super::largest_residuals(residuals, top_n) {
        out.push_str(&format!(
            "{:>12.4e} {:>12.4e} {:>12.4e} {:>10}\n",
            r.shear_rate,
            r.stress,
            r.stress_fit,
            fmt_pct(r.relative)
        ));
    }
    out
}

pub fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6}")).collect();
    format!("[{}]", parts.join(", "))
}

fn fmt_pct(v: f64) -> String {
    if v.is_finite() {
        format!("{:+.2}%", v * 100.0)
    } else {
        "-".to_string()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitQuality, ModelKind, ParameterEstimate, Weighting};
    use crate::fit::analysis::{HbParams, TcParams};
    use crate::domain::{SampleKey, SampleSeries};

    fn estimate(name: &str, value: f64, stderr: f64) -> ParameterEstimate {
        ParameterEstimate {
            name: name.to_string(),
            value,
            stderr: Some(stderr),
            fixed: false,
            at_bound: false,
        }
    }

    fn bingham_fit() -> FitResult {
        FitResult {
            model: ModelKind::Bingham,
            params: vec![estimate("ystress", 5.0312, 0.21), estimate("eta_bg", 0.0498, 0.0031)],
            covariance: Some(vec![vec![0.0441, 0.0], vec![0.0, 0.0031 * 0.0031]]),
            quality: FitQuality {
                n: 20,
                n_free: 2,
                iterations: 6,
                nfev: 21,
                chisqr: 0.012,
                redchi: 0.012 / 18.0,
                aic: -140.0,
                bic: -138.0,
            },
            weighting: Weighting::Relative,
            hit_bounds: false,
        }
    }

    #[test]
    fn labels_carry_rounded_value_and_unit() {
        let v = RoundedValue {
            value: 5.0,
            uncertainty: 0.2,
            exponent: Some(-1),
        };
        assert_eq!(value_label("σy", &v, "Pa"), "σy = 5.0 ± 0.2 Pa");
        assert_eq!(value_label("n", &RoundedValue::unrounded(0.5), ""), "n = 0.5");
    }

    #[test]
    fn fit_table_lists_every_parameter() {
        let text = format_fit(&bingham_fit());
        assert!(text.starts_with("Bingham"));
        assert!(text.contains("ystress"));
        assert!(text.contains("5.0 ± 0.2"));
        assert!(text.contains("0.050 ± 0.003"));
        assert!(text.contains("BIC=-138.000"));
        assert!(!text.contains("warning"));
    }

    #[test]
    fn sample_block_shows_both_models_and_derived_values() {
        let r = |value, uncertainty, exponent| RoundedValue {
            value,
            uncertainty,
            exponent: Some(exponent),
        };
        let fits = FlowCurveFits {
            key: SampleKey::new("12", 20.0),
            data: SampleSeries::new("12", vec![0.1, 1.0], vec![5.0, 6.0]),
            hb_fit: bingham_fit(),
            tc_fit: bingham_fit(),
            hb: HbParams {
                ystress: r(5.0, 0.2, -1),
                k: r(2.0, 0.1, -1),
                n: r(0.50, 0.01, -2),
            },
            tc: TcParams {
                ystress: r(4.8, 0.3, -1),
                gamma_dotc: r(0.20, 0.02, -2),
                etas: r(0.050, 0.003, -3),
            },
            gammac: r(0.0021, 0.0003, -4),
            crossover_rate: Some(96.0),
        };
        let text = format_sample(&fits);
        assert!(text.contains("σy = 5.0 ± 0.2 Pa"));
        assert!(text.contains("ηs = 0.050 ± 0.003 Pa·s"));
        assert!(text.contains("γc = 0.0021 ± 0.0003"));
        assert!(text.contains("σy/ηs = 9.6000e1 1/s"));
    }

    #[test]
    fn model_listing_covers_catalog() {
        let text = format_models(&crate::models::catalog());
        for kind in ModelKind::ALL {
            assert!(text.contains(kind.display_name()), "missing {kind}");
        }
    }

    #[test]
    fn truncate_marks_cut_strings() {
        assert_eq!(truncate("gammadot_crit", 14), "gammadot_crit");
        assert_eq!(truncate("gammadot_critical", 8), "gammado.");
    }
}
