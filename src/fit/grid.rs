//! Shear-rate grids for evaluating fitted curves.

use crate::error::AppError;

/// Range and resolution used for plotted fit curves.
pub const CURVE_RATE_MIN: f64 = 1e-4;
pub const CURVE_RATE_MAX: f64 = 1e4;
pub const CURVE_STEPS: usize = 30;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::new(
            2,
            format!("Invalid grid range: min={min}, max={max} (must be finite, >0, and max>min)."),
        ));
    }
    if steps < 2 {
        return Err(AppError::new(2, "Grid steps must be >= 2."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    Ok(out)
}

/// The fixed grid fitted curves are drawn on.
pub fn curve_grid() -> Vec<f64> {
    let step = (CURVE_RATE_MAX.log10() - CURVE_RATE_MIN.log10()) / (CURVE_STEPS as f64 - 1.0);
    (0..CURVE_STEPS)
        .map(|i| 10f64.powf(CURVE_RATE_MIN.log10() + step * i as f64))
        .collect()
}
