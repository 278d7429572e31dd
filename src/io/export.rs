//! Export per-point fit residuals to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::{FitResult, SampleSeries};
use crate::error::AppError;
use crate::models::predict;

/// One observed point against the fitted curve.
#[derive(Debug, Clone, PartialEq)]
pub struct PointResidual {
    pub shear_rate: f64,
    pub stress: f64,
    pub stress_fit: f64,
    pub residual: f64,
    /// `residual / stress`; NaN for zero stress.
    pub relative: f64,
}

pub fn residuals(series: &SampleSeries, fit: &FitResult) -> Vec<PointResidual> {
    let values = fit.values();
    series
        .points()
        .map(|(x, y)| {
            let y_fit = predict(fit.model, x, &values);
            let residual = y - y_fit;
            PointResidual {
                shear_rate: x,
                stress: y,
                stress_fit: y_fit,
                residual,
                relative: if y != 0.0 { residual / y } else { f64::NAN },
            }
        })
        .collect()
}

/// Write per-point residuals to a CSV file.
pub fn write_residuals_csv(path: &Path, series: &SampleSeries, fit: &FitResult) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(5, format!("Failed to create export CSV '{}': {e}", path.display())))?;

    writeln!(file, "label,model,shear_rate,stress,stress_fit,residual,relative_residual")
        .map_err(|e| AppError::new(5, format!("Failed to write export CSV header: {e}")))?;

    let model = fit.model.to_string();
    for r in residuals(series, fit) {
        writeln!(
            file,
            "{},{},{:.6e},{:.6e},{:.6e},{:.6e},{}",
            series.label,
            model,
            r.shear_rate,
            r.stress,
            r.stress_fit,
            r.residual,
            if r.relative.is_finite() { format!("{:.6}", r.relative) } else { String::new() },
        )
        .map_err(|e| AppError::new(5, format!("Failed to write export CSV row: {e}")))?;
    }

    Ok(())
}
