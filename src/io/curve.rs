//! Read/write fit JSON files.
//!
//! A fit JSON is the portable representation of one fitted model:
//! - model kind, parameters, covariance and quality metrics
//! - the sample label and data ranges
//! - the sample metadata, solvent viscosity included, when known
//! - a precomputed fitted grid for quick plotting

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DatasetStats, FitResult, SampleSeries};
use crate::error::AppError;
use crate::fit::{curve_grid, evaluate};
use crate::io::samples::SampleMeta;

/// Fitted curve sampled on the plotting grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveGrid {
    pub shear_rate: Vec<f64>,
    pub stress: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub label: String,
    pub data: Option<DatasetStats>,
    pub fit: FitResult,
    pub grid: CurveGrid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<SampleMeta>,
}

impl FitFile {
    pub fn new(label: impl Into<String>, series: &SampleSeries, fit: &FitResult) -> Self {
        let (shear_rate, stress) = evaluate(fit, &curve_grid()).into_iter().unzip();
        Self {
            tool: "rheo".to_string(),
            generated_at: Utc::now(),
            label: label.into(),
            data: series.stats(),
            fit: fit.clone(),
            grid: CurveGrid { shear_rate, stress },
            sample: None,
        }
    }

    /// Attach the metadata-file entry of the fitted sample.
    pub fn with_meta(mut self, meta: Option<&SampleMeta>) -> Self {
        self.sample = meta.cloned();
        self
    }

    /// Background viscosity over solvent viscosity, for TC fits of samples
    /// whose solvent viscosity is known.
    pub fn relative_viscosity(&self) -> Option<f64> {
        let solvent = self.sample.as_ref()?.solvent_viscosity?;
        let eta = self.fit.value("eta_bg")?;
        (solvent > 0.0).then(|| eta / solvent)
    }
}

/// Write a fit JSON file.
pub fn write_fit_json(path: &Path, file: &FitFile) -> Result<(), AppError> {
    let out = File::create(path)
        .map_err(|e| AppError::new(5, format!("Failed to create fit JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(out, file)
        .map_err(|e| AppError::new(5, format!("Failed to write fit JSON '{}': {e}", path.display())))?;
    Ok(())
}

/// Read a fit JSON file.
pub fn read_fit_json(path: &Path) -> Result<FitFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open fit JSON '{}': {e}", path.display())))?;
    let fit: FitFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid fit JSON '{}': {e}", path.display())))?;
    Ok(fit)
}
