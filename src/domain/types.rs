//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - reloaded later for plotting or comparisons

use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unit convention of the shear-rate column of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum RateUnit {
    /// Plain reciprocal seconds.
    #[default]
    #[serde(rename = "s-1")]
    #[value(name = "s-1")]
    PerSecond,
    /// Instrument-normalized rate; the true rate is `value / 0.158`.
    #[serde(rename = "0.158s-1")]
    #[value(name = "0.158s-1")]
    Normalized0158,
}

impl RateUnit {
    /// Convert a raw column value to 1/s.
    pub fn to_per_second(self, raw: f64) -> f64 {
        match self {
            RateUnit::PerSecond => raw,
            RateUnit::Normalized0158 => raw / 0.158,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RateUnit::PerSecond => "s-1",
            RateUnit::Normalized0158 => "0.158s-1",
        }
    }
}

/// Unit convention of the stress column of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum StressUnit {
    #[default]
    #[serde(rename = "Pa")]
    #[value(name = "Pa")]
    Pascal,
    /// CGS stress; `1 dyn/cm² = 0.1 Pa`.
    #[serde(rename = "dynes/cm2")]
    #[value(name = "dynes/cm2")]
    DynesPerCm2,
    /// Reduced stress published in units of 0.0825 Pa.
    #[serde(rename = "0.0825Pa")]
    #[value(name = "0.0825Pa")]
    Scaled0825,
}

impl StressUnit {
    /// Convert a raw column value to Pa.
    pub fn to_pascal(self, raw: f64) -> f64 {
        match self {
            StressUnit::Pascal => raw,
            StressUnit::DynesPerCm2 => 0.1 * raw,
            StressUnit::Scaled0825 => raw * 0.0825,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StressUnit::Pascal => "Pa",
            StressUnit::DynesPerCm2 => "dynes/cm2",
            StressUnit::Scaled0825 => "0.0825Pa",
        }
    }
}

/// How residuals are weighted in the least-squares objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    /// Residuals divided by the observed stress (relative error).
    Relative,
    /// Raw residuals.
    Uniform,
}

/// Column arrangement of an input table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// One row per measurement point with sample/temperature/run columns.
    Long,
    /// Alternating (shear rate, stress) column pairs; the shear-rate header
    /// labels the pair.
    Paired,
}

/// Concrete rheological model kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[value(name = "constant")]
    ConstantStress,
    Newtonian,
    #[value(name = "powerlaw")]
    PowerLaw,
    Bingham,
    /// Three-Component model.
    Tc,
    /// Three-Component model with a free shear-thinning exponent.
    Tcn,
    /// Three-Component model parameterized by a critical strain.
    Tcalt,
    /// Herschel-Bulkley.
    Hb,
    Casson,
    Carreau,
    Cross,
    /// Stretched exponential (stress transients).
    #[value(name = "stexp")]
    StretchedExp,
}

impl ModelKind {
    pub const ALL: [ModelKind; 12] = [
        ModelKind::ConstantStress,
        ModelKind::Newtonian,
        ModelKind::PowerLaw,
        ModelKind::Bingham,
        ModelKind::Tc,
        ModelKind::Tcn,
        ModelKind::Tcalt,
        ModelKind::Hb,
        ModelKind::Casson,
        ModelKind::Carreau,
        ModelKind::Cross,
        ModelKind::StretchedExp,
    ];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::ConstantStress => "Constant stress",
            ModelKind::Newtonian => "Newtonian",
            ModelKind::PowerLaw => "Power law",
            ModelKind::Bingham => "Bingham",
            ModelKind::Tc => "TC",
            ModelKind::Tcn => "TC (free n)",
            ModelKind::Tcalt => "TC (critical strain)",
            ModelKind::Hb => "HB",
            ModelKind::Casson => "Casson",
            ModelKind::Carreau => "Carreau",
            ModelKind::Cross => "Cross",
            ModelKind::StretchedExp => "Stretched exp.",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Identifies one flow-curve analysis: a sample at a temperature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleKey {
    pub sample_id: String,
    pub temperature: f64,
}

impl SampleKey {
    pub fn new(sample_id: impl Into<String>, temperature: f64) -> Self {
        Self {
            sample_id: sample_id.into(),
            temperature,
        }
    }

    /// Exact-match comparison used by the results store.
    pub fn matches(&self, sample_id: &str, temperature: f64) -> bool {
        self.sample_id == sample_id && self.temperature == temperature
    }

    /// File-name friendly stem, e.g. `sample_12_T20`.
    pub fn file_stem(&self) -> String {
        format!("sample_{}_T{}", self.sample_id, self.temperature)
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sample {} @ T={}", self.sample_id, self.temperature)
    }
}

/// A flow curve: parallel shear-rate (1/s) and stress (Pa) columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleSeries {
    pub label: String,
    pub shear_rate: Vec<f64>,
    pub stress: Vec<f64>,
}

/// Shear-rate and stress columns of different lengths.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("series '{label}' has {shear_rate} shear rates but {stress} stresses")]
pub struct SeriesLengthError {
    pub label: String,
    pub shear_rate: usize,
    pub stress: usize,
}

impl SampleSeries {
    /// Build a series; the two columns are truncated to the shorter length
    /// with a warning.
    pub fn new(label: impl Into<String>, mut shear_rate: Vec<f64>, mut stress: Vec<f64>) -> Self {
        let label = label.into();
        let n = shear_rate.len().min(stress.len());
        if shear_rate.len() != stress.len() {
            tracing::warn!(
                label = %label,
                shear_rate = shear_rate.len(),
                stress = stress.len(),
                kept = n,
                "column lengths differ; series truncated"
            );
        }
        shear_rate.truncate(n);
        stress.truncate(n);
        Self {
            label,
            shear_rate,
            stress,
        }
    }

    /// Build a series whose columns must have equal length.
    pub fn try_new(
        label: impl Into<String>,
        shear_rate: Vec<f64>,
        stress: Vec<f64>,
    ) -> Result<Self, SeriesLengthError> {
        let label = label.into();
        if shear_rate.len() != stress.len() {
            return Err(SeriesLengthError {
                label,
                shear_rate: shear_rate.len(),
                stress: stress.len(),
            });
        }
        Ok(Self {
            label,
            shear_rate,
            stress,
        })
    }

    pub fn len(&self) -> usize {
        self.shear_rate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shear_rate.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.shear_rate.iter().copied().zip(self.stress.iter().copied())
    }

    pub fn stats(&self) -> Option<DatasetStats> {
        DatasetStats::from_points(self.points())
    }
}

/// Summary stats about the points actually used for fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub n_points: usize,
    pub rate_min: f64,
    pub rate_max: f64,
    pub stress_min: f64,
    pub stress_max: f64,
}

impl DatasetStats {
    pub fn from_points(points: impl Iterator<Item = (f64, f64)>) -> Option<Self> {
        let mut n_points = 0usize;
        let mut rate_min = f64::INFINITY;
        let mut rate_max = f64::NEG_INFINITY;
        let mut stress_min = f64::INFINITY;
        let mut stress_max = f64::NEG_INFINITY;

        for (x, y) in points {
            n_points += 1;
            rate_min = rate_min.min(x);
            rate_max = rate_max.max(x);
            stress_min = stress_min.min(y);
            stress_max = stress_max.max(y);
        }

        if n_points == 0
            || !rate_min.is_finite()
            || !rate_max.is_finite()
            || !stress_min.is_finite()
            || !stress_max.is_finite()
        {
            return None;
        }

        Some(Self {
            n_points,
            rate_min,
            rate_max,
            stress_min,
            stress_max,
        })
    }
}

/// One measured run of a long-layout table (rows sharing sample, temperature,
/// sweep direction, experiment type and run label).
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRun {
    pub key: SampleKey,
    pub sweep_direction: String,
    pub experiment_type: String,
    pub run: String,
    pub series: SampleSeries,
}

/// A fitted parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEstimate {
    pub name: String,
    pub value: f64,
    /// Standard error; `None` for fixed parameters or when the covariance
    /// could not be estimated.
    pub stderr: Option<f64>,
    pub fixed: bool,
    /// The estimate sits on (or numerically at) one of its bounds.
    pub at_bound: bool,
}

/// Fit quality diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    /// Number of observations.
    pub n: usize,
    /// Number of free parameters.
    pub n_free: usize,
    /// Solver iterations.
    pub iterations: usize,
    /// Model evaluations (including Jacobian columns).
    pub nfev: usize,
    /// Weighted sum of squared residuals.
    pub chisqr: f64,
    /// `chisqr / (n - n_free)`.
    pub redchi: f64,
    pub aic: f64,
    pub bic: f64,
}

/// Fit output for a single model and series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub model: ModelKind,
    pub params: Vec<ParameterEstimate>,
    /// Covariance of the free parameters (row-major, in free-parameter order).
    pub covariance: Option<Vec<Vec<f64>>>,
    pub quality: FitQuality,
    pub weighting: Weighting,
    /// True when at least one free estimate is pinned at a bound.
    pub hit_bounds: bool,
}

impl FitResult {
    pub fn param(&self, name: &str) -> Option<&ParameterEstimate> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.param(name).map(|p| p.value)
    }

    pub fn stderr(&self, name: &str) -> Option<f64> {
        self.param(name).and_then(|p| p.stderr)
    }

    /// Parameter values in model order.
    pub fn values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }
}

/// Why a fit did not produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoData,
    TooFewPoints,
    NonPositiveStress,
    NonFiniteInput,
    NonFiniteModel,
    NoConvergence,
    SingularCovariance,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::NoData => "no data",
            FailureReason::TooFewPoints => "too few points",
            FailureReason::NonPositiveStress => "non-positive stress",
            FailureReason::NonFiniteInput => "non-finite input",
            FailureReason::NonFiniteModel => "non-finite model output",
            FailureReason::NoConvergence => "no convergence",
            FailureReason::SingularCovariance => "singular covariance",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed fit with its reason code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitFailure {
    pub model: ModelKind,
    pub reason: FailureReason,
    pub detail: String,
}

impl fmt::Display for FitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fit failed: {}", self.model, self.reason)?;
        if !self.detail.is_empty() {
            write!(f, " ({})", self.detail)?;
        }
        Ok(())
    }
}

/// Tagged fit outcome; callers branch on the tag.
#[derive(Debug, Clone, PartialEq)]
pub enum FitOutcome {
    Success(FitResult),
    Failure(FitFailure),
}

impl FitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FitOutcome::Success(_))
    }

    pub fn success(&self) -> Option<&FitResult> {
        match self {
            FitOutcome::Success(fit) => Some(fit),
            FitOutcome::Failure(_) => None,
        }
    }

    pub fn into_result(self) -> Result<FitResult, FitFailure> {
        match self {
            FitOutcome::Success(fit) => Ok(fit),
            FitOutcome::Failure(failure) => Err(failure),
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags, environment defaults and the sample
/// metadata file.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub inputs: Vec<PathBuf>,
    pub layout: InputLayout,
    pub samples_path: Option<PathBuf>,
    pub results_path: PathBuf,
    /// Start from an empty results table instead of appending.
    pub replace: bool,

    /// Unit conventions used when the metadata file does not declare any.
    pub default_rate_unit: RateUnit,
    pub default_stress_unit: StressUnit,

    /// Row selection for long-layout tables.
    pub sample_filter: Option<String>,
    pub temperature_filter: Option<f64>,
    pub sweep_direction: String,
    pub experiment_type: String,

    pub weighting: Weighting,
    pub max_iterations: usize,

    pub plot: bool,
    pub plot_dir: PathBuf,
    pub ascii_plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    /// Directory for per-fit JSON exports.
    pub export_dir: Option<PathBuf>,
}
