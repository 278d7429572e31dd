//! Synthetic flow curves from catalog models.
//!
//! A model is evaluated on a log-spaced shear-rate grid and each stress is
//! multiplied by `exp(σ·z - σ²/2)` with `z ~ N(0, 1)`. The noise is relative,
//! which is how rheometer scatter behaves over several decades, and the mean
//! correction keeps the curve unbiased.
//!
//! The generator is seeded, so a given spec always yields the same data.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{ModelKind, SampleKey, SampleSeries};
use crate::error::AppError;
use crate::fit::log_space;
use crate::io::{DEFAULT_EXPERIMENT_TYPE, DEFAULT_SWEEP_DIRECTION};
use crate::models::predict;

#[derive(Debug, Clone)]
pub struct SynthSpec {
    pub model: ModelKind,
    /// Parameter values in model order.
    pub params: Vec<f64>,
    pub rate_min: f64,
    pub rate_max: f64,
    pub points: usize,
    /// Relative noise level (log-normal sigma).
    pub noise: f64,
    pub seed: u64,
}

pub fn generate_series(spec: &SynthSpec, label: &str) -> Result<SampleSeries, AppError> {
    let expected = spec.model.descriptor().params().len();
    if spec.params.len() != expected {
        return Err(AppError::new(
            2,
            format!(
                "{} takes {expected} parameters, got {}.",
                spec.model.display_name(),
                spec.params.len()
            ),
        ));
    }
    if !(spec.noise.is_finite() && spec.noise >= 0.0) {
        return Err(AppError::new(2, "Noise level must be finite and >= 0."));
    }

    let rates = log_space(spec.rate_min, spec.rate_max, spec.points)?;
    let mut rng = StdRng::seed_from_u64(sample_seed(spec, label));
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;
    let mean_correction = 0.5 * spec.noise * spec.noise;

    let mut stress = Vec::with_capacity(rates.len());
    for &x in &rates {
        let clean = predict(spec.model, x, &spec.params);
        if !clean.is_finite() {
            return Err(AppError::new(
                4,
                format!("{} is not finite at shear rate {x}.", spec.model.display_name()),
            ));
        }
        let z: f64 = normal.sample(&mut rng);
        stress.push(clean * (spec.noise * z - mean_correction).exp());
    }

    Ok(SampleSeries::new(label, rates, stress))
}

/// Write runs as a long-layout table the ingest layer reads back.
///
/// Every series becomes one inverse flow-curve run of `key`, numbered from 1.
pub fn write_long_csv(path: &Path, key: &SampleKey, runs: &[SampleSeries]) -> Result<(), AppError> {
    let write_err = |e: csv::Error| AppError::new(5, format!("Failed to write '{}': {e}", path.display()));

    let mut writer = csv::Writer::from_path(path).map_err(write_err)?;
    writer
        .write_record([
            "sample_id",
            "temperature",
            "sweep_direction",
            "experiment_type",
            "run",
            "shear_rate",
            "stress",
        ])
        .map_err(write_err)?;

    let temperature = key.temperature.to_string();
    for (i, series) in runs.iter().enumerate() {
        let run = (i + 1).to_string();
        for (x, y) in series.points() {
            writer
                .write_record([
                    key.sample_id.as_str(),
                    temperature.as_str(),
                    DEFAULT_SWEEP_DIRECTION,
                    DEFAULT_EXPERIMENT_TYPE,
                    run.as_str(),
                    &x.to_string(),
                    &y.to_string(),
                ])
                .map_err(write_err)?;
        }
    }
    writer
        .flush()
        .map_err(|e| AppError::new(5, format!("Failed to write '{}': {e}", path.display())))?;
    Ok(())
}

fn sample_seed(spec: &SynthSpec, label: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    spec.seed.hash(&mut hasher);
    spec.model.hash(&mut hasher);
    for p in &spec.params {
        p.to_bits().hash(&mut hasher);
    }
    spec.rate_min.to_bits().hash(&mut hasher);
    spec.rate_max.to_bits().hash(&mut hasher);
    spec.points.hash(&mut hasher);
    spec.noise.to_bits().hash(&mut hasher);
    label.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{read_long_table, UnitSpec, UnitTable};

    fn hb_spec(noise: f64) -> SynthSpec {
        SynthSpec {
            model: ModelKind::Hb,
            params: vec![5.0, 2.0, 0.5],
            rate_min: 1e-2,
            rate_max: 1e2,
            points: 25,
            noise,
            seed: 7,
        }
    }

    #[test]
    fn same_spec_same_data() {
        let a = generate_series(&hb_spec(0.02), "a").unwrap();
        let b = generate_series(&hb_spec(0.02), "a").unwrap();
        assert_eq!(a, b);
        let c = generate_series(&hb_spec(0.02), "c").unwrap();
        assert_ne!(a.stress, c.stress);
    }

    #[test]
    fn noiseless_series_follows_the_model() {
        let s = generate_series(&hb_spec(0.0), "clean").unwrap();
        assert_eq!(s.len(), 25);
        for (x, y) in s.points() {
            approx::assert_relative_eq!(y, predict(ModelKind::Hb, x, &[5.0, 2.0, 0.5]), max_relative = 1e-12);
        }
    }

    #[test]
    fn wrong_parameter_count_is_rejected() {
        let mut spec = hb_spec(0.01);
        spec.params.pop();
        assert_eq!(generate_series(&spec, "x").unwrap_err().exit_code(), 2);
    }

    #[test]
    fn long_csv_reads_back_as_runs() {
        let key = SampleKey::new("S1", 25.0);
        let runs = vec![
            generate_series(&hb_spec(0.01), "r1").unwrap(),
            generate_series(&hb_spec(0.01), "r2").unwrap(),
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synth.csv");
        write_long_csv(&path, &key, &runs).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let table = read_long_table(file, "synth.csv", &UnitTable::uniform(UnitSpec::default())).unwrap();
        assert_eq!(table.runs.len(), 2);
        assert_eq!(table.keys(), vec![key]);
        assert_eq!(table.runs[0].series.stress, runs[0].stress);
    }
}
