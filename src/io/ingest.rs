//! CSV ingest and normalization.
//!
//! This module turns delimited flow-curve exports into clean
//! `(shear rate, stress)` series in SI units (1/s, Pa).
//!
//! Two layouts are supported:
//!
//! - **long**: one row per measured point, with `sample_id`, `temperature`,
//!   `shear_rate`, `stress` and optionally `sweep_direction`,
//!   `experiment_type`, `run`. Rows are grouped into runs.
//! - **paired**: alternating `(shear rate, stress)` column pairs; the header
//!   of the shear-rate column labels the pair.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Unit normalization at the boundary**: conversion factors are applied
//!   here, never in the fitting code

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use thiserror::Error;

use crate::domain::{MeasurementRun, RateUnit, SampleKey, SampleSeries, StressUnit};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read CSV headers of '{path}': {source}")]
    Headers {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("'{path}': missing required column `{column}`")]
    MissingColumn { path: String, column: String },
    #[error("'{path}': paired layout needs (shear rate, stress) column pairs, found {found} columns")]
    OddColumns { path: String, found: usize },
    #[error("no valid rows in '{path}'")]
    NoRows { path: String },
}

/// Unit conventions of one data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitSpec {
    pub rate: RateUnit,
    pub stress: StressUnit,
}

impl UnitSpec {
    pub fn convert(&self, shear_rate: f64, stress: f64) -> (f64, f64) {
        (self.rate.to_per_second(shear_rate), self.stress.to_pascal(stress))
    }
}

/// Units per sample id, with a fallback for unlisted samples.
#[derive(Debug, Clone, Default)]
pub struct UnitTable {
    pub default: UnitSpec,
    pub per_sample: HashMap<String, UnitSpec>,
}

impl UnitTable {
    pub fn uniform(default: UnitSpec) -> Self {
        Self {
            default,
            per_sample: HashMap::new(),
        }
    }

    pub fn for_sample(&self, sample_id: &str) -> UnitSpec {
        self.per_sample.get(sample_id).copied().unwrap_or(self.default)
    }
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Long-layout ingest output.
#[derive(Debug, Clone)]
pub struct LongTable {
    pub runs: Vec<MeasurementRun>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

impl LongTable {
    /// Distinct (sample, temperature) keys in first-appearance order.
    pub fn keys(&self) -> Vec<SampleKey> {
        let mut keys: Vec<SampleKey> = Vec::new();
        for run in &self.runs {
            if !keys.contains(&run.key) {
                keys.push(run.key.clone());
            }
        }
        keys
    }
}

/// Paired-layout ingest output.
#[derive(Debug, Clone)]
pub struct PairedTable {
    pub series: Vec<SampleSeries>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Default labels for long tables that omit the selection columns.
pub const DEFAULT_SWEEP_DIRECTION: &str = "inverse";
pub const DEFAULT_EXPERIMENT_TYPE: &str = "flow_curve";

const LONG_REQUIRED: [&str; 4] = ["sample_id", "temperature", "shear_rate", "stress"];

/// Load a long-layout CSV, converting each row with its sample's units.
pub fn load_long_table(path: &Path, units: &UnitTable) -> Result<LongTable, IngestError> {
    let file = open(path)?;
    read_long_table(file, &path.display().to_string(), units)
}

/// Long-layout ingest from any reader; `path` is only used in messages.
pub fn read_long_table<R: Read>(input: R, path: &str, units: &UnitTable) -> Result<LongTable, IngestError> {
    let mut reader = csv_reader(input);
    let headers = reader
        .headers()
        .map_err(|source| IngestError::Headers {
            path: path.to_string(),
            source,
        })?
        .clone();
    let header_map = build_header_map(&headers);

    for column in LONG_REQUIRED {
        if !header_map.contains_key(column) {
            return Err(IngestError::MissingColumn {
                path: path.to_string(),
                column: column.to_string(),
            });
        }
    }

    let mut runs: Vec<MeasurementRun> = Vec::new();
    let mut run_index: HashMap<(String, u64, String, String, String), usize> = HashMap::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_used = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: header is line 1 and CSV lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let row = match parse_long_row(&record, &header_map) {
            Ok(row) => row,
            Err(message) => {
                let id = get_optional(&record, &header_map, "sample_id").map(str::to_string);
                row_errors.push(RowError { line, id, message });
                continue;
            }
        };

        let (x, y) = units.for_sample(&row.sample_id).convert(row.shear_rate, row.stress);

        let group = (
            row.sample_id.clone(),
            row.temperature.to_bits(),
            row.sweep_direction.clone(),
            row.experiment_type.clone(),
            row.run.clone(),
        );
        let slot = *run_index.entry(group).or_insert_with(|| {
            runs.push(MeasurementRun {
                key: SampleKey::new(row.sample_id.clone(), row.temperature),
                sweep_direction: row.sweep_direction.clone(),
                experiment_type: row.experiment_type.clone(),
                run: row.run.clone(),
                series: SampleSeries::new(
                    format!("{} T={} run {}", row.sample_id, row.temperature, row.run),
                    Vec::new(),
                    Vec::new(),
                ),
            });
            runs.len() - 1
        });
        runs[slot].series.shear_rate.push(x);
        runs[slot].series.stress.push(y);
        rows_used += 1;
    }

    if rows_used == 0 {
        return Err(IngestError::NoRows { path: path.to_string() });
    }

    Ok(LongTable {
        runs,
        row_errors,
        rows_read,
        rows_used,
    })
}

/// Load a paired-layout CSV; every pair is converted with `units`.
pub fn load_paired_table(path: &Path, units: UnitSpec) -> Result<PairedTable, IngestError> {
    let file = open(path)?;
    read_paired_table(file, &path.display().to_string(), units)
}

/// Paired-layout ingest from any reader; `path` is only used in messages.
pub fn read_paired_table<R: Read>(input: R, path: &str, units: UnitSpec) -> Result<PairedTable, IngestError> {
    let mut reader = csv_reader(input);
    let headers = reader
        .headers()
        .map_err(|source| IngestError::Headers {
            path: path.to_string(),
            source,
        })?
        .clone();

    if headers.is_empty() || headers.len() % 2 != 0 {
        return Err(IngestError::OddColumns {
            path: path.to_string(),
            found: headers.len(),
        });
    }

    let mut series: Vec<SampleSeries> = headers
        .iter()
        .step_by(2)
        .map(|label| SampleSeries::new(label.trim().trim_start_matches('\u{feff}'), Vec::new(), Vec::new()))
        .collect();

    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        for (pair, s) in series.iter_mut().enumerate() {
            let x_cell = record.get(2 * pair).map(str::trim).unwrap_or("");
            let y_cell = record.get(2 * pair + 1).map(str::trim).unwrap_or("");
            if is_blank(x_cell) && is_blank(y_cell) {
                // Shorter pairs are padded with blanks.
                continue;
            }
            match (parse_cell(x_cell), parse_cell(y_cell)) {
                (Some(x), Some(y)) if x >= 0.0 && y >= 0.0 => {
                    let (x, y) = units.convert(x, y);
                    s.shear_rate.push(x);
                    s.stress.push(y);
                }
                (Some(_), Some(_)) => row_errors.push(RowError {
                    line,
                    id: Some(s.label.clone()),
                    message: "Negative shear rate or stress.".to_string(),
                }),
                _ => row_errors.push(RowError {
                    line,
                    id: Some(s.label.clone()),
                    message: format!("Invalid pair ('{x_cell}', '{y_cell}')."),
                }),
            }
        }
    }

    series.retain(|s| !s.is_empty());
    if series.is_empty() {
        return Err(IngestError::NoRows { path: path.to_string() });
    }

    Ok(PairedTable {
        series,
        row_errors,
        rows_read,
    })
}

#[derive(Debug)]
struct LongRow {
    sample_id: String,
    temperature: f64,
    sweep_direction: String,
    experiment_type: String,
    run: String,
    shear_rate: f64,
    stress: f64,
}

fn parse_long_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<LongRow, String> {
    let sample_id = get_required(record, header_map, "sample_id")?.to_string();
    let temperature = parse_f64(get_required(record, header_map, "temperature")?, "temperature")?;
    let shear_rate = parse_f64(get_required(record, header_map, "shear_rate")?, "shear_rate")?;
    let stress = parse_f64(get_required(record, header_map, "stress")?, "stress")?;

    if shear_rate < 0.0 {
        return Err(format!("Negative shear rate {shear_rate}."));
    }
    if stress < 0.0 {
        return Err(format!("Negative stress {stress}."));
    }

    Ok(LongRow {
        sample_id,
        temperature,
        sweep_direction: get_optional(record, header_map, "sweep_direction")
            .unwrap_or(DEFAULT_SWEEP_DIRECTION)
            .to_string(),
        experiment_type: get_optional(record, header_map, "experiment_type")
            .unwrap_or(DEFAULT_EXPERIMENT_TYPE)
            .to_string(),
        run: get_optional(record, header_map, "run").unwrap_or("1").to_string(),
        shear_rate,
        stress,
    })
}

fn open(path: &Path) -> Result<File, IngestError> {
    File::open(path).map_err(|source| IngestError::Open {
        path: path.display().to_string(),
        source,
    })
}

fn csv_reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes start with a UTF-8 BOM; without stripping
    // it the first column is reported missing.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_f64(s: &str, name: &str) -> Result<f64, String> {
    parse_cell(s).ok_or_else(|| format!("Invalid `{name}` value '{s}'."))
}

fn parse_cell(s: &str) -> Option<f64> {
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

fn is_blank(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case("nan")
}
