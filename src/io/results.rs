//! Persistent results table.
//!
//! One row per (sample, temperature) with the rounded HB and TC parameters,
//! their errors and the derived critical strain. The table lives in memory;
//! callers decide when to load and when to save. Saving rewrites the whole
//! file through a sibling temporary file and a rename.
//!
//! The store is single-writer: two processes saving the same path race and
//! the last rename wins.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fit::FlowCurveFits;
use crate::io::samples::SampleMeta;

/// Column order of the results table.
pub const RESULT_COLUMNS: [&str; 19] = [
    "sample_id",
    "w_percent",
    "solvent",
    "microgel_type",
    "temperature",
    "tauc_HB",
    "err_taucHB",
    "K",
    "err_K",
    "n",
    "err_n",
    "tauc_TC",
    "err_taucTC",
    "etas",
    "err_etas",
    "gamma_dotc",
    "err_gammadotc",
    "gammac",
    "err_gammac",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read results table '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("results table '{path}' has unexpected columns: {found}")]
    Columns { path: String, found: String },
    #[error("failed to write results table '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize results row: {0}")]
    Serialize(csv::Error),
}

/// One analyzed sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsRow {
    pub sample_id: String,
    pub w_percent: Option<f64>,
    pub solvent: Option<String>,
    pub microgel_type: Option<String>,
    pub temperature: f64,
    #[serde(rename = "tauc_HB")]
    pub tauc_hb: f64,
    #[serde(rename = "err_taucHB")]
    pub err_tauc_hb: f64,
    #[serde(rename = "K")]
    pub k: f64,
    #[serde(rename = "err_K")]
    pub err_k: f64,
    pub n: f64,
    pub err_n: f64,
    #[serde(rename = "tauc_TC")]
    pub tauc_tc: f64,
    #[serde(rename = "err_taucTC")]
    pub err_tauc_tc: f64,
    pub etas: f64,
    pub err_etas: f64,
    pub gamma_dotc: f64,
    pub err_gammadotc: f64,
    pub gammac: f64,
    pub err_gammac: f64,
}

impl ResultsRow {
    pub fn from_fits(fits: &FlowCurveFits, meta: Option<&SampleMeta>) -> Self {
        Self {
            sample_id: fits.key.sample_id.clone(),
            w_percent: meta.and_then(|m| m.concentration),
            solvent: meta.and_then(|m| m.solvent.clone()),
            microgel_type: meta.and_then(|m| m.microgel_type.clone()),
            temperature: fits.key.temperature,
            tauc_hb: fits.hb.ystress.value,
            err_tauc_hb: fits.hb.ystress.uncertainty,
            k: fits.hb.k.value,
            err_k: fits.hb.k.uncertainty,
            n: fits.hb.n.value,
            err_n: fits.hb.n.uncertainty,
            tauc_tc: fits.tc.ystress.value,
            err_tauc_tc: fits.tc.ystress.uncertainty,
            etas: fits.tc.etas.value,
            err_etas: fits.tc.etas.uncertainty,
            gamma_dotc: fits.tc.gamma_dotc.value,
            err_gammadotc: fits.tc.gamma_dotc.uncertainty,
            gammac: fits.gammac.value,
            err_gammac: fits.gammac.uncertainty,
        }
    }

    pub fn matches(&self, sample_id: &str, temperature: f64) -> bool {
        self.sample_id == sample_id && self.temperature == temperature
    }
}

/// In-memory results table with explicit load/save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsStore {
    rows: Vec<ResultsRow>,
}

impl ResultsStore {
    /// A fresh table with no rows (replace mode).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load `path`; a missing file is an empty table.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let shown = path.display().to_string();
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %shown, "no results table yet; starting empty");
                return Ok(Self::empty());
            }
            Err(e) => {
                return Err(StoreError::Read {
                    path: shown,
                    source: csv::Error::from(e),
                });
            }
        };

        let mut reader = csv::Reader::from_reader(file);
        let headers = reader
            .headers()
            .map_err(|source| StoreError::Read {
                path: shown.clone(),
                source,
            })?
            .clone();
        if !headers.iter().eq(RESULT_COLUMNS.iter().copied()) {
            return Err(StoreError::Columns {
                path: shown,
                found: headers.iter().collect::<Vec<_>>().join(","),
            });
        }

        let rows = reader
            .deserialize()
            .collect::<Result<Vec<ResultsRow>, _>>()
            .map_err(|source| StoreError::Read { path: shown, source })?;
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[ResultsRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, sample_id: &str, temperature: f64) -> Option<&ResultsRow> {
        self.rows.iter().find(|r| r.matches(sample_id, temperature))
    }

    /// Add `row`, replacing an existing row with the same key in place.
    ///
    /// Returns true when a row was replaced.
    pub fn append(&mut self, row: ResultsRow) -> bool {
        match self
            .rows
            .iter_mut()
            .find(|r| r.matches(&row.sample_id, row.temperature))
        {
            Some(existing) => {
                *existing = row;
                true
            }
            None => {
                self.rows.push(row);
                false
            }
        }
    }

    /// Rewrite `path` with the whole table.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let shown = path.display().to_string();
        let write_err = |source: std::io::Error| StoreError::Write {
            path: shown.clone(),
            source,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let tmp = temp_path(path);
        let file = File::create(&tmp).map_err(write_err)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(RESULT_COLUMNS).map_err(StoreError::Serialize)?;
        for row in &self.rows {
            writer.serialize(row).map_err(StoreError::Serialize)?;
        }
        writer.flush().map_err(write_err)?;
        drop(writer);

        fs::rename(&tmp, path).map_err(write_err)?;
        tracing::debug!(path = %shown, rows = self.rows.len(), "results table saved");
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
