//! Sample metadata file (TOML).
//!
//! ```toml
//! [defaults]
//! unit_x = "s-1"
//! unit_y = "Pa"
//!
//! [samples.12]
//! concentration = 1.5
//! solvent = "water"
//! microgel_type = "pNIPAM"
//! unit_y = "dynes/cm2"
//! ```
//!
//! Every field is optional. Units not declared for a sample fall back to
//! `[defaults]`, then to the values given on the command line.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{RateUnit, StressUnit};
use crate::io::ingest::{UnitSpec, UnitTable};

#[derive(Debug, Error)]
pub enum SampleConfigError {
    #[error("failed to read sample metadata '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid sample metadata '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Metadata of one sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleMeta {
    /// Concentration in weight percent.
    pub concentration: Option<f64>,
    pub solvent: Option<String>,
    pub microgel_type: Option<String>,
    /// Solvent viscosity in Pa·s.
    pub solvent_viscosity: Option<f64>,
    pub unit_x: Option<RateUnit>,
    pub unit_y: Option<StressUnit>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitDefaults {
    pub unit_x: Option<RateUnit>,
    pub unit_y: Option<StressUnit>,
}

/// Parsed metadata file: sample id → metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleBook {
    #[serde(default)]
    pub defaults: UnitDefaults,
    #[serde(default)]
    pub samples: BTreeMap<String, SampleMeta>,
}

impl SampleBook {
    pub fn load(path: &Path) -> Result<Self, SampleConfigError> {
        let text = fs::read_to_string(path).map_err(|source| SampleConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    pub fn parse(text: &str, path: &str) -> Result<Self, SampleConfigError> {
        toml::from_str(text).map_err(|source| SampleConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn get(&self, sample_id: &str) -> Option<&SampleMeta> {
        self.samples.get(sample_id)
    }

    /// Resolved units for every listed sample; `fallback` fills gaps.
    pub fn unit_table(&self, fallback: UnitSpec) -> UnitTable {
        let default = UnitSpec {
            rate: self.defaults.unit_x.unwrap_or(fallback.rate),
            stress: self.defaults.unit_y.unwrap_or(fallback.stress),
        };
        let per_sample = self
            .samples
            .iter()
            .map(|(id, meta)| {
                let spec = UnitSpec {
                    rate: meta.unit_x.unwrap_or(default.rate),
                    stress: meta.unit_y.unwrap_or(default.stress),
                };
                (id.clone(), spec)
            })
            .collect();
        UnitTable { default, per_sample }
    }
}
