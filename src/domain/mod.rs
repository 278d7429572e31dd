//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - input conventions (`RateUnit`, `StressUnit`, `InputLayout`, `Weighting`)
//! - flow-curve containers (`SampleSeries`, `MeasurementRun`, `SampleKey`)
//! - fit outputs (`FitResult`, `FitOutcome`, `FitFailure`, etc.)

pub mod types;

pub use types::*;
