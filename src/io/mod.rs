//! Input/output helpers.
//!
//! - CSV ingest + unit normalization (`ingest`)
//! - sample metadata file (`samples`)
//! - persistent results table (`results`)
//! - residual exports (`export`)
//! - fit JSON read/write (`curve`)

pub mod curve;
pub mod export;
pub mod ingest;
pub mod results;
pub mod samples;

pub use curve::*;
pub use export::*;
pub use ingest::*;
pub use results::*;
pub use samples::*;
