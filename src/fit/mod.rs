//! Curve fitting orchestration.
//!
//! Responsibilities:
//!
//! - fit one model to one series (bounded least squares, tagged outcome)
//! - rank several models by BIC
//! - run the HB + TC analysis per sample and derive TC quantities
//! - batch many samples in parallel

pub mod analysis;
pub mod batch;
pub mod derived;
pub mod fitter;
pub mod grid;
pub mod selection;

pub use analysis::*;
pub use batch::*;
pub use derived::*;
pub use fitter::*;
pub use grid::*;
pub use selection::*;
