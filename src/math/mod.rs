//! Numerical building blocks: physical rounding, ordered merge, linear solves
//! and the bounded Levenberg-Marquardt solver.

pub mod lm;
pub mod merge;
pub mod ols;
pub mod rounding;

pub use lm::{Interval, LmError, LmReport, LmSettings};
pub use merge::{merge_runs, merge_with_provenance, MergeError, MergedSeries, Provenance, Source};
pub use ols::*;
pub use rounding::{round_physical, round_significant, round_to_decimals, RoundedValue, RoundingError};
