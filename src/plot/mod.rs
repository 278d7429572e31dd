//! Flow-curve figures: Plotters file output and terminal ASCII plots.

pub mod ascii;
pub mod chart;
pub mod fonts;

pub use ascii::*;
pub use chart::*;
