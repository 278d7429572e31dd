//! `rheo-fit` library crate.
//!
//! Fits rheological flow curves (shear stress against shear rate) of soft
//! glassy materials with the Herschel-Bulkley and three-component models,
//! rounds the estimates to their physical precision and keeps a results table
//! across runs.
//!
//! The binary (`rheo`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the fitting engine can be driven from other tools
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
