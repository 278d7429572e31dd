//! Rheological flow-curve models.
//!
//! Models are implemented as small, pure functions so that fitting code can
//! stay generic; `ModelDescriptor` pairs a function with its parameter specs.

pub mod catalog;
pub mod model;

pub use catalog::catalog;
pub use model::*;
