//! Application-level error type.
//!
//! Library modules report failures through their own `thiserror` enums
//! (`RoundingError`, `MergeError`, `IngestError`, `StoreError`, ...). At the
//! application boundary those are folded into an `AppError`, which carries the
//! process exit code alongside a human-readable message.
//!
//! Exit codes:
//! - `2`: invalid input or configuration
//! - `3`: no usable data
//! - `4`: numerical / fitting failure
//! - `5`: failed to write an output artifact

use thiserror::Error;

use crate::io::{IngestError, SampleConfigError, StoreError};
use crate::math::{MergeError, RoundingError};
use crate::models::ModelError;

#[derive(Clone, Error)]
#[error("{message}")]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let code = match err {
            IngestError::NoRows { .. } => 3,
            _ => 2,
        };
        AppError::new(code, err.to_string())
    }
}

impl From<SampleConfigError> for AppError {
    fn from(err: SampleConfigError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let code = match err {
            StoreError::Write { .. } | StoreError::Serialize(_) => 5,
            _ => 2,
        };
        AppError::new(code, err.to_string())
    }
}

impl From<MergeError> for AppError {
    fn from(err: MergeError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<RoundingError> for AppError {
    fn from(err: RoundingError) -> Self {
        AppError::new(4, err.to_string())
    }
}
