//! Quantities derived from fitted parameters.
//!
//! The Three-Component fit gives a yield stress `tauc`, a critical shear rate
//! `gamma_dotc` and a background viscosity `etas`. From those:
//!
//! ```text
//! gammac         = gamma_dotc · etas / tauc
//! err_gammac     = err_gdc · etas / tauc
//!                + err_tauc · gamma_dotc · etas / tauc²
//!                + err_etas · gamma_dotc / tauc
//! crossover rate = tauc / etas
//! ```
//!
//! The error of `gammac` is a linearized, first-order propagation that treats
//! the three input errors as uncorrelated and adds their magnitudes. It is an
//! approximation, not an exact confidence bound; the fit covariance is not
//! used.

use crate::domain::ParameterEstimate;
use crate::math::{round_physical, RoundedValue, RoundingError};

/// Round a fitted estimate against its own standard error.
///
/// A zero or missing standard error leaves the value unrounded with zero
/// uncertainty instead of failing.
pub fn round_estimate(estimate: &ParameterEstimate) -> RoundedValue {
    round_or_raw(estimate.value, estimate.stderr.unwrap_or(0.0))
}

/// `round_physical`, falling back to the raw value when the uncertainty is
/// zero or not finite.
pub fn round_or_raw(value: f64, uncertainty: f64) -> RoundedValue {
    match round_physical(value, uncertainty) {
        Ok(r) => r,
        Err(RoundingError::ZeroUncertainty { value }) => {
            tracing::debug!(value, "zero uncertainty; value left unrounded");
            RoundedValue::unrounded(value)
        }
        Err(RoundingError::NonFinite { .. }) => RoundedValue::unrounded(value),
    }
}

/// Critical strain `gammac` and its first-order error.
///
/// Returns `None` when `tauc` is zero (the ratio is undefined).
pub fn critical_strain(
    tauc: f64,
    err_tauc: f64,
    gamma_dotc: f64,
    err_gamma_dotc: f64,
    etas: f64,
    err_etas: f64,
) -> Option<(f64, f64)> {
    if tauc == 0.0 {
        return None;
    }
    let gammac = gamma_dotc * etas / tauc;
    let err = err_gamma_dotc * etas / tauc
        + err_tauc * gamma_dotc * etas / (tauc * tauc)
        + err_etas * gamma_dotc / tauc;
    (gammac.is_finite() && err.is_finite()).then_some((gammac, err))
}

/// Shear rate above which the viscous term dominates the yield stress.
pub fn crossover_rate(tauc: f64, etas: f64) -> Option<f64> {
    (etas > 0.0).then(|| tauc / etas).filter(|r| r.is_finite())
}
