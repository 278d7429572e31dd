//! Physical rounding of fitted values.
//!
//! A fitted value is only meaningful up to the first significant digit of its
//! standard error. `round_physical` rounds both numbers to that decimal:
//!
//! ```text
//! n = floor(log10(|e|))
//! (v, e) -> (round(v, -n), round(e, -n))
//! ```
//!
//! Rounding is half-to-even at the target decimal. When rounding the error
//! carries it into the next decade (0.96 -> 1.0) the exponent moves up by one
//! and both numbers are rounded again from the originals, so applying the
//! routine to its own output is a no-op.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoundingError {
    #[error("cannot round {value} against a zero uncertainty")]
    ZeroUncertainty { value: f64 },
    #[error("cannot round non-finite pair ({value}, {uncertainty})")]
    NonFinite { value: f64, uncertainty: f64 },
}

/// A value paired with its uncertainty, both rounded to a shared decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundedValue {
    pub value: f64,
    pub uncertainty: f64,
    /// Decade of the uncertainty's leading digit; `None` when the pair was
    /// passed through unrounded.
    pub exponent: Option<i32>,
}

impl RoundedValue {
    /// A raw value with no usable uncertainty.
    pub fn unrounded(value: f64) -> Self {
        Self {
            value,
            uncertainty: 0.0,
            exponent: None,
        }
    }

    pub fn is_rounded(&self) -> bool {
        self.exponent.is_some()
    }

    /// Number of decimals implied by the exponent (0 for exponents >= 0).
    pub fn decimals(&self) -> usize {
        match self.exponent {
            Some(n) if n < 0 => (-n) as usize,
            _ => 0,
        }
    }
}

impl fmt::Display for RoundedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exponent {
            Some(_) => {
                let d = self.decimals();
                write!(f, "{:.*} ± {:.*}", d, self.value, d, self.uncertainty)
            }
            None => write!(f, "{}", self.value),
        }
    }
}

/// Round `value` and `uncertainty` to the decimal of the uncertainty's
/// leading significant digit.
pub fn round_physical(value: f64, uncertainty: f64) -> Result<RoundedValue, RoundingError> {
    if !value.is_finite() || !uncertainty.is_finite() {
        return Err(RoundingError::NonFinite { value, uncertainty });
    }
    if uncertainty == 0.0 {
        return Err(RoundingError::ZeroUncertainty { value });
    }

    let mut n = decade(uncertainty.abs());
    let mut e = round_to_decimals(uncertainty, -n);
    if e.abs() >= 10f64.powi(n + 1) {
        n += 1;
        e = round_to_decimals(uncertainty, -n);
    }

    Ok(RoundedValue {
        value: round_to_decimals(value, -n),
        uncertainty: e,
        exponent: Some(n),
    })
}

/// Round `x` to its own leading significant digit (0.0234 -> 0.02).
///
/// Zero and non-finite inputs are returned unchanged.
pub fn round_significant(x: f64) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    round_to_decimals(x, -decade(x.abs()))
}

/// Round half-to-even at `decimals` places; negative values round to tens,
/// hundreds, and so on.
pub fn round_to_decimals(x: f64, decimals: i32) -> f64 {
    if decimals >= 0 {
        let scale = 10f64.powi(decimals);
        (x * scale).round_ties_even() / scale
    } else {
        let scale = 10f64.powi(-decimals);
        (x / scale).round_ties_even() * scale
    }
}

/// `floor(log10(x))` for positive finite `x`, corrected for libm error at
/// exact powers of ten.
fn decade(x: f64) -> i32 {
    let mut n = x.log10().floor() as i32;
    if 10f64.powi(n) > x {
        n -= 1;
    } else if 10f64.powi(n + 1) <= x {
        n += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rounds_to_leading_digit_of_error() {
        let r = round_physical(12.345, 0.6).unwrap();
        assert_eq!(r.exponent, Some(-1));
        assert_relative_eq!(r.value, 12.3, epsilon = 1e-12);
        assert_relative_eq!(r.uncertainty, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn rounding_is_idempotent() {
        let cases = [
            (12.345, 0.6),
            (0.123456, 0.000789),
            (1234.5, 96.0),
            (3.14159, 0.96),
            (-7.77, 0.0449),
            (5.0e-3, 1.0e-4),
        ];
        for (v, e) in cases {
            let once = round_physical(v, e).unwrap();
            let twice = round_physical(once.value, once.uncertainty).unwrap();
            assert_eq!(once, twice, "pair ({v}, {e})");
        }
    }

    #[test]
    fn carry_into_next_decade_bumps_exponent() {
        let r = round_physical(3.14159, 0.96).unwrap();
        assert_eq!(r.exponent, Some(0));
        assert_eq!(r.uncertainty, 1.0);
        assert_eq!(r.value, 3.0);
    }

    #[test]
    fn large_errors_round_to_tens() {
        let r = round_physical(1234.5, 56.0).unwrap();
        assert_eq!(r.exponent, Some(1));
        assert_eq!(r.value, 1230.0);
        assert_eq!(r.uncertainty, 60.0);
    }

    #[test]
    fn ties_round_to_even() {
        assert_eq!(round_to_decimals(2.5, 0), 2.0);
        assert_eq!(round_to_decimals(3.5, 0), 4.0);
        assert_eq!(round_to_decimals(250.0, -2), 200.0);
    }

    #[test]
    fn zero_uncertainty_is_an_error() {
        let err = round_physical(1.5, 0.0).unwrap_err();
        assert_eq!(err, RoundingError::ZeroUncertainty { value: 1.5 });
    }

    #[test]
    fn non_finite_inputs_are_rejected() {
        assert!(matches!(
            round_physical(f64::NAN, 0.1),
            Err(RoundingError::NonFinite { .. })
        ));
        assert!(matches!(
            round_physical(1.0, f64::INFINITY),
            Err(RoundingError::NonFinite { .. })
        ));
    }

    #[test]
    fn negative_uncertainty_uses_magnitude() {
        let r = round_physical(12.345, -0.6).unwrap();
        assert_relative_eq!(r.value, 12.3, epsilon = 1e-12);
        assert_relative_eq!(r.uncertainty, -0.6, epsilon = 1e-12);
    }

    #[test]
    fn significant_rounding_keeps_one_digit() {
        assert_relative_eq!(round_significant(0.0234), 0.02, epsilon = 1e-15);
        assert_eq!(round_significant(870.0), 900.0);
        assert_eq!(round_significant(0.0), 0.0);
    }

    #[test]
    fn display_uses_shared_decimals() {
        let r = round_physical(5.04, 0.23).unwrap();
        assert_eq!(r.to_string(), "5.0 ± 0.2");
        assert_eq!(RoundedValue::unrounded(1.25).to_string(), "1.25");
    }
}
