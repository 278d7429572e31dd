//! Reporting utilities: residual rankings and formatted terminal output.

pub mod format;

pub use format::*;

use crate::io::PointResidual;

/// The `top_n` points furthest from the fit, by relative residual.
///
/// Points without a finite relative residual (zero stress) sort last.
pub fn largest_residuals(residuals: &[PointResidual], top_n: usize) -> Vec<PointResidual> {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| {
        let ka = if a.relative.is_finite() { a.relative.abs() } else { -1.0 };
        let kb = if b.relative.is_finite() { b.relative.abs() } else { -1.0 };
        kb.total_cmp(&ka)
    });
    sorted.truncate(top_n);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, relative: f64) -> PointResidual {
        PointResidual {
            shear_rate: x,
            stress: 1.0,
            stress_fit: 1.0 - relative,
            residual: relative,
            relative,
        }
    }

    #[test]
    fn ranks_by_magnitude_of_relative_residual() {
        let residuals = vec![point(1.0, 0.01), point(2.0, -0.2), point(3.0, f64::NAN), point(4.0, 0.05)];
        let top = largest_residuals(&residuals, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].shear_rate, 2.0);
        assert_eq!(top[1].shear_rate, 4.0);

        let all = largest_residuals(&residuals, 10);
        assert_eq!(all.last().unwrap().shear_rate, 3.0);
    }
}
