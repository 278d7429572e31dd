//! Bounded Levenberg-Marquardt least squares.
//!
//! Box constraints are handled by optimizing in unbounded internal
//! coordinates `u` that map onto the feasible interval:
//!
//! ```text
//! [lo, hi]   x = lo + (sin(u) + 1) (hi - lo) / 2
//! [lo, +∞)   x = lo - 1 + sqrt(u² + 1)
//! (-∞, hi]   x = hi + 1 - sqrt(u² + 1)
//! (-∞, +∞)   x = u
//! ```
//!
//! The damped iteration itself is MINPACK's, via the `levenberg_marquardt`
//! crate; this module supplies the transformed problem and a forward-difference
//! Jacobian in internal coordinates.
//!
//! Standard errors are computed in external coordinates from a fresh
//! Jacobian at the optimum:
//!
//! ```text
//! cov = s² (JᵀJ)⁻¹,   s² = SSE / (n - p)
//! ```

use std::cell::Cell;

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use thiserror::Error;

use super::ols::normal_matrix_inverse;

/// Feasible interval of one parameter. Infinite ends mean "unbounded".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub const UNBOUNDED: Interval = Interval {
        lower: f64::NEG_INFINITY,
        upper: f64::INFINITY,
    };

    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }

    pub fn clamp(&self, x: f64) -> f64 {
        x.max(self.lower).min(self.upper)
    }

    /// True when `x` is within a relative tolerance of a finite end.
    pub fn touches(&self, x: f64) -> bool {
        let near = |b: f64| b.is_finite() && (x - b).abs() <= 1e-8 * b.abs().max(1.0);
        near(self.lower) || near(self.upper)
    }

    fn to_external(&self, u: f64) -> f64 {
        let (lo, hi) = (self.lower, self.upper);
        match (lo.is_finite(), hi.is_finite()) {
            (true, true) => lo + (u.sin() + 1.0) * (hi - lo) / 2.0,
            (true, false) => lo - 1.0 + (u * u + 1.0).sqrt(),
            (false, true) => hi + 1.0 - (u * u + 1.0).sqrt(),
            (false, false) => u,
        }
    }

    /// Inverse transform. Starting points on a bound are nudged inward so the
    /// transform's derivative is not zero at the first step.
    fn to_internal(&self, x: f64) -> f64 {
        let (lo, hi) = (self.lower, self.upper);
        let x = self.clamp(x);
        match (lo.is_finite(), hi.is_finite()) {
            (true, true) => {
                let s = (2.0 * (x - lo) / (hi - lo) - 1.0).clamp(-1.0, 1.0);
                s.asin().clamp(-NUDGE_ANGLE, NUDGE_ANGLE)
            }
            (true, false) => ((x - lo + 1.0).powi(2) - 1.0).sqrt().max(NUDGE),
            (false, true) => ((hi - x + 1.0).powi(2) - 1.0).sqrt().max(NUDGE),
            (false, false) => x,
        }
    }
}

const NUDGE: f64 = 1e-3;
const NUDGE_ANGLE: f64 = std::f64::consts::FRAC_PI_2 - 1e-3;

#[derive(Debug, Clone)]
pub struct LmSettings {
    /// Evaluation budget, in units of `free parameters + 1` residual calls.
    pub max_iterations: usize,
    /// Relative reduction of the cost below which the solver stops.
    pub ftol: f64,
    /// Relative step size below which the solver stops.
    pub xtol: f64,
    /// Cosine between residuals and Jacobian columns below which the solver stops.
    pub gtol: f64,
}

impl Default for LmSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: f64::EPSILON.sqrt(),
            xtol: f64::EPSILON.sqrt(),
            gtol: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LmError {
    #[error("parameter count {params} does not match bound count {bounds}")]
    DimensionMismatch { params: usize, bounds: usize },
    #[error("residuals are not finite at the starting point")]
    NonFiniteStart,
    #[error("no convergence after {iterations} evaluations")]
    NoConvergence { iterations: usize },
    #[error("solver stopped: {0}")]
    Solver(String),
}

#[derive(Debug, Clone)]
pub struct LmReport {
    /// Optimum in external (bounded) coordinates.
    pub params: Vec<f64>,
    pub residuals: Vec<f64>,
    /// Sum of squared residuals at the optimum.
    pub cost: f64,
    /// Residual evaluations made by the solver's own iteration.
    pub iterations: usize,
    /// Residual evaluations, Jacobian columns included.
    pub nfev: usize,
}

/// Residual value substituted for non-finite model output, so the solver
/// rejects the trial step instead of aborting.
const NON_FINITE_PENALTY: f64 = 1e100;

/// Least-squares problem over internal coordinates for `levenberg_marquardt`.
struct BoundedProblem<'a, F> {
    residual: F,
    bounds: &'a [Interval],
    u: DVector<f64>,
    r: DVector<f64>,
    nfev: Cell<usize>,
}

impl<F> BoundedProblem<'_, F>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    fn external(&self, u: &DVector<f64>) -> Vec<f64> {
        u.iter().zip(self.bounds).map(|(&ui, b)| b.to_external(ui)).collect()
    }

    fn eval(&self, u: &DVector<f64>) -> DVector<f64> {
        self.nfev.set(self.nfev.get() + 1);
        let r = (self.residual)(&self.external(u));
        DVector::from_iterator(
            r.len(),
            r.into_iter()
                .map(|v| if v.is_finite() { v } else { NON_FINITE_PENALTY }),
        )
    }
}

impl<F> LeastSquaresProblem<f64, Dyn, Dyn> for BoundedProblem<'_, F>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, u: &DVector<f64>) {
        self.r = self.eval(u);
        self.u.copy_from(u);
    }

    fn params(&self) -> DVector<f64> {
        self.u.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.r.clone())
    }

    /// Forward differences in internal coordinates.
    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let (n, p) = (self.r.len(), self.u.len());
        let mut jac = DMatrix::zeros(n, p);
        let mut stepped = self.u.clone();
        for k in 0..p {
            let h = f64::EPSILON.sqrt() * self.u[k].abs().max(1.0);
            stepped[k] = self.u[k] + h;
            let shifted = self.eval(&stepped);
            stepped[k] = self.u[k];
            if shifted.len() != n {
                return None;
            }
            jac.set_column(k, &((shifted - &self.r) / h));
        }
        Some(jac)
    }
}

/// Minimize `Σ r_i(p)²` over the box `bounds`.
///
/// `residual` maps external parameters to the residual vector; it is expected
/// to return a vector of fixed length.
pub fn minimize<F>(
    residual: F,
    start: &[f64],
    bounds: &[Interval],
    settings: &LmSettings,
) -> Result<LmReport, LmError>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    if start.len() != bounds.len() {
        return Err(LmError::DimensionMismatch {
            params: start.len(),
            bounds: bounds.len(),
        });
    }

    let first = residual(start);
    if first.iter().any(|v| !v.is_finite()) {
        return Err(LmError::NonFiniteStart);
    }
    if start.is_empty() {
        return Ok(LmReport {
            params: Vec::new(),
            cost: first.iter().map(|v| v * v).sum(),
            residuals: first,
            iterations: 0,
            nfev: 1,
        });
    }

    let u0 = DVector::from_iterator(start.len(), start.iter().zip(bounds).map(|(&x, b)| b.to_internal(x)));
    let mut problem = BoundedProblem {
        residual,
        bounds,
        u: u0.clone(),
        r: DVector::zeros(0),
        nfev: Cell::new(0),
    };
    problem.set_params(&u0);

    let solver = LevenbergMarquardt::new()
        .with_ftol(settings.ftol)
        .with_xtol(settings.xtol)
        .with_gtol(settings.gtol)
        .with_patience(settings.max_iterations.max(1));
    let (mut problem, report) = solver.minimize(problem);

    let iterations = report.number_of_evaluations;
    tracing::debug!(evaluations = iterations, termination = ?report.termination, "lm finished");

    match report.termination {
        ref t if t.was_successful() => {}
        // The current point is a minimum to working precision.
        TerminationReason::NoImprovementPossible(_) => {}
        TerminationReason::LostPatience => return Err(LmError::NoConvergence { iterations }),
        other => return Err(LmError::Solver(format!("{other:?}"))),
    }

    let best = problem.params();
    problem.set_params(&best);
    if problem.r.iter().any(|&v| v == NON_FINITE_PENALTY) {
        return Err(LmError::Solver("model output is not finite at the optimum".to_string()));
    }

    Ok(LmReport {
        params: problem.external(&best),
        residuals: problem.r.iter().copied().collect(),
        cost: problem.r.norm_squared(),
        iterations,
        nfev: problem.nfev.get(),
    })
}

/// Covariance of the free parameters at `params`, or `None` when the problem
/// has no spare degrees of freedom or `JᵀJ` is singular.
///
/// The Jacobian is taken in external coordinates; steps that would leave the
/// feasible box are taken backwards instead.
pub fn covariance<F>(residual: F, params: &[f64], bounds: &[Interval], cost: f64) -> Option<DMatrix<f64>>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let base = residual(params);
    let n = base.len();
    let p = params.len();
    if n <= p || p == 0 {
        return None;
    }

    let mut jac = DMatrix::zeros(n, p);
    let mut stepped = params.to_vec();
    for k in 0..p {
        let x = params[k];
        let mut h = f64::EPSILON.sqrt() * x.abs().max(1e-3);
        if !bounds[k].contains(x + h) {
            h = -h;
        }
        stepped[k] = x + h;
        let shifted = residual(&stepped);
        stepped[k] = x;
        if shifted.len() != n {
            return None;
        }
        for i in 0..n {
            let d = (shifted[i] - base[i]) / h;
            if !d.is_finite() {
                return None;
            }
            jac[(i, k)] = d;
        }
    }

    let s2 = cost / (n - p) as f64;
    normal_matrix_inverse(&jac).map(|inv| inv * s2)
}
