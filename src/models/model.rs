//! Model evaluation and immutable model descriptors.
//!
//! A model is a closed-form stress-vs-shear-rate function plus a fixed list
//! of parameter specs. Descriptors are never mutated: the `with_*` methods
//! return adjusted copies that are then passed explicitly into the fitter.

use thiserror::Error;

use crate::domain::ModelKind;
use crate::math::Interval;

/// Predict the stress at shear rate `x` for the given model kind.
///
/// `p` holds the parameters in descriptor order.
///
/// # Panics
/// Panics if `p` is shorter than the model's parameter count. Callers should
/// size parameter vectors from the descriptor.
pub fn predict(model: ModelKind, x: f64, p: &[f64]) -> f64 {
    match model {
        ModelKind::ConstantStress => p[0],
        ModelKind::Newtonian => p[0] * x,
        ModelKind::PowerLaw => p[0] * x.powf(p[1]),
        ModelKind::Bingham => p[0] + p[1] * x,
        ModelKind::Tc => {
            let (ys, eta, gdc) = (p[0], p[1], p[2]);
            ys + ys * (x / gdc).sqrt() + eta * x
        }
        ModelKind::Tcn => {
            let (ys, eta, gdc, n) = (p[0], p[1], p[2], p[3]);
            ys + ys * (x / gdc).powf(n) + eta * x
        }
        ModelKind::Tcalt => {
            let (ys, eta, gc) = (p[0], p[1], p[2]);
            ys + ys * (x * eta / (gc * ys)).sqrt() + eta * x
        }
        ModelKind::Hb => p[0] + p[1] * x.powf(p[2]),
        ModelKind::Casson => {
            let root = p[0].sqrt() + (p[1] * x).sqrt();
            root * root
        }
        ModelKind::Carreau => {
            let (eta0, gdc, n) = (p[0], p[1], p[2]);
            x * eta0 * (1.0 + (x / gdc).powi(2)).powf((n - 1.0) / 2.0)
        }
        ModelKind::Cross => {
            let (eta_inf, eta0, n, gdc) = (p[0], p[1], p[2], p[3]);
            x * eta_inf + x * (eta0 - eta_inf) / (1.0 + (x / gdc).powf(n))
        }
        ModelKind::StretchedExp => {
            let (max_stress, tau, beta) = (p[0], p[1], p[2]);
            max_stress * (1.0 - (-x / tau).exp()).powf(beta)
        }
    }
}

/// Closed-form expression, for listings.
pub fn expression(model: ModelKind) -> &'static str {
    match model {
        ModelKind::ConstantStress => "σ = σy",
        ModelKind::Newtonian => "σ = η·γ̇",
        ModelKind::PowerLaw => "σ = K·γ̇^n",
        ModelKind::Bingham => "σ = σy + ηbg·γ̇",
        ModelKind::Tc => "σ = σy + σy·(γ̇/γ̇c)^0.5 + ηbg·γ̇",
        ModelKind::Tcn => "σ = σy + σy·(γ̇/γ̇c)^n + ηbg·γ̇",
        ModelKind::Tcalt => "σ = σy + σy·(γ̇·ηbg/(γc·σy))^0.5 + ηbg·γ̇",
        ModelKind::Hb => "σ = σy + K·γ̇^n",
        ModelKind::Casson => "σ = (σy^0.5 + (ηbg·γ̇)^0.5)²",
        ModelKind::Carreau => "σ = γ̇·η0·(1 + (γ̇/γ̇c)²)^((n-1)/2)",
        ModelKind::Cross => "σ = γ̇·η∞ + γ̇·(η0 - η∞)/(1 + (γ̇/γ̇c)^n)",
        ModelKind::StretchedExp => "σ = σmax·(1 - exp(-t/τ))^β",
    }
}

/// One parameter of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    /// Short label for plots and tables.
    pub symbol: &'static str,
    pub unit: &'static str,
    pub default: f64,
    pub bounds: Interval,
    pub fixed: bool,
}

impl ParamSpec {
    pub(crate) const fn free(
        name: &'static str,
        symbol: &'static str,
        unit: &'static str,
        default: f64,
        lower: f64,
        upper: f64,
    ) -> Self {
        Self {
            name,
            symbol,
            unit,
            default,
            bounds: Interval { lower, upper },
            fixed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("model {model} has no parameter named `{name}`")]
    UnknownParameter { model: ModelKind, name: String },
    #[error("invalid bounds [{lower}, {upper}] for `{name}`")]
    InvalidBounds { name: String, lower: f64, upper: f64 },
}

/// A named model function plus its parameter specs.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    kind: ModelKind,
    params: Vec<ParamSpec>,
}

impl ModelDescriptor {
    pub(crate) fn new(kind: ModelKind, params: Vec<ParamSpec>) -> Self {
        Self { kind, params }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.display_name()
    }

    pub fn expression(&self) -> &'static str {
        expression(self.kind)
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn defaults(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.default).collect()
    }

    pub fn n_free(&self) -> usize {
        self.params.iter().filter(|p| !p.fixed).count()
    }

    pub fn predict(&self, x: f64, params: &[f64]) -> f64 {
        predict(self.kind, x, params)
    }

    /// Copy with a different starting value for `name`.
    pub fn with_default(&self, name: &str, value: f64) -> Result<Self, ModelError> {
        self.adjusted(name, |p| p.default = value)
    }

    /// Copy with new bounds for `name`.
    pub fn with_bounds(&self, name: &str, lower: f64, upper: f64) -> Result<Self, ModelError> {
        if lower.is_nan() || upper.is_nan() || lower > upper {
            return Err(ModelError::InvalidBounds {
                name: name.to_string(),
                lower,
                upper,
            });
        }
        self.adjusted(name, |p| p.bounds = Interval::new(lower, upper))
    }

    /// Copy with `name` held constant at `value`.
    pub fn with_fixed(&self, name: &str, value: f64) -> Result<Self, ModelError> {
        self.adjusted(name, |p| {
            p.default = value;
            p.fixed = true;
        })
    }

    fn adjusted(&self, name: &str, f: impl FnOnce(&mut ParamSpec)) -> Result<Self, ModelError> {
        let mut next = self.clone();
        let spec = next
            .params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| ModelError::UnknownParameter {
                model: self.kind,
                name: name.to_string(),
            })?;
        f(spec);
        Ok(next)
    }
}
