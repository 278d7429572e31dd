//! Built-in rheological models with their default starts and bounds.

use crate::domain::ModelKind;

use super::model::{ModelDescriptor, ParamSpec};

const INF: f64 = f64::INFINITY;

const YSTRESS: ParamSpec = ParamSpec::free("ystress", "σy", "Pa", 1.0, 0.0, INF);
const ETA_BG: ParamSpec = ParamSpec::free("eta_bg", "ηbg", "Pa·s", 0.1, 0.0, INF);
const GAMMADOT_CRIT: ParamSpec = ParamSpec::free("gammadot_crit", "γ̇c", "1/s", 0.1, 0.0, INF);
const THINNING_N: ParamSpec = ParamSpec::free("n", "n", "", 0.5, 0.0, 1.0);
/// Power-law index; shear thickening (`n > 1`) is allowed.
const FLOW_INDEX_N: ParamSpec = ParamSpec::free("n", "n", "", 0.5, 0.0, INF);

impl ModelKind {
    /// Fresh descriptor with the default starts and bounds for this model.
    pub fn descriptor(self) -> ModelDescriptor {
        let params = match self {
            ModelKind::ConstantStress => vec![YSTRESS],
            ModelKind::Newtonian => vec![ParamSpec::free("eta", "η", "Pa·s", 0.1, 0.0, INF)],
            ModelKind::PowerLaw => vec![ParamSpec::free("K", "K", "Pa·sⁿ", 0.1, 0.0, INF), FLOW_INDEX_N],
            ModelKind::Bingham => vec![YSTRESS, ETA_BG],
            ModelKind::Tc => vec![YSTRESS, ETA_BG, GAMMADOT_CRIT],
            ModelKind::Tcn => vec![YSTRESS, ETA_BG, GAMMADOT_CRIT, THINNING_N],
            ModelKind::Tcalt => vec![
                YSTRESS,
                ETA_BG,
                ParamSpec::free("gamma_crit", "γc", "", 1.0, 0.0, 10.0),
            ],
            ModelKind::Hb => vec![YSTRESS, ParamSpec::free("K", "K", "Pa·sⁿ", 1.0, 0.0, INF), THINNING_N],
            ModelKind::Casson => vec![YSTRESS, ETA_BG],
            ModelKind::Carreau => vec![
                ParamSpec::free("eta_0", "η0", "Pa·s", 1.0, 0.0, INF),
                ParamSpec::free("gammadot_crit", "γ̇c", "1/s", 1.0, 0.0, INF),
                THINNING_N,
            ],
            ModelKind::Cross => vec![
                ParamSpec::free("eta_inf", "η∞", "Pa·s", 0.001, 0.0, INF),
                ParamSpec::free("eta_0", "η0", "Pa·s", 1.0, 0.0, INF),
                THINNING_N,
                ParamSpec::free("gammadot_crit", "γ̇c", "1/s", 1.0, 0.0, INF),
            ],
            ModelKind::StretchedExp => vec![
                ParamSpec::free("max_stress", "σmax", "Pa", 10.0, 0.0, INF),
                ParamSpec::free("tau", "τ", "s", 50.0, 0.0, INF),
                ParamSpec::free("beta", "β", "", 0.3, 0.0, 2.0),
            ],
        };
        ModelDescriptor::new(self, params)
    }
}

/// Every built-in model, in listing order.
pub fn catalog() -> Vec<ModelDescriptor> {
    ModelKind::ALL.iter().map(|k| k.descriptor()).collect()
}
