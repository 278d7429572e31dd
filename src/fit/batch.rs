//! Batch analysis over many samples.
//!
//! Samples share no state, so they are analyzed on rayon's pool. Output
//! order matches input order, and a failing sample only affects its own slot.

use rayon::prelude::*;
use serde::Serialize;

use crate::domain::{SampleKey, SampleSeries};
use crate::fit::analysis::{analyze_runs, SampleOutcome};
use crate::fit::fitter::FitOptions;

/// The runs of one sample, ready to analyze.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub key: SampleKey,
    pub runs: Vec<SampleSeries>,
}

/// Counts per outcome kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub fitted: usize,
    pub no_data: usize,
    pub invalid: usize,
    pub failed: usize,
    pub no_high_shear: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[SampleOutcome]) -> Self {
        let mut s = BatchSummary::default();
        for o in outcomes {
            match o {
                SampleOutcome::Fitted(_) => s.fitted += 1,
                SampleOutcome::NoData { .. } => s.no_data += 1,
                SampleOutcome::InvalidData { .. } => s.invalid += 1,
                SampleOutcome::FitFailed { .. } => s.failed += 1,
                SampleOutcome::NoHighShearRegime { .. } => s.no_high_shear += 1,
            }
        }
        s
    }

    pub fn total(&self) -> usize {
        self.fitted + self.no_data + self.invalid + self.failed + self.no_high_shear
    }
}

/// Analyze every item; one outcome per item, in input order.
pub fn run_batch(items: &[BatchItem], opts: &FitOptions) -> Vec<SampleOutcome> {
    items
        .par_iter()
        .map(|item| {
            let outcome = analyze_runs(item.key.clone(), &item.runs, opts);
            log_outcome(&outcome);
            outcome
        })
        .collect()
}

fn log_outcome(outcome: &SampleOutcome) {
    let key = outcome.key();
    match outcome {
        SampleOutcome::Fitted(_) => {
            tracing::info!(sample = %key.sample_id, temperature = key.temperature, "{}", outcome.describe());
        }
        SampleOutcome::NoData { .. } => {
            tracing::warn!(sample = %key.sample_id, temperature = key.temperature, "empty data set");
        }
        _ => {
            tracing::warn!(sample = %key.sample_id, temperature = key.temperature, "{}", outcome.describe());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelKind;
    use crate::fit::log_space;
    use crate::models::predict;

    fn tc_item(id: &str, ys: f64) -> BatchItem {
        let xs = log_space(1e-2, 1e3, 30).unwrap();
        let stress = xs
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let s = predict(ModelKind::Tc, x, &[ys, 0.05, 1.0]);
                s * if i % 3 == 0 { 1.004 } else { 0.998 }
            })
            .collect();
        BatchItem {
            key: SampleKey::new(id, 20.0),
            runs: vec![SampleSeries::new(id, xs, stress)],
        }
    }

    #[test]
    fn one_bad_sample_does_not_spoil_the_batch() {
        let zero = BatchItem {
            key: SampleKey::new("zero", 20.0),
            runs: vec![SampleSeries::new("zero", vec![0.1, 1.0, 10.0, 100.0], vec![0.0; 4])],
        };
        let empty = BatchItem {
            key: SampleKey::new("empty", 20.0),
            runs: Vec::new(),
        };
        let items = vec![tc_item("a", 5.0), zero, tc_item("b", 8.0), empty];

        let outcomes = run_batch(&items, &FitOptions::default());
        assert_eq!(outcomes.len(), 4);

        let ids: Vec<_> = outcomes.iter().map(|o| o.key().sample_id.as_str()).collect();
        assert_eq!(ids, ["a", "zero", "b", "empty"]);

        let a = outcomes[0].fitted().expect("a fitted");
        assert!((a.tc.ystress.value - 5.0).abs() / 5.0 < 0.05);
        let b = outcomes[2].fitted().expect("b fitted");
        assert!((b.tc.ystress.value - 8.0).abs() / 8.0 < 0.05);

        assert!(matches!(outcomes[1], SampleOutcome::FitFailed { .. }));
        assert!(matches!(outcomes[3], SampleOutcome::NoData { .. }));

        let summary = BatchSummary::from_outcomes(&outcomes);
        assert_eq!(summary.fitted, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.no_data, 1);
        assert_eq!(summary.total(), 4);
    }
}
