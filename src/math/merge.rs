//! Ordered merge of two (x, y) sample sets with provenance.
//!
//! Repeated measurements of the same flow curve are combined into a single
//! series before fitting. Each input is stably sorted by x, then a two-pointer
//! merge interleaves them while recording, for every output position, which
//! input and which original offset the point came from. The y values are pulled
//! through that record, so a point can never pick up the wrong partner.
//!
//! Equal x values across inputs are emitted first-input first; within one input
//! the original order is kept.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::SampleSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    First,
    Second,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::First => f.write_str("first input"),
            Source::Second => f.write_str("second input"),
        }
    }
}

/// Where a merged point came from: input and offset in that (unsorted) input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub input: Source,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error("{which}: x has {x_len} values but y has {y_len}")]
    LengthMismatch {
        which: Source,
        x_len: usize,
        y_len: usize,
    },
    #[error("{which}: non-finite x value {value} at offset {offset}")]
    NonFinite {
        which: Source,
        offset: usize,
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedSeries {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub provenance: Vec<Provenance>,
}

impl MergedSeries {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Merge `(x1, y1)` and `(x2, y2)` into one series ordered by x.
pub fn merge_with_provenance(
    x1: &[f64],
    y1: &[f64],
    x2: &[f64],
    y2: &[f64],
) -> Result<MergedSeries, MergeError> {
    let order1 = sorted_offsets(Source::First, x1, y1)?;
    let order2 = sorted_offsets(Source::Second, x2, y2)?;

    let total = order1.len() + order2.len();
    let mut provenance = Vec::with_capacity(total);

    let (mut i, mut j) = (0usize, 0usize);
    while i < order1.len() && j < order2.len() {
        let (a, b) = (order1[i], order2[j]);
        if x1[a] <= x2[b] {
            provenance.push(Provenance { input: Source::First, offset: a });
            i += 1;
        } else {
            provenance.push(Provenance { input: Source::Second, offset: b });
            j += 1;
        }
    }
    provenance.extend(order1[i..].iter().map(|&a| Provenance { input: Source::First, offset: a }));
    provenance.extend(order2[j..].iter().map(|&b| Provenance { input: Source::Second, offset: b }));

    let mut x = Vec::with_capacity(total);
    let mut y = Vec::with_capacity(total);
    for p in &provenance {
        let (xs, ys) = match p.input {
            Source::First => (x1, y1),
            Source::Second => (x2, y2),
        };
        x.push(xs[p.offset]);
        y.push(ys[p.offset]);
    }

    Ok(MergedSeries { x, y, provenance })
}

/// Fold any number of runs into one ordered series.
///
/// Earlier runs win ties against later ones. The label of the first run is
/// kept.
pub fn merge_runs(runs: &[SampleSeries]) -> Result<SampleSeries, MergeError> {
    let label = runs.first().map(|r| r.label.clone()).unwrap_or_default();
    let mut acc = SampleSeries::new(label, Vec::new(), Vec::new());

    for run in runs {
        let merged = merge_with_provenance(&acc.shear_rate, &acc.stress, &run.shear_rate, &run.stress)?;
        acc.shear_rate = merged.x;
        acc.stress = merged.y;
    }

    Ok(acc)
}

fn sorted_offsets(which: Source, x: &[f64], y: &[f64]) -> Result<Vec<usize>, MergeError> {
    if x.len() != y.len() {
        return Err(MergeError::LengthMismatch {
            which,
            x_len: x.len(),
            y_len: y.len(),
        });
    }
    if let Some((offset, &value)) = x.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(MergeError::NonFinite { which, offset, value });
    }

    let mut order: Vec<usize> = (0..x.len()).collect();
    // `sort_by` is stable: equal x keep their input order.
    order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn interleaves_and_keeps_partners() {
        let m = merge_with_provenance(&[1.0, 3.0], &[10.0, 30.0], &[2.0, 4.0], &[20.0, 40.0]).unwrap();
        assert_eq!(m.x, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(m.y, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(
            m.provenance,
            vec![
                Provenance { input: Source::First, offset: 0 },
                Provenance { input: Source::Second, offset: 0 },
                Provenance { input: Source::First, offset: 1 },
                Provenance { input: Source::Second, offset: 1 },
            ]
        );
    }

    #[test]
    fn ties_take_first_input_first() {
        let m = merge_with_provenance(&[1.0, 2.0], &[10.0, 20.0], &[2.0, 1.0], &[200.0, 100.0]).unwrap();
        assert_eq!(m.x, vec![1.0, 1.0, 2.0, 2.0]);
        assert_eq!(m.y, vec![10.0, 100.0, 20.0, 200.0]);
        assert_eq!(m.provenance[1], Provenance { input: Source::Second, offset: 1 });
    }

    #[test]
    fn duplicates_within_one_input_keep_order() {
        let m = merge_with_provenance(&[5.0, 1.0, 5.0], &[1.0, 2.0, 3.0], &[], &[]).unwrap();
        assert_eq!(m.x, vec![1.0, 5.0, 5.0]);
        assert_eq!(m.y, vec![2.0, 1.0, 3.0]);
    }

    #[test]
    fn empty_inputs_are_fine() {
        let m = merge_with_provenance(&[], &[], &[], &[]).unwrap();
        assert!(m.is_empty());

        let m = merge_with_provenance(&[], &[], &[3.0, 1.0], &[30.0, 10.0]).unwrap();
        assert_eq!(m.x, vec![1.0, 3.0]);
        assert_eq!(m.y, vec![10.0, 30.0]);
    }

    #[test]
    fn rejects_bad_input() {
        let err = merge_with_provenance(&[1.0], &[1.0, 2.0], &[], &[]).unwrap_err();
        assert!(matches!(err, MergeError::LengthMismatch { which: Source::First, .. }));

        let err = merge_with_provenance(&[], &[], &[1.0, f64::NAN], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, MergeError::NonFinite { which: Source::Second, offset: 1, .. }));
    }

    #[test]
    fn random_inputs_keep_length_order_and_pairs() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let m = rng.gen_range(0..20);
            let n = rng.gen_range(0..20);
            let x1: Vec<f64> = (0..m).map(|_| rng.gen_range(0..10) as f64).collect();
            let x2: Vec<f64> = (0..n).map(|_| rng.gen_range(0..10) as f64).collect();
            // y encodes its origin so a wrong pairing is detectable.
            let y1: Vec<f64> = (0..m).map(|i| 1000.0 + i as f64).collect();
            let y2: Vec<f64> = (0..n).map(|i| 2000.0 + i as f64).collect();

            let merged = merge_with_provenance(&x1, &y1, &x2, &y2).unwrap();
            assert_eq!(merged.len(), m + n);
            assert_eq!(merged.y.len(), m + n);
            assert!(merged.x.windows(2).all(|w| w[0] <= w[1]));

            for (k, p) in merged.provenance.iter().enumerate() {
                let (xs, ys) = match p.input {
                    Source::First => (&x1, &y1),
                    Source::Second => (&x2, &y2),
                };
                assert_eq!(merged.x[k], xs[p.offset]);
                assert_eq!(merged.y[k], ys[p.offset]);
            }
        }
    }

    #[test]
    fn merge_runs_folds_all_runs() {
        let runs = vec![
            SampleSeries::new("run1", vec![1.0, 10.0], vec![2.0, 20.0]),
            SampleSeries::new("run2", vec![5.0], vec![9.0]),
            SampleSeries::new("run3", vec![0.5, 10.0], vec![1.0, 21.0]),
        ];
        let merged = merge_runs(&runs).unwrap();
        assert_eq!(merged.label, "run1");
        assert_eq!(merged.shear_rate, vec![0.5, 1.0, 5.0, 10.0, 10.0]);
        assert_eq!(merged.stress, vec![1.0, 2.0, 9.0, 20.0, 21.0]);
    }
}
