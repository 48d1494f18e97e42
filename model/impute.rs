//! Missing-probe imputation.
//!
//! `ImputingModel` decorates any evaluator: before delegating, it hands
//! the raw matrix and the wrapped model's full required probe panel to an
//! injected imputation function, which must return a matrix carrying a
//! value for every required probe. The decorator satisfies the same
//! capability as the evaluator it wraps, so the two are interchangeable
//! at every call site.
//!
//! The fill strategies here are deliberately simple; reference-panel
//! methods plug in through the same `ImputeFn` contract.

use std::sync::Arc;

use ahash::AHashSet;
use ndarray::Array2;

use crate::types::{MethylationMatrix, MethylationModel, PredictionTable};

/// An injectable imputation step: given the raw matrix and the probe ids
/// a model requires, produce a matrix that has a value for each of them.
/// Pure: called synchronously, exactly once per `predict`, never mutating
/// its input.
pub type ImputeFn = Arc<dyn Fn(&MethylationMatrix, &[String]) -> MethylationMatrix + Send + Sync>;

/// Wraps an evaluator with an imputation step.
pub struct ImputingModel<M> {
    inner: M,
    impute: ImputeFn,
}

impl<M: std::fmt::Debug> std::fmt::Debug for ImputingModel<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImputingModel")
            .field("inner", &self.inner)
            .field("impute", &"<fn>")
            .finish()
    }
}

impl<M: MethylationModel> ImputingModel<M> {
    pub fn new(inner: M, impute: ImputeFn) -> Self {
        Self { inner, impute }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn into_inner(self) -> M {
        self.inner
    }
}

impl<M: MethylationModel> MethylationModel for ImputingModel<M> {
    fn predict(&self, matrix: &MethylationMatrix) -> PredictionTable {
        let required = self.inner.methylation_sites();
        let filled = (self.impute)(matrix, &required);
        self.inner.predict(&filled)
    }

    fn methylation_sites(&self) -> Vec<String> {
        self.inner.methylation_sites()
    }
}

/// Fills every missing required measurement with a fixed constant.
pub fn constant_fill(value: f64) -> ImputeFn {
    Arc::new(move |matrix, required| fill_required(matrix, required, |_| value))
}

/// Fills every missing required measurement with the sample's mean over
/// its observed values. A sample with no observed values at all falls
/// back to 0.5, the midpoint of the beta scale.
pub fn sample_mean_fill() -> ImputeFn {
    Arc::new(|matrix, required| {
        let n_samples = matrix.n_samples();
        let mut sums = vec![0.0; n_samples];
        let mut counts = vec![0usize; n_samples];
        for row in matrix.values().rows() {
            for (sample, &value) in row.iter().enumerate() {
                if value.is_nan() {
                    continue;
                }
                sums[sample] += value;
                counts[sample] += 1;
            }
        }
        let means: Vec<f64> = sums
            .iter()
            .zip(&counts)
            .map(|(&sum, &count)| if count > 0 { sum / count as f64 } else { 0.5 })
            .collect();

        fill_required(matrix, required, |sample| means[sample])
    })
}

/// Rebuilds the matrix with every required probe present: NaN cells of
/// required probes already in the matrix are patched, absent required
/// probes are appended as new rows. Probes the model does not require are
/// carried through untouched.
fn fill_required(
    matrix: &MethylationMatrix,
    required: &[String],
    fill: impl Fn(usize) -> f64,
) -> MethylationMatrix {
    let required_set: AHashSet<&str> = required.iter().map(String::as_str).collect();
    let missing: Vec<&String> = required
        .iter()
        .filter(|probe| !matrix.contains_probe(probe))
        .collect();

    let n_samples = matrix.n_samples();
    let n_rows = matrix.n_probes() + missing.len();
    let mut values = Array2::<f64>::zeros((n_rows, n_samples));
    let mut probe_ids = Vec::with_capacity(n_rows);

    let source = matrix.values();
    for (row, probe) in matrix.probe_ids().iter().enumerate() {
        let patch = required_set.contains(probe.as_str());
        for sample in 0..n_samples {
            let value = source[[row, sample]];
            values[[row, sample]] = if patch && value.is_nan() {
                fill(sample)
            } else {
                value
            };
        }
        probe_ids.push(probe.clone());
    }

    for (offset, probe) in missing.iter().enumerate() {
        let row = matrix.n_probes() + offset;
        for sample in 0..n_samples {
            values[[row, sample]] = fill(sample);
        }
        probe_ids.push((*probe).clone());
    }

    MethylationMatrix::new(probe_ids, matrix.sample_ids().to_vec(), values)
        .expect("imputed matrix preserves shape and probe uniqueness")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficients::{LinearCoefficients, ProbeWeight};
    use crate::linear::LinearMethylationModel;
    use crate::transform::ScoreTransform;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::sync::Mutex;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn linear_model(weights: &[(&str, f64)]) -> LinearMethylationModel {
        LinearMethylationModel::new(
            LinearCoefficients::new(
                weights
                    .iter()
                    .map(|(probe, weight)| ProbeWeight {
                        probe: probe.to_string(),
                        weight: *weight,
                    })
                    .collect(),
                0.0,
            ),
            ScoreTransform::Identity,
        )
    }

    #[test]
    fn hook_receives_the_full_required_panel() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observed = Arc::clone(&seen);
        let spy: ImputeFn = Arc::new(move |matrix, required| {
            observed.lock().unwrap().extend(required.to_vec());
            constant_fill(0.0)(matrix, required)
        });

        let model = ImputingModel::new(linear_model(&[("p1", 2.0), ("p2", 3.0)]), spy);
        let matrix = MethylationMatrix::new(ids(&["p1"]), ids(&["s1"]), array![[1.0]]).unwrap();
        model.predict(&matrix);

        assert_eq!(*seen.lock().unwrap(), ids(&["p1", "p2"]));
    }

    #[test]
    fn missing_probes_never_raise_through_the_decorator() {
        // p2 is entirely absent; the decorated model still produces a
        // defined prediction using the filled value.
        let model = ImputingModel::new(
            linear_model(&[("p1", 2.0), ("p2", 3.0)]),
            constant_fill(0.5),
        );
        let matrix = MethylationMatrix::new(ids(&["p1"]), ids(&["s1"]), array![[1.0]]).unwrap();

        let predicted = model.predict(&matrix).single_value().unwrap();
        assert_abs_diff_eq!(predicted, 2.0 * 1.0 + 3.0 * 0.5);
    }

    #[test]
    fn nan_cells_of_required_probes_are_patched() {
        let model = ImputingModel::new(
            linear_model(&[("p1", 2.0), ("p2", 3.0)]),
            constant_fill(0.25),
        );
        let matrix = MethylationMatrix::new(
            ids(&["p1", "p2"]),
            ids(&["s1"]),
            array![[1.0], [f64::NAN]],
        )
        .unwrap();

        let predicted = model.predict(&matrix).single_value().unwrap();
        assert_abs_diff_eq!(predicted, 2.0 * 1.0 + 3.0 * 0.25);
    }

    #[test]
    fn unrequired_nan_cells_are_left_alone() {
        let filled = constant_fill(0.9)(
            &MethylationMatrix::new(
                ids(&["p1", "q1"]),
                ids(&["s1"]),
                array![[f64::NAN], [f64::NAN]],
            )
            .unwrap(),
            &ids(&["p1"]),
        );
        assert_abs_diff_eq!(filled.probe_row("p1").unwrap()[0], 0.9);
        assert!(filled.probe_row("q1").unwrap()[0].is_nan());
    }

    #[test]
    fn sample_mean_fill_uses_per_sample_observed_means() {
        let matrix = MethylationMatrix::new(
            ids(&["p1", "p2"]),
            ids(&["s1", "s2"]),
            array![[0.2, 0.8], [0.4, f64::NAN]],
        )
        .unwrap();

        let filled = sample_mean_fill()(&matrix, &ids(&["p1", "p2", "p3"]));
        // s1 observed mean = 0.3, s2 observed mean = 0.8.
        let p3 = filled.probe_row("p3").unwrap();
        assert_abs_diff_eq!(p3[0], 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(p3[1], 0.8, epsilon = 1e-12);
        // The NaN cell of required p2 is patched with the same mean.
        assert_abs_diff_eq!(filled.probe_row("p2").unwrap()[1], 0.8, epsilon = 1e-12);
    }

    #[test]
    fn decorator_forwards_methylation_sites() {
        let model = ImputingModel::new(
            linear_model(&[("p1", 1.0), ("p2", 1.0)]),
            constant_fill(0.0),
        );
        assert_eq!(model.methylation_sites(), ids(&["p1", "p2"]));
    }
}
