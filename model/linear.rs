//! The general linear clock evaluator.
//!
//! A linear model is a weighted sum over probes: the coefficient table is
//! inner-joined with the methylation matrix on probe identifier, each
//! retained probe's beta value is multiplied by its weight, and the
//! per-sample sums (seeded with the intercept) go through the model's
//! scalar transform. Probes present on only one side of the join are
//! dropped silently in both directions; a panel that only partially
//! overlaps the matrix still produces an answer from the overlap.

use std::sync::Arc;

use crate::coefficients::LinearCoefficients;
use crate::registry::ModelMetadata;
use crate::transform::ScoreTransform;
use crate::types::{MethylationMatrix, MethylationModel, PredictionTable};

/// An injectable preprocessing step, run on the raw matrix before the
/// coefficient join. It may depend on the full matrix content (e.g. a
/// whole-panel normalization) and must return a matrix with the coverage
/// the join needs. Pure: called synchronously, exactly once per
/// `predict`, never mutating its input.
pub type PreprocessFn = Arc<dyn Fn(&MethylationMatrix) -> MethylationMatrix + Send + Sync>;

/// The output column name for linear predictions.
pub const PREDICTED_COLUMN: &str = "Predicted";

pub struct LinearMethylationModel {
    coefficients: LinearCoefficients,
    transform: ScoreTransform,
    preprocess: Option<PreprocessFn>,
    metadata: ModelMetadata,
}

impl std::fmt::Debug for LinearMethylationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearMethylationModel")
            .field("coefficients", &self.coefficients)
            .field("transform", &self.transform)
            .field("preprocess", &self.preprocess.as_ref().map(|_| "<fn>"))
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl LinearMethylationModel {
    pub fn new(coefficients: LinearCoefficients, transform: ScoreTransform) -> Self {
        Self {
            coefficients,
            transform,
            preprocess: None,
            metadata: ModelMetadata::default(),
        }
    }

    pub fn with_preprocess(mut self, preprocess: PreprocessFn) -> Self {
        self.preprocess = Some(preprocess);
        self
    }

    pub fn with_metadata(mut self, metadata: ModelMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn coefficients(&self) -> &LinearCoefficients {
        &self.coefficients
    }

    pub fn transform(&self) -> ScoreTransform {
        self.transform
    }

    /// Descriptive catalog metadata, carried opaquely.
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

impl MethylationModel for LinearMethylationModel {
    fn predict(&self, matrix: &MethylationMatrix) -> PredictionTable {
        let preprocessed;
        let matrix = match &self.preprocess {
            Some(preprocess) => {
                preprocessed = preprocess(matrix);
                &preprocessed
            }
            None => matrix,
        };

        let n_samples = matrix.n_samples();
        let mut scores = vec![self.coefficients.intercept(); n_samples];
        let mut overlap = 0usize;

        for probe in self.coefficients.probes() {
            let Some(row) = matrix.probe_row(&probe.probe) else {
                continue;
            };
            overlap += 1;
            for (sample, &value) in row.iter().enumerate() {
                // A NaN cell is a missing measurement and contributes
                // nothing to the sum.
                if value.is_nan() {
                    continue;
                }
                scores[sample] += probe.weight * value;
            }
        }

        log::debug!(
            "linear predict: {overlap} of {} model probes present in matrix",
            self.coefficients.len()
        );
        if overlap == 0 && !self.coefficients.is_empty() {
            log::warn!(
                "no overlap between the model's {} probes and the supplied matrix; \
                 scores are intercept-only",
                self.coefficients.len()
            );
        }

        let mut table = PredictionTable::new(matrix.sample_ids().to_vec());
        table.push_numeric(
            PREDICTED_COLUMN,
            scores
                .into_iter()
                .map(|raw| self.transform.apply(raw))
                .collect(),
        );
        table
    }

    /// The full probe panel the coefficient table requires, independent of
    /// any particular matrix. The intercept pseudo-row is excluded; no
    /// matrix can supply it.
    fn methylation_sites(&self) -> Vec<String> {
        self.coefficients.probe_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficients::ProbeWeight;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};
    use std::sync::Arc;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn coefficients(weights: &[(&str, f64)], intercept: f64) -> LinearCoefficients {
        LinearCoefficients::new(
            weights
                .iter()
                .map(|(probe, weight)| ProbeWeight {
                    probe: probe.to_string(),
                    weight: *weight,
                })
                .collect(),
            intercept,
        )
    }

    fn one_sample_matrix(probes: &[(&str, f64)]) -> MethylationMatrix {
        let values =
            Array2::from_shape_vec((probes.len(), 1), probes.iter().map(|p| p.1).collect())
                .unwrap();
        MethylationMatrix::new(
            probes.iter().map(|p| p.0.to_string()).collect(),
            ids(&["s1"]),
            values,
        )
        .unwrap()
    }

    #[test]
    fn weighted_sum_over_overlapping_probes() {
        let model = coefficients(&[("p1", 2.0), ("p2", 3.0)], 0.0);
        let model = LinearMethylationModel::new(model, ScoreTransform::Identity);
        let matrix = one_sample_matrix(&[("p1", 1.0), ("p2", 2.0)]);

        let predictions = model.predict(&matrix);
        assert_eq!(predictions.sample_ids(), &["s1"]);
        assert_abs_diff_eq!(predictions.numeric(PREDICTED_COLUMN).unwrap()[0], 8.0);
    }

    #[test]
    fn transform_is_applied_after_summation() {
        let model = LinearMethylationModel::new(
            coefficients(&[("p1", 2.0), ("p2", 3.0)], 0.0),
            ScoreTransform::Offset(10.0),
        );
        let matrix = one_sample_matrix(&[("p1", 1.0), ("p2", 2.0)]);
        assert_abs_diff_eq!(model.predict(&matrix).single_value().unwrap(), 18.0);
    }

    #[test]
    fn unrelated_matrix_probes_are_dropped_silently() {
        let model = LinearMethylationModel::new(
            coefficients(&[("p1", 2.0), ("p2", 3.0)], 0.0),
            ScoreTransform::Identity,
        );
        let matrix = one_sample_matrix(&[("p1", 1.0), ("p2", 2.0), ("p3", 0.9)]);
        assert_abs_diff_eq!(model.predict(&matrix).single_value().unwrap(), 8.0);
    }

    #[test]
    fn missing_model_probes_are_dropped_silently() {
        let model = LinearMethylationModel::new(
            coefficients(&[("p1", 2.0), ("p2", 3.0), ("p9", 100.0)], 0.0),
            ScoreTransform::Identity,
        );
        let matrix = one_sample_matrix(&[("p1", 1.0), ("p2", 2.0)]);
        assert_abs_diff_eq!(model.predict(&matrix).single_value().unwrap(), 8.0);
    }

    #[test]
    fn zero_overlap_yields_intercept_only_scores() {
        let model = LinearMethylationModel::new(
            coefficients(&[("p1", 2.0)], 1.5),
            ScoreTransform::Identity,
        );
        let matrix = one_sample_matrix(&[("q1", 0.4)]);
        assert_abs_diff_eq!(model.predict(&matrix).single_value().unwrap(), 1.5);

        let no_intercept = LinearMethylationModel::new(
            coefficients(&[("p1", 2.0)], 0.0),
            ScoreTransform::Identity,
        );
        assert_abs_diff_eq!(no_intercept.predict(&matrix).single_value().unwrap(), 0.0);
    }

    #[test]
    fn intercept_seeds_every_sample() {
        let model = LinearMethylationModel::new(
            coefficients(&[("p1", 2.0)], 5.0),
            ScoreTransform::Identity,
        );
        let matrix = MethylationMatrix::new(
            ids(&["p1"]),
            ids(&["s1", "s2"]),
            array![[1.0, 0.5]],
        )
        .unwrap();

        let predicted = model.predict(&matrix);
        let values = predicted.numeric(PREDICTED_COLUMN).unwrap();
        assert_abs_diff_eq!(values[0], 7.0);
        assert_abs_diff_eq!(values[1], 6.0);
    }

    #[test]
    fn predictions_are_invariant_to_probe_and_sample_order() {
        let model = LinearMethylationModel::new(
            coefficients(&[("p1", 2.0), ("p2", 3.0), ("p3", -1.0)], 0.25),
            ScoreTransform::Identity,
        );

        let forward = MethylationMatrix::new(
            ids(&["p1", "p2", "p3"]),
            ids(&["a", "b"]),
            array![[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]],
        )
        .unwrap();
        let shuffled = MethylationMatrix::new(
            ids(&["p3", "p1", "p2"]),
            ids(&["b", "a"]),
            array![[0.6, 0.5], [0.2, 0.1], [0.4, 0.3]],
        )
        .unwrap();

        let first = model.predict(&forward);
        let second = model.predict(&shuffled);

        let first_a = first.numeric(PREDICTED_COLUMN).unwrap()[0];
        let first_b = first.numeric(PREDICTED_COLUMN).unwrap()[1];
        let second_b = second.numeric(PREDICTED_COLUMN).unwrap()[0];
        let second_a = second.numeric(PREDICTED_COLUMN).unwrap()[1];
        assert_abs_diff_eq!(first_a, second_a, epsilon = 1e-12);
        assert_abs_diff_eq!(first_b, second_b, epsilon = 1e-12);
    }

    #[test]
    fn unit_weights_count_overlapping_probes() {
        let model = LinearMethylationModel::new(
            coefficients(&[("p1", 1.0), ("p2", 1.0), ("p3", 1.0)], 0.5),
            ScoreTransform::Identity,
        );
        let matrix = one_sample_matrix(&[("p1", 0.25), ("p2", 0.25), ("p3", 0.25)]);
        // score = v * overlap + intercept
        assert_abs_diff_eq!(
            model.predict(&matrix).single_value().unwrap(),
            0.25 * 3.0 + 0.5
        );
    }

    #[test]
    fn nan_cells_contribute_nothing() {
        let model = LinearMethylationModel::new(
            coefficients(&[("p1", 2.0), ("p2", 3.0)], 0.0),
            ScoreTransform::Identity,
        );
        let matrix = one_sample_matrix(&[("p1", 1.0), ("p2", f64::NAN)]);
        assert_abs_diff_eq!(model.predict(&matrix).single_value().unwrap(), 2.0);
    }

    #[test]
    fn preprocess_hook_runs_before_the_join() {
        let halve: PreprocessFn = Arc::new(|matrix: &MethylationMatrix| {
            let halved = matrix.values().mapv(|v| v / 2.0);
            MethylationMatrix::new(
                matrix.probe_ids().to_vec(),
                matrix.sample_ids().to_vec(),
                halved,
            )
            .expect("halving preserves shape")
        });

        let model = LinearMethylationModel::new(
            coefficients(&[("p1", 2.0), ("p2", 3.0)], 0.0),
            ScoreTransform::Identity,
        )
        .with_preprocess(halve);

        let matrix = one_sample_matrix(&[("p1", 1.0), ("p2", 2.0)]);
        assert_abs_diff_eq!(model.predict(&matrix).single_value().unwrap(), 4.0);
    }

    #[test]
    fn methylation_sites_reports_full_panel() {
        let model = LinearMethylationModel::new(
            coefficients(&[("p1", 2.0), ("p2", 3.0)], 1.0),
            ScoreTransform::Identity,
        );
        assert_eq!(model.methylation_sites(), ids(&["p1", "p2"]));
    }
}
