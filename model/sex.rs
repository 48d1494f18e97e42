//! Sex estimation from X/Y discriminant projections.
//!
//! The reference table carries, per probe, a chromosome label and an
//! optional projection axis with a reference mean and coefficient. Each
//! sample's retained probes are z-scored against that sample's own
//! autosome statistics, then projected onto the two discriminant axes;
//! the sign pattern of the two scores calls the karyotype.

use std::fmt;

use ndarray::ArrayView1;

use crate::coefficients::{ProjectionAxis, SexProbe, SexReference};
use crate::registry::ModelMetadata;
use crate::types::{MethylationMatrix, MethylationModel, PredictionTable};

/// Output column names of the sex model.
pub const X_COLUMN: &str = "X";
pub const Y_COLUMN: &str = "Y";
pub const SEX_COLUMN: &str = "predicted_sex";

/// A called sex karyotype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Karyotype {
    Female,
    Male,
    /// 47,XXY (Klinefelter).
    Xxy,
    /// 45,XO (Turner).
    Xo,
}

impl Karyotype {
    pub fn label(&self) -> &'static str {
        match self {
            Karyotype::Female => "Female",
            Karyotype::Male => "Male",
            Karyotype::Xxy => "47,XXY",
            Karyotype::Xo => "45,XO",
        }
    }
}

impl fmt::Display for Karyotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Calls a karyotype from the two discriminant scores.
///
/// The comparison sequence is part of the observable contract: a score of
/// exactly zero matches none of the branches and falls through to
/// `Female`, and the zero-handling is deliberately asymmetric between the
/// axes.
pub fn classify_karyotype(x: f64, y: f64) -> Karyotype {
    let mut karyotype = Karyotype::Female;
    if x < 0.0 && y > 0.0 {
        karyotype = Karyotype::Male;
    }
    if x > 0.0 && y > 0.0 {
        karyotype = Karyotype::Xxy;
    }
    if x < 0.0 && y < 0.0 {
        karyotype = Karyotype::Xo;
    }
    karyotype
}

#[derive(Debug)]
pub struct SexEstimationModel {
    reference: SexReference,
    metadata: ModelMetadata,
}

impl SexEstimationModel {
    pub fn new(reference: SexReference) -> Self {
        Self {
            reference,
            metadata: ModelMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: ModelMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn reference(&self) -> &SexReference {
        &self.reference
    }

    /// Descriptive catalog metadata, carried opaquely.
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Per-sample mean and population standard deviation over the retained
    /// autosome probes, skipping missing values.
    fn autosome_statistics(
        retained: &[(&SexProbe, ArrayView1<'_, f64>)],
        n_samples: usize,
    ) -> (Vec<f64>, Vec<f64>) {
        let mut sums = vec![0.0; n_samples];
        let mut counts = vec![0usize; n_samples];
        for (probe, row) in retained {
            if !probe.is_autosome() {
                continue;
            }
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
            .map(|(&sum, &count)| if count > 0 { sum / count as f64 } else { f64::NAN })
            .collect();

        let mut squared = vec![0.0; n_samples];
        for (probe, row) in retained {
            if !probe.is_autosome() {
                continue;
            }
            for (sample, &value) in row.iter().enumerate() {
                if value.is_nan() {
                    continue;
                }
                let deviation = value - means[sample];
                squared[sample] += deviation * deviation;
            }
        }
        let stds: Vec<f64> = squared
            .iter()
            .zip(&counts)
            .map(|(&sum, &count)| {
                if count > 0 {
                    (sum / count as f64).sqrt()
                } else {
                    f64::NAN
                }
            })
            .collect();

        (means, stds)
    }
}

impl MethylationModel for SexEstimationModel {
    fn predict(&self, matrix: &MethylationMatrix) -> PredictionTable {
        let n_samples = matrix.n_samples();

        // Intersection of reference and matrix probes; non-overlapping
        // probes are dropped silently on both sides.
        let retained: Vec<(&SexProbe, ArrayView1<'_, f64>)> = self
            .reference
            .probes()
            .iter()
            .filter_map(|probe| matrix.probe_row(&probe.probe).map(|row| (probe, row)))
            .collect();

        log::debug!(
            "sex predict: {} of {} reference probes present in matrix",
            retained.len(),
            self.reference.len()
        );

        let (means, stds) = Self::autosome_statistics(&retained, n_samples);

        let mut x_scores = vec![0.0; n_samples];
        let mut y_scores = vec![0.0; n_samples];
        for (probe, row) in &retained {
            let Some(axis) = probe.axis else {
                continue;
            };
            let scores = match axis {
                ProjectionAxis::X => &mut x_scores,
                ProjectionAxis::Y => &mut y_scores,
            };
            for (sample, &value) in row.iter().enumerate() {
                // Z-score against the sample's own autosome statistics;
                // missing values and undefined z-scores (zero-variance or
                // autosome-free samples) are zeroed before the reference
                // mean is subtracted.
                let z = if value.is_nan() {
                    0.0
                } else {
                    let z = (value - means[sample]) / stds[sample];
                    if z.is_finite() { z } else { 0.0 }
                };
                scores[sample] += (z - probe.mean) * probe.coeff;
            }
        }

        let calls: Vec<String> = x_scores
            .iter()
            .zip(&y_scores)
            .map(|(&x, &y)| classify_karyotype(x, y).to_string())
            .collect();

        let mut table = PredictionTable::new(matrix.sample_ids().to_vec());
        table.push_numeric(X_COLUMN, x_scores);
        table.push_numeric(Y_COLUMN, y_scores);
        table.push_categorical(SEX_COLUMN, calls);
        table
    }

    fn methylation_sites(&self) -> Vec<String> {
        self.reference.probe_ids()
    }
}
