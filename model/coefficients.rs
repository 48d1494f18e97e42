//! Coefficient table loaders.
//!
//! Every model ships a CSV keyed by probe identifier in its first column.
//! Linear models carry one weight column; the sex model carries the
//! chromosome label, the projection-axis label, and the reference mean
//! and coefficient for each probe. Tables are loaded once, eagerly, at
//! model construction; a missing or malformed table fails the
//! constructor.

use std::path::Path;

use crate::data::{
    self, DataError, extract_numeric_column, extract_optional_string_column,
    extract_string_column,
};

/// The weight column of a linear coefficient table.
pub const WEIGHT_COLUMN: &str = "CoefficientTraining";

/// Identifiers under which published tables ship their intercept
/// pseudo-row. The intercept is not a probe: no matrix can supply it, so
/// it is folded into a constant offset at load time instead of
/// participating in the probe join.
const INTERCEPT_LABELS: [&str; 2] = ["(Intercept)", "Intercept"];

/// One probe's regression weight.
#[derive(Debug, Clone)]
pub struct ProbeWeight {
    pub probe: String,
    pub weight: f64,
}

/// A linear model's coefficient table: per-probe weights plus the
/// constant intercept contribution (0 when the table ships none).
#[derive(Debug, Clone)]
pub struct LinearCoefficients {
    probes: Vec<ProbeWeight>,
    intercept: f64,
}

impl LinearCoefficients {
    pub fn new(probes: Vec<ProbeWeight>, intercept: f64) -> Self {
        Self { probes, intercept }
    }

    /// Loads a linear coefficient CSV. The first column is the probe
    /// index; weights come from the `CoefficientTraining` column.
    /// Intercept pseudo-rows are folded into the constant term.
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let df = data::read_csv(path)?;
        if df.height() == 0 {
            return Err(DataError::EmptyTable(path.to_path_buf()));
        }

        let id_column = first_column_name(&df, path)?;
        let ids = extract_string_column(&df, &id_column)?;
        let weights = extract_numeric_column(&df, WEIGHT_COLUMN)?;

        let mut probes = Vec::with_capacity(ids.len());
        let mut intercept = 0.0;
        for (id, weight) in ids.into_iter().zip(weights) {
            if INTERCEPT_LABELS.contains(&id.as_str()) {
                intercept += weight;
            } else {
                probes.push(ProbeWeight { probe: id, weight });
            }
        }

        log::debug!(
            "loaded {} probe weights (intercept {intercept}) from '{}'",
            probes.len(),
            path.display()
        );
        Ok(Self { probes, intercept })
    }

    pub fn probes(&self) -> &[ProbeWeight] {
        &self.probes
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn probe_ids(&self) -> Vec<String> {
        self.probes.iter().map(|p| p.probe.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

/// The discriminant axis a sex-reference row projects onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionAxis {
    X,
    Y,
}

/// One row of the sex-estimation reference table.
#[derive(Debug, Clone)]
pub struct SexProbe {
    pub probe: String,
    /// Chromosome label as shipped (`X`, `Y`, or an autosome label).
    pub chromosome: String,
    /// Which discriminant this row contributes to; `None` for rows that
    /// only participate in the autosome statistics.
    pub axis: Option<ProjectionAxis>,
    /// Reference mean of the z-scored value for this probe.
    pub mean: f64,
    /// Projection coefficient.
    pub coeff: f64,
}

impl SexProbe {
    pub fn is_autosome(&self) -> bool {
        self.chromosome != "X" && self.chromosome != "Y"
    }
}

/// The sex model's reference table.
#[derive(Debug, Clone)]
pub struct SexReference {
    probes: Vec<SexProbe>,
}

impl SexReference {
    pub fn new(probes: Vec<SexProbe>) -> Self {
        Self { probes }
    }

    /// Loads the sex reference CSV: probe index in the first column, then
    /// `CHR` (chromosome label), `pca` (projection axis, `X`/`Y`, blank
    /// or any other label for none), `mean` and `coeff` (numeric).
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let df = data::read_csv(path)?;
        if df.height() == 0 {
            return Err(DataError::EmptyTable(path.to_path_buf()));
        }

        let id_column = first_column_name(&df, path)?;
        let ids = extract_string_column(&df, &id_column)?;
        let chromosomes = extract_string_column(&df, "CHR")?;
        let axes = extract_optional_string_column(&df, "pca")?;
        let means = extract_numeric_column(&df, "mean")?;
        let coeffs = extract_numeric_column(&df, "coeff")?;

        let probes = ids
            .into_iter()
            .zip(chromosomes)
            .zip(axes)
            .zip(means.into_iter().zip(coeffs))
            .map(|(((probe, chromosome), axis), (mean, coeff))| SexProbe {
                probe,
                chromosome,
                axis: match axis.as_deref() {
                    Some("X") => Some(ProjectionAxis::X),
                    Some("Y") => Some(ProjectionAxis::Y),
                    _ => None,
                },
                mean,
                coeff,
            })
            .collect::<Vec<_>>();

        log::debug!(
            "loaded sex reference with {} probes from '{}'",
            probes.len(),
            path.display()
        );
        Ok(Self { probes })
    }

    pub fn probes(&self) -> &[SexProbe] {
        &self.probes
    }

    pub fn probe_ids(&self) -> Vec<String> {
        self.probes.iter().map(|p| p.probe.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

fn first_column_name(
    df: &polars::prelude::DataFrame,
    path: &Path,
) -> Result<String, DataError> {
    df.get_column_names()
        .first()
        .map(|name| name.to_string())
        .ok_or_else(|| DataError::EmptyTable(path.to_path_buf()))
}
