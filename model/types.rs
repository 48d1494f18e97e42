// ========================================================================================
//                             Shared data contracts
// ========================================================================================

// This file is only for types shared between modules, not types used in one file.

use ahash::AHashMap;
use ndarray::{Array2, ArrayView1, ArrayView2};
use std::io::{self, Write};
use thiserror::Error;

/// A probe-by-sample matrix of methylation beta values.
///
/// Rows are indexed by probe identifier (a CpG site ID such as
/// `cg09809672`), columns by sample identifier. Values are fractions in
/// [0, 1]; `NaN` encodes a missing measurement. The matrix is immutable
/// after construction: evaluators borrow it read-only, and preprocessing
/// or imputation produce a new matrix rather than mutating in place.
#[derive(Debug, Clone)]
pub struct MethylationMatrix {
    probe_ids: Vec<String>,
    sample_ids: Vec<String>,
    /// Shape: [n_probes, n_samples].
    values: Array2<f64>,
    probe_index: AHashMap<String, usize>,
}

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error(
        "matrix shape is {rows}x{cols} but {probes} probe ids and {samples} sample ids were supplied"
    )]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        probes: usize,
        samples: usize,
    },
    #[error("probe identifier '{0}' appears more than once")]
    DuplicateProbe(String),
}

impl MethylationMatrix {
    /// Builds a matrix from its parts, validating shape agreement and
    /// probe-id uniqueness.
    pub fn new(
        probe_ids: Vec<String>,
        sample_ids: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, MatrixError> {
        let (rows, cols) = values.dim();
        if rows != probe_ids.len() || cols != sample_ids.len() {
            return Err(MatrixError::ShapeMismatch {
                rows,
                cols,
                probes: probe_ids.len(),
                samples: sample_ids.len(),
            });
        }

        let mut probe_index = AHashMap::with_capacity(probe_ids.len());
        for (row, id) in probe_ids.iter().enumerate() {
            if probe_index.insert(id.clone(), row).is_some() {
                return Err(MatrixError::DuplicateProbe(id.clone()));
            }
        }

        Ok(Self {
            probe_ids,
            sample_ids,
            values,
            probe_index,
        })
    }

    pub fn n_probes(&self) -> usize {
        self.probe_ids.len()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn probe_ids(&self) -> &[String] {
        &self.probe_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn contains_probe(&self, probe: &str) -> bool {
        self.probe_index.contains_key(probe)
    }

    /// The per-sample values for one probe, or `None` if the probe is not
    /// in the matrix.
    pub fn probe_row(&self, probe: &str) -> Option<ArrayView1<'_, f64>> {
        self.probe_index.get(probe).map(|&row| self.values.row(row))
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }
}

/// One column of a prediction table: per-sample numeric scores or
/// categorical labels.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionValues {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionColumn {
    pub name: String,
    pub values: PredictionValues,
}

/// One row per input sample, one or more named output columns. Freshly
/// constructed by every `predict` call; it has no identity beyond that.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTable {
    sample_ids: Vec<String>,
    columns: Vec<PredictionColumn>,
}

impl PredictionTable {
    pub fn new(sample_ids: Vec<String>) -> Self {
        Self {
            sample_ids,
            columns: Vec::new(),
        }
    }

    /// Appends a numeric column. The length must match the sample count;
    /// violating that is a programming error, not an input error.
    pub fn push_numeric(&mut self, name: impl Into<String>, values: Vec<f64>) {
        assert_eq!(
            values.len(),
            self.sample_ids.len(),
            "prediction column length must match sample count"
        );
        self.columns.push(PredictionColumn {
            name: name.into(),
            values: PredictionValues::Numeric(values),
        });
    }

    pub fn push_categorical(&mut self, name: impl Into<String>, values: Vec<String>) {
        assert_eq!(
            values.len(),
            self.sample_ids.len(),
            "prediction column length must match sample count"
        );
        self.columns.push(PredictionColumn {
            name: name.into(),
            values: PredictionValues::Categorical(values),
        });
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn columns(&self) -> &[PredictionColumn] {
        &self.columns
    }

    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        self.columns.iter().find(|c| c.name == name).and_then(|c| {
            match &c.values {
                PredictionValues::Numeric(values) => Some(values.as_slice()),
                PredictionValues::Categorical(_) => None,
            }
        })
    }

    pub fn categorical(&self, name: &str) -> Option<&[String]> {
        self.columns.iter().find(|c| c.name == name).and_then(|c| {
            match &c.values {
                PredictionValues::Numeric(_) => None,
                PredictionValues::Categorical(values) => Some(values.as_slice()),
            }
        })
    }

    /// The first sample's value in the first numeric column. Convenience
    /// for single-sample calls.
    pub fn single_value(&self) -> Option<f64> {
        self.columns.iter().find_map(|c| match &c.values {
            PredictionValues::Numeric(values) => values.first().copied(),
            PredictionValues::Categorical(_) => None,
        })
    }

    /// Writes the table as TSV with a leading `sample_id` column.
    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write!(writer, "sample_id")?;
        for column in &self.columns {
            write!(writer, "\t{}", column.name)?;
        }
        writeln!(writer)?;

        for (row, sample) in self.sample_ids.iter().enumerate() {
            write!(writer, "{sample}")?;
            for column in &self.columns {
                match &column.values {
                    PredictionValues::Numeric(values) => write!(writer, "\t{}", values[row])?,
                    PredictionValues::Categorical(values) => write!(writer, "\t{}", values[row])?,
                }
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

/// The capability every evaluator satisfies: produce predictions for a
/// matrix, and report the probe panel the model's coefficient table
/// requires (whether or not a given matrix supplies it).
///
/// `predict` is infallible by contract. Poor probe coverage degrades the
/// result rather than raising; all failure surfaces live at construction
/// time. Evaluators are immutable after construction, so one instance can
/// serve concurrent `predict` calls.
pub trait MethylationModel: Send + Sync + std::fmt::Debug {
    fn predict(&self, matrix: &MethylationMatrix) -> PredictionTable;

    fn methylation_sites(&self) -> Vec<String>;
}

impl<M: MethylationModel + ?Sized> MethylationModel for Box<M> {
    fn predict(&self, matrix: &MethylationMatrix) -> PredictionTable {
        (**self).predict(matrix)
    }

    fn methylation_sites(&self) -> Vec<String> {
        (**self).methylation_sites()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn matrix_construction_validates_shape() {
        let err = MethylationMatrix::new(
            ids(&["cg1", "cg2"]),
            ids(&["s1"]),
            array![[0.1, 0.2], [0.3, 0.4]],
        )
        .unwrap_err();
        assert!(matches!(err, MatrixError::ShapeMismatch { .. }));
    }

    #[test]
    fn matrix_construction_rejects_duplicate_probes() {
        let err = MethylationMatrix::new(
            ids(&["cg1", "cg1"]),
            ids(&["s1"]),
            array![[0.1], [0.2]],
        )
        .unwrap_err();
        assert!(matches!(err, MatrixError::DuplicateProbe(id) if id == "cg1"));
    }

    #[test]
    fn probe_rows_are_looked_up_by_identifier() {
        let matrix = MethylationMatrix::new(
            ids(&["cg1", "cg2"]),
            ids(&["s1", "s2"]),
            array![[0.1, 0.2], [0.3, 0.4]],
        )
        .unwrap();

        assert!(matrix.contains_probe("cg2"));
        assert!(!matrix.contains_probe("cg9"));
        let row = matrix.probe_row("cg2").unwrap();
        assert_eq!(row.to_vec(), vec![0.3, 0.4]);
        assert!(matrix.probe_row("cg9").is_none());
    }

    #[test]
    fn prediction_table_serialises_to_tsv() {
        let mut table = PredictionTable::new(ids(&["s1", "s2"]));
        table.push_numeric("Predicted", vec![8.0, 18.5]);
        table.push_categorical("flag", ids(&["a", "b"]));

        let mut buffer = Vec::new();
        table.write_tsv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "sample_id\tPredicted\tflag\ns1\t8\ta\ns2\t18.5\tb\n"
        );
    }

    #[test]
    fn single_value_reads_first_numeric_cell() {
        let mut table = PredictionTable::new(ids(&["s1", "s2"]));
        table.push_categorical("label", ids(&["x", "y"]));
        table.push_numeric("Predicted", vec![41.0, 42.0]);
        assert_eq!(table.single_value(), Some(41.0));

        let empty = PredictionTable::new(Vec::new());
        assert_eq!(empty.single_value(), None);
    }
}
