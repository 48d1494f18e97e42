//! # Data Loading and Validation Module
//!
//! This module is the exclusive entry point for user-provided tabular
//! data. It reads CSV files, validates them against the expected schema,
//! and converts them into the native structures the evaluators consume.
//!
//! - Strict schema: probe identifiers come from the first column; every
//!   other matrix column is one sample and must be numeric.
//! - User-centric errors: failures are assumed to be user-input errors,
//!   and `DataError` is written to give actionable feedback.
//! - Missing measurements are legal in a methylation matrix and become
//!   `NaN`; missing values in coefficient tables are not, and fail the
//!   load.

use ndarray::Array2;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::{MatrixError, MethylationMatrix};

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Missing or null values were found in the required column '{0}'.")]
    MissingValuesFound(String),
    #[error("Non-finite values (NaN or Infinity) were found in the required column '{0}'.")]
    NonFiniteValuesFound(String),
    #[error("The table at '{0}' contains no data rows.")]
    EmptyTable(PathBuf),
    #[error("The matrix at '{0}' has no sample columns after the probe-id column.")]
    NoSampleColumns(PathBuf),
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// Loads a methylation matrix: probes as rows (first column holds the
/// probe identifiers), samples as columns. Null or unparseable cells
/// become `NaN`.
pub fn load_methylation_matrix(path: &Path) -> Result<MethylationMatrix, DataError> {
    let df = read_csv(path)?;
    if df.height() == 0 {
        return Err(DataError::EmptyTable(path.to_path_buf()));
    }

    let column_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    let (id_column, sample_columns) = column_names
        .split_first()
        .ok_or_else(|| DataError::EmptyTable(path.to_path_buf()))?;
    if sample_columns.is_empty() {
        return Err(DataError::NoSampleColumns(path.to_path_buf()));
    }

    let probe_ids = extract_string_column(&df, id_column)?;
    let n_probes = probe_ids.len();
    let n_samples = sample_columns.len();

    let mut values = Array2::<f64>::zeros((n_probes, n_samples));
    let mut out_of_range = 0usize;
    for (col, name) in sample_columns.iter().enumerate() {
        let column = extract_lenient_numeric_column(&df, name)?;
        for (row, value) in column.into_iter().enumerate() {
            if value.is_finite() && !(0.0..=1.0).contains(&value) {
                out_of_range += 1;
            }
            values[[row, col]] = value;
        }
    }

    if out_of_range > 0 {
        log::warn!(
            "{out_of_range} values in '{}' fall outside the beta-value range [0, 1]",
            path.display()
        );
    }
    log::debug!(
        "loaded methylation matrix from '{}': {n_probes} probes x {n_samples} samples",
        path.display()
    );

    Ok(MethylationMatrix::new(
        probe_ids,
        sample_columns.to_vec(),
        values,
    )?)
}

// ========================================================================================
//                     Shared CSV primitives for the crate's loaders
// ========================================================================================

/// Reads a comma-separated file with a header row. Schema inference scans
/// the whole file, so a column that turns categorical late (e.g. a
/// chromosome column that reaches `X` after 22 numeric labels) is still
/// typed correctly.
pub(crate) fn read_csv(path: &Path) -> Result<DataFrame, DataError> {
    let file = File::open(path)?;
    let df = CsvReader::new(file)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(None)
                .with_parse_options(CsvParseOptions::default().with_separator(b',')),
        )
        .finish()?;
    Ok(df)
}

pub(crate) fn require_column(df: &DataFrame, column_name: &str) -> Result<(), DataError> {
    if df
        .get_column_names()
        .iter()
        .any(|name| name.as_str() == column_name)
    {
        Ok(())
    } else {
        Err(DataError::ColumnNotFound(column_name.to_string()))
    }
}

/// Extracts a numeric column, rejecting nulls and non-finite values.
pub(crate) fn extract_numeric_column(
    df: &DataFrame,
    column_name: &str,
) -> Result<Vec<f64>, DataError> {
    require_column(df, column_name)?;
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let casted = match series.cast(&DataType::Float64) {
        Ok(casted) => casted,
        Err(_) => {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            });
        }
    };
    if casted.null_count() > 0 {
        return Err(DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", series.dtype()),
        });
    }

    let chunked = casted.f64()?.rechunk();
    let values: Vec<f64> = chunked.into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(values)
}

/// Extracts a numeric column where nulls and unparseable cells are legal
/// and become `NaN`.
pub(crate) fn extract_lenient_numeric_column(
    df: &DataFrame,
    column_name: &str,
) -> Result<Vec<f64>, DataError> {
    require_column(df, column_name)?;
    let series = df.column(column_name)?;
    let casted = series
        .cast(&DataType::Float64)
        .map_err(|_| DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", series.dtype()),
        })?;
    let chunked = casted.f64()?.rechunk();
    Ok(chunked
        .into_iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect())
}

/// Extracts a string column, rejecting nulls.
pub(crate) fn extract_string_column(
    df: &DataFrame,
    column_name: &str,
) -> Result<Vec<String>, DataError> {
    let values = extract_optional_string_column(df, column_name)?;
    values
        .into_iter()
        .map(|value| value.ok_or_else(|| DataError::MissingValuesFound(column_name.to_string())))
        .collect()
}

/// Extracts a string column where nulls are legal and become `None`.
pub(crate) fn extract_optional_string_column(
    df: &DataFrame,
    column_name: &str,
) -> Result<Vec<Option<String>>, DataError> {
    require_column(df, column_name)?;
    let series = df.column(column_name)?;
    let casted = series
        .cast(&DataType::String)
        .map_err(|_| DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "string",
            found_type: format!("{:?}", series.dtype()),
        })?;
    let materialized = casted.as_materialized_series();
    let chunked = materialized.str()?;
    Ok(chunked
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}
