//! Clepsydra evaluates published DNA methylation clocks, linear models
//! plus one bilinear sex discriminant, against a probe-by-sample matrix
//! of beta values, producing per-sample phenotype predictions.

pub mod coefficients;
pub mod data;
pub mod impute;
pub mod linear;
pub mod registry;
pub mod sex;
pub mod transform;
pub mod types;
