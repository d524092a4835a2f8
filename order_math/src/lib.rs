//! # Order Math
//!
//! Numeric building blocks for order forecasting.
//! This crate provides a CART regression tree, a least-squares gradient
//! boosting ensemble built on it, expanding-window time-series
//! cross-validation, and the regression metrics used to score folds.

use thiserror::Error;

pub mod boosting;
pub mod cross_validation;
pub mod metrics;
pub mod tree;

pub use boosting::{BoostingParams, GradientBoostingRegressor};
pub use cross_validation::{FoldPolicy, TimeSeriesSplit, TrainValidationFold};
pub use metrics::{mean_absolute_error, r2_score, RegressionScore};
pub use tree::{RegressionTree, TreeParams};

/// Errors that can occur in forecasting math
#[derive(Error, Debug)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for forecasting math operations
pub type Result<T> = std::result::Result<T, MathError>;

/// Check that a feature matrix is rectangular and matches its target vector
pub(crate) fn check_design(features: &[Vec<f64>], targets: &[f64]) -> Result<usize> {
    if features.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot fit on an empty feature matrix".to_string(),
        ));
    }

    if features.len() != targets.len() {
        return Err(MathError::InvalidInput(format!(
            "Feature rows ({}) don't match target length ({})",
            features.len(),
            targets.len()
        )));
    }

    let width = features[0].len();
    if let Some(pos) = features.iter().position(|row| row.len() != width) {
        return Err(MathError::InvalidInput(format!(
            "Row {} has {} features, expected {}",
            pos,
            features[pos].len(),
            width
        )));
    }

    if features.iter().flatten().chain(targets).any(|v| !v.is_finite()) {
        return Err(MathError::InvalidInput(
            "Features and targets must be finite".to_string(),
        ));
    }

    Ok(width)
}
