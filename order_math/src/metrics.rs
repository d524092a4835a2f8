//! Regression metrics for scoring forecasts against actual values

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

/// Coefficient of determination and mean absolute error for one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionScore {
    /// Coefficient of determination
    pub r2: f64,
    /// Mean absolute error
    pub mae: f64,
}

impl RegressionScore {
    /// Score predictions against actual values
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        Ok(Self {
            r2: r2_score(actual, predicted)?,
            mae: mean_absolute_error(actual, predicted)?,
        })
    }

    /// Arithmetic mean of several scores, `None` when there are none
    pub fn mean(scores: &[RegressionScore]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }

        let n = scores.len() as f64;
        Some(Self {
            r2: scores.iter().map(|s| s.r2).sum::<f64>() / n,
            mae: scores.iter().map(|s| s.mae).sum::<f64>() / n,
        })
    }
}

impl std::fmt::Display for RegressionScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R2={:.4}, MAE={:.4}", self.r2, self.mae)
    }
}

fn check_lengths(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return Err(MathError::InvalidInput(
            "Actual and predicted values must have the same non-zero length".to_string(),
        ));
    }
    Ok(())
}

/// Mean absolute error
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual, predicted)?;

    let sum: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .sum();

    Ok(sum / actual.len() as f64)
}

/// Coefficient of determination (R²)
///
/// When the actual values have zero variance the score is 1.0 for a perfect
/// prediction and 0.0 otherwise, so constant validation slices never produce
/// NaN or infinity.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual, predicted)?;

    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

    if ss_tot.abs() < f64::EPSILON {
        return Ok(if ss_res.abs() < f64::EPSILON { 1.0 } else { 0.0 });
    }

    Ok(1.0 - ss_res / ss_tot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mae() {
        let actual = [10.0, 12.0, 9.0];
        let predicted = [11.0, 12.0, 7.0];
        assert_relative_eq!(mean_absolute_error(&actual, &predicted).unwrap(), 1.0);
    }

    #[test]
    fn test_r2_perfect_and_mean_prediction() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(r2_score(&actual, &actual).unwrap(), 1.0);

        // Predicting the mean everywhere scores exactly zero
        let mean = [2.5; 4];
        assert_relative_eq!(r2_score(&actual, &mean).unwrap(), 0.0);
    }

    #[test]
    fn test_r2_constant_actuals() {
        let actual = [5.0, 5.0, 5.0];
        assert_eq!(r2_score(&actual, &[5.0, 5.0, 5.0]).unwrap(), 1.0);
        assert_eq!(r2_score(&actual, &[4.0, 5.0, 6.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(r2_score(&[1.0], &[1.0, 2.0]).is_err());
        assert!(mean_absolute_error(&[], &[]).is_err());
    }

    #[test]
    fn test_mean_score() {
        let scores = [
            RegressionScore { r2: 0.5, mae: 2.0 },
            RegressionScore { r2: 0.7, mae: 4.0 },
        ];
        let mean = RegressionScore::mean(&scores).unwrap();
        assert_relative_eq!(mean.r2, 0.6);
        assert_relative_eq!(mean.mae, 3.0);
        assert!(RegressionScore::mean(&[]).is_none());
    }
}
