//! Expanding-window cross-validation for time-ordered samples
//!
//! Samples are assumed to be sorted by time. Every fold trains on a prefix
//! and validates on the slice immediately after it, so validation data never
//! precedes its training data.

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One train/validation split over sample indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainValidationFold {
    /// Fold number, oldest first
    pub fold: usize,
    /// Training prefix
    pub train: Range<usize>,
    /// Validation slice following the training prefix
    pub validation: Range<usize>,
}

/// Time-series splitter with a fixed number of expanding-window folds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSeriesSplit {
    n_splits: usize,
}

impl TimeSeriesSplit {
    /// Create a splitter producing `n_splits` folds
    pub fn new(n_splits: usize) -> Result<Self> {
        if n_splits == 0 {
            return Err(MathError::InvalidInput(
                "Number of splits must be positive".to_string(),
            ));
        }
        Ok(Self { n_splits })
    }

    /// Number of folds this splitter produces when data is sufficient
    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Generate folds for `n_samples` time-ordered samples
    ///
    /// The validation slice size is `n_samples / (n_splits + 1)`; the first
    /// fold trains on everything before the last `n_splits` slices. Returns an
    /// empty list when there are fewer than `n_splits + 1` samples.
    pub fn split(&self, n_samples: usize) -> Vec<TrainValidationFold> {
        let test_size = n_samples / (self.n_splits + 1);
        if test_size == 0 {
            return Vec::new();
        }

        let first_start = n_samples - self.n_splits * test_size;
        (0..self.n_splits)
            .map(|fold| {
                let start = first_start + fold * test_size;
                TrainValidationFold {
                    fold,
                    train: 0..start,
                    validation: start..start + test_size,
                }
            })
            .collect()
    }
}

/// Policy choosing how many folds to use for a training set
///
/// The fold count is `min(max_folds, max(min_folds, n / rows_per_fold))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldPolicy {
    /// Lower bound on the number of folds
    pub min_folds: usize,
    /// Upper bound on the number of folds
    pub max_folds: usize,
    /// Training rows per additional fold
    pub rows_per_fold: usize,
}

impl Default for FoldPolicy {
    fn default() -> Self {
        Self {
            min_folds: 2,
            max_folds: 5,
            rows_per_fold: 50,
        }
    }
}

impl FoldPolicy {
    /// Validate the policy bounds
    pub fn validate(&self) -> Result<()> {
        if self.min_folds == 0 || self.rows_per_fold == 0 {
            return Err(MathError::InvalidInput(
                "Fold bounds and rows per fold must be positive".to_string(),
            ));
        }
        if self.min_folds > self.max_folds {
            return Err(MathError::InvalidInput(format!(
                "min_folds ({}) exceeds max_folds ({})",
                self.min_folds, self.max_folds
            )));
        }
        Ok(())
    }

    /// Number of folds for a training set of `n_rows`
    pub fn fold_count(&self, n_rows: usize) -> usize {
        self.max_folds
            .min(self.min_folds.max(n_rows / self.rows_per_fold))
    }

    /// Splitter sized for a training set of `n_rows`
    pub fn splitter(&self, n_rows: usize) -> Result<TimeSeriesSplit> {
        self.validate()?;
        TimeSeriesSplit::new(self.fold_count(n_rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_layout() {
        let splitter = TimeSeriesSplit::new(3).unwrap();
        let folds = splitter.split(10);

        // 10 / 4 = 2 rows per validation slice, starting at 10 - 3 * 2 = 4
        assert_eq!(folds.len(), 3);
        assert_eq!(folds[0].train, 0..4);
        assert_eq!(folds[0].validation, 4..6);
        assert_eq!(folds[1].train, 0..6);
        assert_eq!(folds[1].validation, 6..8);
        assert_eq!(folds[2].train, 0..8);
        assert_eq!(folds[2].validation, 8..10);
    }

    #[test]
    fn test_validation_never_precedes_training() {
        let splitter = TimeSeriesSplit::new(5).unwrap();
        for fold in splitter.split(37) {
            assert!(fold.train.end <= fold.validation.start);
            assert!(!fold.train.is_empty());
        }
    }

    #[test]
    fn test_too_few_samples() {
        let splitter = TimeSeriesSplit::new(2).unwrap();
        assert!(splitter.split(2).is_empty());
        assert_eq!(splitter.split(3).len(), 2);
    }

    #[test]
    fn test_zero_splits_rejected() {
        assert!(TimeSeriesSplit::new(0).is_err());
    }

    #[test]
    fn test_fold_policy_counts() {
        let policy = FoldPolicy::default();
        assert_eq!(policy.fold_count(10), 2);
        assert_eq!(policy.fold_count(100), 2);
        assert_eq!(policy.fold_count(150), 3);
        assert_eq!(policy.fold_count(249), 4);
        assert_eq!(policy.fold_count(10_000), 5);
    }

    #[test]
    fn test_fold_policy_validation() {
        let policy = FoldPolicy {
            min_folds: 6,
            max_folds: 5,
            rows_per_fold: 50,
        };
        assert!(policy.validate().is_err());
        assert!(FoldPolicy::default().validate().is_ok());
    }
}
