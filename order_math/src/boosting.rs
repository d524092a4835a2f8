//! Least-squares gradient boosting over CART regression trees

use crate::tree::{RegressionTree, TreeParams};
use crate::{check_design, MathError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Hyperparameters for the boosting ensemble
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Shrinkage applied to each tree's contribution
    pub learning_rate: f64,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Minimum number of rows in each leaf
    pub min_samples_leaf: usize,
    /// Fraction of rows sampled (without replacement) for each tree
    pub subsample: f64,
    /// Seed for row subsampling
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            seed: 42,
        }
    }
}

impl BoostingParams {
    /// Validate the hyperparameters
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(MathError::InvalidInput(
                "n_estimators must be positive".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(MathError::InvalidInput(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(MathError::InvalidInput(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        self.tree_params().validate()
    }

    /// Growth limits for the individual trees
    pub fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            min_samples_split: (2 * self.min_samples_leaf).max(2),
        }
    }
}

/// Fitted gradient-boosted regression ensemble
#[derive(Debug, Clone)]
pub struct GradientBoostingRegressor {
    params: BoostingParams,
    init: f64,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl GradientBoostingRegressor {
    /// Fit the ensemble
    ///
    /// Starts from the target mean and fits each tree to the current
    /// residuals, which are the negative gradient of the squared loss.
    pub fn fit(features: &[Vec<f64>], targets: &[f64], params: BoostingParams) -> Result<Self> {
        params.validate()?;
        let n_features = check_design(features, targets)?;
        let n = targets.len();

        let init = targets.iter().sum::<f64>() / n as f64;
        if !init.is_finite() {
            return Err(MathError::CalculationError(
                "Target mean is not finite".to_string(),
            ));
        }
        let mut current = vec![init; n];
        let mut residuals = vec![0.0; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let tree_params = params.tree_params();

        let mut rng = StdRng::seed_from_u64(params.seed);
        let sample_size = ((n as f64 * params.subsample).round() as usize).clamp(1, n);
        let all_rows: Vec<usize> = (0..n).collect();

        for _ in 0..params.n_estimators {
            for i in 0..n {
                residuals[i] = targets[i] - current[i];
            }

            let tree = if sample_size < n {
                let mut rows = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                rows.sort_unstable();
                RegressionTree::fit_rows(features, &residuals, &rows, tree_params)?
            } else {
                RegressionTree::fit_rows(features, &residuals, &all_rows, tree_params)?
            };

            for (value, row) in current.iter_mut().zip(features) {
                *value += params.learning_rate * tree.predict_row(row);
            }
            if let Some(pos) = current.iter().position(|v| !v.is_finite()) {
                return Err(MathError::CalculationError(format!(
                    "Boosting round {} produced a non-finite prediction for row {}",
                    trees.len(),
                    pos
                )));
            }
            trees.push(tree);
        }

        Ok(Self {
            params,
            init,
            trees,
            n_features,
        })
    }

    /// Predict a single row
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.trees.iter().fold(self.init, |acc, tree| {
            acc + self.params.learning_rate * tree.predict_row(row)
        })
    }

    /// Predict every row of a feature matrix
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>> {
        if let Some(row) = features.iter().find(|r| r.len() != self.n_features) {
            return Err(MathError::InvalidInput(format!(
                "Expected {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        Ok(features.iter().map(|r| self.predict_row(r)).collect())
    }

    /// Number of fitted trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of features the ensemble was fitted on
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Hyperparameters used for fitting
    pub fn params(&self) -> &BoostingParams {
        &self.params
    }
}
