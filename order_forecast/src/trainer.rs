//! Gradient-boosted order model with time-series cross-validation
//!
//! Every fold fits a fresh ensemble on its training prefix, scores the
//! validation slice and predicts the whole test matrix. The reported
//! prediction is the mean over folds, rounded and clipped to a non-negative
//! integer quantity.

use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::features::FeatureSplit;
use order_math::{
    BoostingParams, FoldPolicy, GradientBoostingRegressor, RegressionScore, TrainValidationFold,
};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

/// Outcome of one cross-validation fold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldReport {
    pub fold: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub score: RegressionScore,
}

/// Predictions for the test rows and how well the model validated
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedForecast {
    /// Rounded, non-negative quantities, index-aligned with the test rows
    pub predictions: Vec<u64>,
    /// Fold-averaged predictions before rounding
    pub raw_predictions: Vec<f64>,
    /// Mean fold score, or the in-sample score when no fold could be built
    pub score: RegressionScore,
    pub folds: Vec<FoldReport>,
    /// False when `score` is in-sample
    pub validated: bool,
}

/// Fold result carried between the parallel and sequential phases
struct FoldRun {
    report: FoldReport,
    test_predictions: Vec<f64>,
}

/// Fits and evaluates the order model
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastTrainer {
    boosting: BoostingParams,
    fold_policy: FoldPolicy,
}

impl ForecastTrainer {
    pub fn new(boosting: BoostingParams, fold_policy: FoldPolicy) -> Self {
        Self {
            boosting,
            fold_policy,
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(config.boosting, config.fold_policy)
    }

    /// Train across folds and predict the test matrix
    pub fn train_predict(&self, split: &FeatureSplit) -> Result<TrainedForecast> {
        let x_train = split.x_train.rows();
        let x_test = split.x_test.rows();
        let y_train = &split.y_train;

        if x_train.len() != y_train.len() {
            return Err(ForecastError::ModelFailure(format!(
                "{} training rows but {} targets",
                x_train.len(),
                y_train.len()
            )));
        }
        split.x_train.ensure_same_columns(&split.x_test)?;

        let splitter = self.fold_policy.splitter(x_train.len())?;
        let folds = splitter.split(x_train.len());

        if folds.is_empty() {
            return self.fit_in_sample(split);
        }

        // Collected in fold order, so the average does not depend on scheduling
        let runs = folds
            .par_iter()
            .map(|fold| self.run_fold(fold, split))
            .collect::<Result<Vec<FoldRun>>>()?;

        for run in &runs {
            info!(
                fold = run.report.fold,
                train_rows = run.report.train_rows,
                validation_rows = run.report.validation_rows,
                r2 = run.report.score.r2,
                mae = run.report.score.mae,
                "validated fold"
            );
        }

        let mut raw_predictions = vec![0.0; x_test.len()];
        for run in &runs {
            for (total, value) in raw_predictions.iter_mut().zip(&run.test_predictions) {
                *total += value;
            }
        }
        let n_folds = runs.len() as f64;
        raw_predictions.iter_mut().for_each(|v| *v /= n_folds);

        let folds: Vec<FoldReport> = runs.into_iter().map(|r| r.report).collect();
        let scores: Vec<RegressionScore> = folds.iter().map(|f| f.score).collect();
        let score = RegressionScore::mean(&scores)
            .ok_or_else(|| ForecastError::ModelFailure("no fold scores".to_string()))?;

        info!(folds = folds.len(), %score, "cross-validated order model");

        Ok(TrainedForecast {
            predictions: to_quantities(&raw_predictions),
            raw_predictions,
            score,
            folds,
            validated: true,
        })
    }

    fn run_fold(&self, fold: &TrainValidationFold, split: &FeatureSplit) -> Result<FoldRun> {
        let x_train = split.x_train.rows();
        let y_train = &split.y_train;

        let model = GradientBoostingRegressor::fit(
            &x_train[fold.train.clone()],
            &y_train[fold.train.clone()],
            self.boosting,
        )?;
        let validation = model.predict(&x_train[fold.validation.clone()])?;
        let score = RegressionScore::evaluate(&y_train[fold.validation.clone()], &validation)?;
        let test_predictions = model.predict(split.x_test.rows())?;

        Ok(FoldRun {
            report: FoldReport {
                fold: fold.fold,
                train_rows: fold.train.len(),
                validation_rows: fold.validation.len(),
                score,
            },
            test_predictions,
        })
    }

    /// Single fit on all training rows when the data is too short to split
    fn fit_in_sample(&self, split: &FeatureSplit) -> Result<TrainedForecast> {
        let x_train = split.x_train.rows();
        let model = GradientBoostingRegressor::fit(x_train, &split.y_train, self.boosting)?;
        let fitted = model.predict(x_train)?;
        let score = RegressionScore::evaluate(&split.y_train, &fitted)?;
        let raw_predictions = model.predict(split.x_test.rows())?;

        warn!(
            train_rows = x_train.len(),
            %score,
            "too few rows for cross-validation, reporting in-sample score"
        );

        Ok(TrainedForecast {
            predictions: to_quantities(&raw_predictions),
            raw_predictions,
            score,
            folds: Vec::new(),
            validated: false,
        })
    }
}

/// Round to the nearest whole quantity and clip at zero
fn to_quantities(values: &[f64]) -> Vec<u64> {
    values
        .iter()
        .map(|v| {
            let rounded = v.round();
            if rounded.is_finite() && rounded > 0.0 {
                rounded as u64
            } else {
                0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureMatrix, ForecastMeta};
    use crate::month::CalendarMonth;
    use crate::record::ProductAttributes;
    use pretty_assertions::assert_eq;

    fn split(n_train: usize, n_test: usize) -> FeatureSplit {
        let columns = vec!["trend".to_string(), "season".to_string()];
        let train_rows: Vec<Vec<f64>> = (0..n_train)
            .map(|i| vec![i as f64, (i % 12) as f64])
            .collect();
        let y_train = train_rows.iter().map(|r| 2.0 * r[0] + r[1]).collect();
        let test_rows: Vec<Vec<f64>> = (0..n_test)
            .map(|i| vec![(n_train + i) as f64, ((n_train + i) % 12) as f64])
            .collect();
        let meta = (0..n_test)
            .map(|i| ForecastMeta {
                month: CalendarMonth::new(2024, 1).unwrap(),
                store_id: format!("S{}", i),
                product_code: "P1".to_string(),
                attributes: ProductAttributes::default(),
            })
            .collect();

        FeatureSplit {
            x_train: FeatureMatrix::new(columns.clone(), train_rows).unwrap(),
            y_train,
            x_test: FeatureMatrix::new(columns, test_rows).unwrap(),
            meta,
        }
    }

    fn trainer() -> ForecastTrainer {
        let boosting = BoostingParams {
            n_estimators: 20,
            ..BoostingParams::default()
        };
        ForecastTrainer::new(boosting, FoldPolicy::default())
    }

    #[test]
    fn test_cross_validated_predictions() {
        let result = trainer().train_predict(&split(30, 3)).unwrap();

        assert!(result.validated);
        assert_eq!(result.folds.len(), 2);
        assert_eq!(result.predictions.len(), 3);
        assert_eq!(result.raw_predictions.len(), 3);
        let fold_numbers: Vec<usize> = result.folds.iter().map(|f| f.fold).collect();
        assert_eq!(fold_numbers, vec![0, 1]);
        assert_eq!(result.folds[0].validation_rows, 10);
        assert_eq!(result.folds[0].train_rows, 10);
        assert!(result.score.mae >= 0.0);
    }

    #[test]
    fn test_predictions_are_deterministic() {
        let data = split(40, 2);
        let first = trainer().train_predict(&data).unwrap();
        let second = trainer().train_predict(&data).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_in_sample_fallback() {
        let result = trainer().train_predict(&split(2, 1)).unwrap();

        assert!(!result.validated);
        assert!(result.folds.is_empty());
        assert_eq!(result.predictions.len(), 1);
    }

    #[test]
    fn test_misaligned_split_is_model_failure() {
        let mut data = split(10, 1);
        data.x_test = FeatureMatrix::new(vec!["other".to_string()], vec![vec![1.0]]).unwrap();

        let err = trainer().train_predict(&data).unwrap_err();
        assert!(matches!(err, ForecastError::ModelFailure(_)));
    }

    #[test]
    fn test_quantities_round_and_clip() {
        assert_eq!(
            to_quantities(&[-3.2, 0.49, 0.5, 2.5, 10.4, f64::NAN]),
            vec![0, 0, 1, 3, 10, 0]
        );
    }
}
