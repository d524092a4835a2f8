//! Request orchestration
//!
//! A forecast request walks a fixed sequence of stages. Any stage may end the
//! request with an error; only a successful training stage produces a
//! result, and a failed history write after that is logged without taking
//! the result away.

use crate::config::ForecastConfig;
use crate::data::DataLoader;
use crate::eligibility::{eligible_pairs, MinMonths};
use crate::error::{ForecastError, Result};
use crate::features::{FeaturePipeline, FeatureSplit};
use crate::future::{build_working_set, check_conflict, predict_month};
use crate::history::HistoryStore;
use crate::month::CalendarMonth;
use crate::record::{RawTable, CANONICAL_COLUMNS};
use crate::trainer::{FoldReport, ForecastTrainer, TrainedForecast};
use order_math::RegressionScore;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, info_span, warn};

/// Stages of a forecast request, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ParseUpload,
    MergeHistory,
    ValidatePredictMonth,
    FilterEligible,
    BuildFuture,
    EngineerFeatures,
    TrainPredict,
    PersistHistory,
    AssembleResult,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::ParseUpload => "parse_upload",
            Stage::MergeHistory => "merge_history",
            Stage::ValidatePredictMonth => "validate_predict_month",
            Stage::FilterEligible => "filter_eligible",
            Stage::BuildFuture => "build_future",
            Stage::EngineerFeatures => "engineer_features",
            Stage::TrainPredict => "train_predict",
            Stage::PersistHistory => "persist_history",
            Stage::AssembleResult => "assemble_result",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An uploaded CSV and the optional eligibility threshold sent with it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForecastRequest {
    /// Raw CSV bytes, `None` when no file was attached
    pub upload: Option<Vec<u8>>,
    /// Raw `min_months` parameter as received
    pub min_months: Option<String>,
}

impl ForecastRequest {
    pub fn new<B: Into<Vec<u8>>>(upload: B) -> Self {
        Self {
            upload: Some(upload.into()),
            min_months: None,
        }
    }

    pub fn with_min_months<S: Into<String>>(mut self, min_months: S) -> Self {
        self.min_months = Some(min_months.into());
        self
    }
}

/// One forecast line of the response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub product_name: String,
    pub product_code: String,
    pub predicted_quantity: u64,
    pub store_id: String,
    pub unit: String,
    pub main_category: String,
    pub sub_category: String,
}

/// Everything a successful request produced
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastOutcome {
    pub predict_month: CalendarMonth,
    /// One row per eligible pair, sorted by store then product
    pub predictions: Vec<PredictionRow>,
    pub score: RegressionScore,
    pub validated: bool,
    pub folds: Vec<FoldReport>,
    /// Upload rows dropped for a bad date or missing identity
    pub dropped_rows: usize,
    /// Whether the merged history was written back
    pub persisted: bool,
}

/// JSON envelope returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_score: Option<RegressionScore>,
    pub data: Option<Vec<PredictionRow>>,
    pub error: Option<String>,
}

impl ForecastResponse {
    pub fn from_outcome(outcome: &ForecastOutcome) -> Self {
        Self {
            success: true,
            model_score: Some(outcome.score),
            data: Some(outcome.predictions.clone()),
            error: None,
        }
    }

    pub fn failure(err: &ForecastError) -> Self {
        Self {
            success: false,
            model_score: None,
            data: None,
            error: Some(err.to_string()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Forecasts next month's order quantities against a history store
#[derive(Debug)]
pub struct ForecastService<S: HistoryStore> {
    store: S,
    config: ForecastConfig,
    pipeline: FeaturePipeline,
    trainer: ForecastTrainer,
}

impl<S: HistoryStore> ForecastService<S> {
    pub fn new(store: S, config: ForecastConfig) -> Self {
        Self {
            pipeline: FeaturePipeline::from_config(&config),
            trainer: ForecastTrainer::from_config(&config),
            store,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Handle a request, always answering with an envelope
    pub fn forecast(&self, request: ForecastRequest) -> ForecastResponse {
        match self.run(request) {
            Ok(outcome) => ForecastResponse::from_outcome(&outcome),
            Err(err) => {
                if err.is_user_error() {
                    warn!(error = %err, "forecast request rejected");
                } else {
                    error!(error = %err, "forecast request failed");
                }
                ForecastResponse::failure(&err)
            }
        }
    }

    /// Handle a request, returning typed errors
    pub fn run(&self, request: ForecastRequest) -> Result<ForecastOutcome> {
        self.config.validate()?;

        let (upload, cutoff) = in_stage(Stage::ParseUpload, || parse_upload(&request))?;

        let merged = in_stage(Stage::MergeHistory, || {
            let base = self.store.load()?;
            let outcome = self.store.merge(&base, &upload)?;
            info!(
                stored = base.len(),
                uploaded = upload.len(),
                merged = outcome.frame.len(),
                dropped_rows = outcome.dropped_rows,
                "merged upload into history"
            );
            Ok(outcome)
        })?;
        let history = &merged.frame;

        let target = in_stage(Stage::ValidatePredictMonth, || {
            let month = predict_month(cutoff)?;
            check_conflict(history, month)?;
            Ok(month)
        })?;

        let pairs = in_stage(Stage::FilterEligible, || {
            let min_months =
                MinMonths::parse(request.min_months.as_deref(), self.config.default_min_months);
            let pairs = eligible_pairs(history, cutoff, min_months)?;
            info!(
                eligible = pairs.len(),
                min_months = min_months.get(),
                "selected eligible pairs"
            );
            Ok(pairs)
        })?;

        let working = in_stage(Stage::BuildFuture, || {
            build_working_set(
                history,
                cutoff,
                &pairs,
                self.config.default_expiration_days,
            )
        })?;

        let split = in_stage(Stage::EngineerFeatures, || {
            self.pipeline.transform(&working).map_err(as_model_failure)
        })?;

        let trained = in_stage(Stage::TrainPredict, || {
            self.trainer.train_predict(&split).map_err(as_model_failure)
        })?;

        let persisted = in_stage(Stage::PersistHistory, || {
            Ok(match self.store.persist(history) {
                Ok(()) => true,
                Err(err) => {
                    warn!(error = %err, "history was not persisted, returning forecast anyway");
                    false
                }
            })
        })?;

        in_stage(Stage::AssembleResult, || {
            let predictions = assemble_rows(&split, &trained)?;
            info!(
                predict_month = %target,
                rows = predictions.len(),
                score = %trained.score,
                validated = trained.validated,
                persisted,
                "forecast ready"
            );
            Ok(ForecastOutcome {
                predict_month: target,
                predictions,
                score: trained.score,
                validated: trained.validated,
                folds: trained.folds.clone(),
                dropped_rows: merged.dropped_rows,
                persisted,
            })
        })
    }
}

/// Run one stage inside its own span
fn in_stage<T, F>(stage: Stage, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let span = info_span!("forecast_stage", stage = stage.name());
    let _enter = span.enter();
    debug!("stage started");
    let result = f();
    if let Err(err) = &result {
        debug!(error = %err, "stage failed");
    }
    result
}

/// Read and validate the upload, returning it with its cutoff month
fn parse_upload(request: &ForecastRequest) -> Result<(RawTable, CalendarMonth)> {
    let bytes = request
        .upload
        .as_deref()
        .ok_or_else(|| ForecastError::ValidationError("CSV file is missing".to_string()))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ForecastError::ValidationError(
            "uploaded CSV is empty".to_string(),
        ));
    }

    let table = DataLoader::from_bytes(bytes)
        .map_err(|e| ForecastError::ValidationError(format!("unreadable CSV: {}", e)))?;

    let missing = table.missing_columns(&CANONICAL_COLUMNS);
    if !missing.is_empty() {
        return Err(ForecastError::ValidationError(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }
    if table.is_empty() {
        return Err(ForecastError::ValidationError(
            "uploaded CSV has no rows".to_string(),
        ));
    }

    let cutoff = table.max_month().ok_or_else(|| {
        ForecastError::ValidationError(
            "uploaded CSV has no row with a valid date, store_id and product_code".to_string(),
        )
    })?;
    debug!(rows = table.len(), %cutoff, "parsed upload");

    Ok((table, cutoff))
}

/// Errors past the eligibility stage are reported as model failures
fn as_model_failure(err: ForecastError) -> ForecastError {
    match err {
        ForecastError::ModelFailure(_) => err,
        other => ForecastError::ModelFailure(other.to_string()),
    }
}

fn assemble_rows(split: &FeatureSplit, trained: &TrainedForecast) -> Result<Vec<PredictionRow>> {
    if split.meta.len() != trained.predictions.len() {
        return Err(ForecastError::ModelFailure(format!(
            "{} predictions for {} rows",
            trained.predictions.len(),
            split.meta.len()
        )));
    }

    Ok(split
        .meta
        .iter()
        .zip(&trained.predictions)
        .map(|(meta, &quantity)| {
            let attributes = meta.attributes.clone();
            PredictionRow {
                product_name: attributes.product_name.unwrap_or_default(),
                product_code: meta.product_code.clone(),
                predicted_quantity: quantity,
                store_id: meta.store_id.clone(),
                unit: attributes.unit.unwrap_or_default(),
                main_category: attributes.main_category.unwrap_or_default(),
                sub_category: attributes.sub_category.unwrap_or_default(),
            }
        })
        .collect())
}
