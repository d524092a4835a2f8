//! Feature engineering for the order model
//!
//! Turns a [`WorkingSet`] into aligned training and test matrices:
//!
//! - numeric attributes (stock, sales, expiration days)
//! - calendar features (`year`, `month`)
//! - sales lags per store/product, missing lags as 0
//! - trailing rolling means of sales per store/product, minimum period 1
//! - one-hot columns for store, product and category attributes, encoded
//!   separately for each split and then aligned to the training columns
//!
//! Training rows come out in time order so cross-validation folds never
//! validate on the past.

use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::future::WorkingSet;
use crate::month::CalendarMonth;
use crate::record::{
    Observation, PairKey, ProductAttributes, EXPIRATION_DAYS_LEFT, MAIN_CATEGORY, PRODUCT_CODE,
    SALES_QUANTITY, STOCK_LEVEL, STORE_ID, SUB_CATEGORY, UNIT,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Columns one-hot encoded into indicator features
pub const CATEGORICAL_COLUMNS: [&str; 5] =
    [STORE_ID, PRODUCT_CODE, MAIN_CATEGORY, SUB_CATEGORY, UNIT];

/// A dense feature matrix with named columns
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Create a matrix, checking every row has one value per column
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(pos) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(ForecastError::ModelFailure(format!(
                "feature row {} has {} values for {} columns",
                pos,
                rows[pos].len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Column names, in matrix order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Reorder to `columns`, filling columns this matrix lacks with 0 and
    /// dropping columns not listed
    pub fn align_to(&self, columns: &[String]) -> Self {
        let lookup: HashMap<&str, usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let source: Vec<Option<usize>> = columns
            .iter()
            .map(|c| lookup.get(c.as_str()).copied())
            .collect();

        let rows = self
            .rows
            .iter()
            .map(|row| {
                source
                    .iter()
                    .map(|idx| idx.map_or(0.0, |i| row[i]))
                    .collect()
            })
            .collect();

        Self {
            columns: columns.to_vec(),
            rows,
        }
    }

    /// Fail unless `other` has exactly the same columns in the same order
    pub fn ensure_same_columns(&self, other: &FeatureMatrix) -> Result<()> {
        if self.columns == other.columns {
            return Ok(());
        }

        let first_difference = self
            .columns
            .iter()
            .zip(other.columns.iter())
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| self.columns.len().min(other.columns.len()));
        Err(ForecastError::ModelFailure(format!(
            "feature columns are not aligned: {} vs {} columns, first difference at position {}",
            self.columns.len(),
            other.columns.len(),
            first_difference
        )))
    }
}

/// Identifying and display fields of a test row
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastMeta {
    pub month: CalendarMonth,
    pub store_id: String,
    pub product_code: String,
    pub attributes: ProductAttributes,
}

impl ForecastMeta {
    pub fn pair(&self) -> PairKey {
        PairKey::new(self.store_id.clone(), self.product_code.clone())
    }
}

/// Training and test matrices ready for the model
#[derive(Debug, Clone)]
pub struct FeatureSplit {
    pub x_train: FeatureMatrix,
    pub y_train: Vec<f64>,
    pub x_test: FeatureMatrix,
    /// Index-aligned with the rows of `x_test`
    pub meta: Vec<ForecastMeta>,
}

/// Observation with its derived numeric features
struct EngineeredRow<'a> {
    obs: &'a Observation,
    numeric: Vec<f64>,
}

/// Stateless feature transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturePipeline {
    lag_count: usize,
    rolling_windows: Vec<usize>,
}

impl FeaturePipeline {
    pub fn new(lag_count: usize, rolling_windows: Vec<usize>) -> Self {
        Self {
            lag_count,
            rolling_windows,
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(config.lag_count, config.rolling_windows.clone())
    }

    /// Names of the numeric feature columns, before the one-hot columns
    pub fn numeric_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = [STOCK_LEVEL, SALES_QUANTITY, EXPIRATION_DAYS_LEFT]
            .iter()
            .map(|c| c.to_string())
            .collect();
        columns.push("year".to_string());
        columns.push("month".to_string());
        columns.extend((1..=self.lag_count).map(|i| format!("{}_lag_{}", SALES_QUANTITY, i)));
        columns.extend(
            self.rolling_windows
                .iter()
                .map(|w| format!("{}_rolling_mean_{}", SALES_QUANTITY, w)),
        );
        columns
    }

    /// Build aligned train/test matrices from a working set
    pub fn transform(&self, working: &WorkingSet) -> Result<FeatureSplit> {
        let predict_month = working.predict_month;
        let engineered = self.engineer(&working.rows);

        let mut train: Vec<EngineeredRow> = Vec::new();
        let mut test: Vec<EngineeredRow> = Vec::new();
        for row in engineered {
            if row.obs.month < predict_month {
                train.push(row);
            } else if row.obs.month == predict_month {
                test.push(row);
            }
        }

        if train.is_empty() {
            return Err(ForecastError::ModelFailure(format!(
                "no training rows before {}",
                predict_month
            )));
        }
        if test.is_empty() {
            return Err(ForecastError::ModelFailure(format!(
                "no rows to predict for {}",
                predict_month
            )));
        }

        train.sort_by(|a, b| {
            (a.obs.month, &a.obs.store_id, &a.obs.product_code).cmp(&(
                b.obs.month,
                &b.obs.store_id,
                &b.obs.product_code,
            ))
        });
        test.sort_by(|a, b| {
            (&a.obs.store_id, &a.obs.product_code).cmp(&(&b.obs.store_id, &b.obs.product_code))
        });

        let x_train = self.encode(&train)?;
        let x_test = self.encode(&test)?.align_to(x_train.columns());
        x_train.ensure_same_columns(&x_test)?;

        let y_train = train
            .iter()
            .map(|r| r.obs.ordered_quantity.unwrap_or(0.0))
            .collect();
        let meta = test
            .iter()
            .map(|r| ForecastMeta {
                month: r.obs.month,
                store_id: r.obs.store_id.clone(),
                product_code: r.obs.product_code.clone(),
                attributes: r.obs.attributes.clone(),
            })
            .collect();

        debug!(
            train_rows = x_train.n_rows(),
            test_rows = x_test.n_rows(),
            columns = x_train.n_columns(),
            "engineered features"
        );

        Ok(FeatureSplit {
            x_train,
            y_train,
            x_test,
            meta,
        })
    }

    /// Derive numeric features per store/product group
    fn engineer<'a>(&self, rows: &'a [Observation]) -> Vec<EngineeredRow<'a>> {
        let mut groups: BTreeMap<(&str, &str), Vec<&Observation>> = BTreeMap::new();
        for obs in rows {
            groups
                .entry((obs.store_id.as_str(), obs.product_code.as_str()))
                .or_default()
                .push(obs);
        }

        let mut engineered = Vec::with_capacity(rows.len());
        for mut group in groups.into_values() {
            group.sort_by_key(|o| o.month);
            let sales: Vec<f64> = group
                .iter()
                .map(|o| o.sales_quantity.unwrap_or(0.0))
                .collect();

            for (i, obs) in group.into_iter().enumerate() {
                let mut numeric = vec![
                    obs.stock_level.unwrap_or(0.0),
                    sales[i],
                    obs.expiration_days_left.unwrap_or(0.0),
                    obs.month.year() as f64,
                    obs.month.month() as f64,
                ];
                numeric.extend((1..=self.lag_count).map(|lag| lagged(&sales, i, lag)));
                numeric.extend(
                    self.rolling_windows
                        .iter()
                        .map(|&w| rolling_mean(&sales, i, w)),
                );

                engineered.push(EngineeredRow { obs, numeric });
            }
        }

        engineered
    }

    /// Numeric columns followed by one-hot columns for the given rows
    fn encode(&self, rows: &[EngineeredRow]) -> Result<FeatureMatrix> {
        let mut columns = self.numeric_columns();
        let mut categories: Vec<(usize, BTreeSet<&str>)> = Vec::new();
        for (idx, name) in CATEGORICAL_COLUMNS.iter().enumerate() {
            let values: BTreeSet<&str> = rows
                .iter()
                .filter_map(|r| categorical_value(r.obs, name))
                .collect();
            columns.extend(values.iter().map(|v| format!("{}_{}", name, v)));
            categories.push((idx, values));
        }

        let matrix = rows
            .iter()
            .map(|r| {
                let mut values = r.numeric.clone();
                for (idx, levels) in &categories {
                    let own = categorical_value(r.obs, CATEGORICAL_COLUMNS[*idx]);
                    values.extend(
                        levels
                            .iter()
                            .map(|level| if Some(*level) == own { 1.0 } else { 0.0 }),
                    );
                }
                values
            })
            .collect();

        FeatureMatrix::new(columns, matrix)
    }
}

/// Value of a categorical column for an observation
fn categorical_value<'a>(obs: &'a Observation, column: &str) -> Option<&'a str> {
    match column {
        STORE_ID => Some(obs.store_id.as_str()),
        PRODUCT_CODE => Some(obs.product_code.as_str()),
        MAIN_CATEGORY => obs.attributes.main_category.as_deref(),
        SUB_CATEGORY => obs.attributes.sub_category.as_deref(),
        UNIT => obs.attributes.unit.as_deref(),
        _ => None,
    }
}

/// Value `lag` positions back, 0 when the group is too short
fn lagged(values: &[f64], i: usize, lag: usize) -> f64 {
    if i >= lag {
        values[i - lag]
    } else {
        0.0
    }
}

/// Mean of up to `window` values ending at `i`, inclusive
fn rolling_mean(values: &[f64], i: usize, window: usize) -> f64 {
    let start = (i + 1).saturating_sub(window);
    let slice = &values[start..=i];
    slice.iter().sum::<f64>() / slice.len() as f64
}
