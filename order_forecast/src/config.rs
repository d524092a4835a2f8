//! Forecast configuration and its defaults

use crate::error::{ForecastError, Result};
use order_math::{BoostingParams, FoldPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the history file location
pub const HISTORY_PATH_ENV: &str = "ORDER_FORECAST_HISTORY";

/// Minimum months of history a pair needs when the request does not say
pub const DEFAULT_MIN_MONTHS: usize = 6;

/// Expiration days assigned to placeholder rows for the predicted month
pub const DEFAULT_EXPIRATION_DAYS: f64 = 180.0;

/// Configuration for the forecast service
///
/// Every default the pipeline relies on lives here rather than inside the
/// stage that uses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Location of the persisted history CSV
    pub history_path: PathBuf,
    /// Minimum distinct months per pair when a request gives none (or garbage)
    pub default_min_months: usize,
    /// Expiration days for placeholder rows
    pub default_expiration_days: f64,
    /// Number of sales lags (t-1 .. t-n)
    pub lag_count: usize,
    /// Rolling mean windows over sales
    pub rolling_windows: Vec<usize>,
    /// Fold-count policy for cross-validation
    pub fold_policy: FoldPolicy,
    /// Boosting hyperparameters
    pub boosting: BoostingParams,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            history_path: std::env::var(HISTORY_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("order_history.csv")),
            default_min_months: DEFAULT_MIN_MONTHS,
            default_expiration_days: DEFAULT_EXPIRATION_DAYS,
            lag_count: 3,
            rolling_windows: vec![3, 6],
            fold_policy: FoldPolicy::default(),
            boosting: BoostingParams::default(),
        }
    }
}

impl ForecastConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.default_min_months == 0 {
            return Err(ForecastError::ConfigError(
                "default_min_months must be at least 1".to_string(),
            ));
        }
        if self.lag_count == 0 {
            return Err(ForecastError::ConfigError(
                "lag_count must be at least 1".to_string(),
            ));
        }
        if self.rolling_windows.is_empty() || self.rolling_windows.contains(&0) {
            return Err(ForecastError::ConfigError(
                "rolling_windows must be non-empty and positive".to_string(),
            ));
        }
        if !self.default_expiration_days.is_finite() {
            return Err(ForecastError::ConfigError(
                "default_expiration_days must be finite".to_string(),
            ));
        }
        self.fold_policy
            .validate()
            .and_then(|_| self.boosting.validate())
            .map_err(|e| ForecastError::ConfigError(e.to_string()))
    }

    /// Use a different history file
    pub fn with_history_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.history_path = path.into();
        self
    }
}
