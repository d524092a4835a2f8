//! Error types for the order_forecast crate

use order_math::MathError;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the order_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Missing upload, missing required columns or an unreadable CSV
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Incompatible or unparseable table schema during a merge
    #[error("Merge error: {0}")]
    MergeError(String),

    /// The month to predict already exists in the history
    #[error("{0} already exists in data")]
    ConflictError(String),

    /// No (store, product) pair has enough history
    #[error("No store/product pair has at least {min_months} months of history; lower min_months or upload more history")]
    EligibilityError { min_months: usize },

    /// Feature engineering or model fitting failed
    #[error("Model failure: {0}")]
    ModelFailure(String),

    /// Writing the history back to storage failed
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from JSON (de)serialization
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<MathError> for ForecastError {
    fn from(err: MathError) -> Self {
        ForecastError::ModelFailure(err.to_string())
    }
}

impl ForecastError {
    /// HTTP status an HTTP layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            ForecastError::ValidationError(_)
            | ForecastError::MergeError(_)
            | ForecastError::ConflictError(_)
            | ForecastError::EligibilityError { .. } => 400,
            _ => 500,
        }
    }

    /// Whether the caller can fix the request and retry
    pub fn is_user_error(&self) -> bool {
        self.http_status() == 400
    }
}
