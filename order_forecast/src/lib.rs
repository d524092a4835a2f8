//! # Order Forecast
//!
//! Monthly order-quantity forecasting for store/product pairs.
//!
//! ## Features
//!
//! - Persisted sales history that grows with every upload (CSV file or in memory)
//! - Calendar-month normalization of dates
//! - Eligibility filtering on months of history per store/product pair
//! - Lag, rolling-mean, calendar and one-hot features with a checked column contract
//! - Gradient-boosted regression validated with expanding-window time-series folds
//! - A JSON response envelope for an HTTP or command-line front end
//!
//! ## Request Flow
//!
//! An upload is parsed, merged into the stored history, checked for a
//! conflicting forecast month, filtered to eligible pairs, extended with one
//! placeholder row per pair for the next month, turned into features, and
//! passed to the trainer. The merged history is written back after a
//! successful prediction.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use order_forecast::{CsvHistoryStore, ForecastConfig, ForecastRequest, ForecastService};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ForecastConfig::default();
//! let store = CsvHistoryStore::new(&config.history_path);
//! let service = ForecastService::new(store, config);
//!
//! let upload = std::fs::read("upload.csv")?;
//! let response = service.forecast(ForecastRequest::new(upload).with_min_months("6"));
//! println!("{}", response.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod eligibility;
pub mod error;
pub mod features;
pub mod future;
pub mod history;
pub mod month;
pub mod record;
pub mod service;
pub mod trainer;

// Re-export commonly used types
pub use crate::config::ForecastConfig;
pub use crate::data::DataLoader;
pub use crate::eligibility::MinMonths;
pub use crate::error::{ForecastError, Result};
pub use crate::features::{FeatureMatrix, FeaturePipeline, FeatureSplit};
pub use crate::future::WorkingSet;
pub use crate::history::{CsvHistoryStore, HistoryFrame, HistoryStore, InMemoryHistoryStore};
pub use crate::month::CalendarMonth;
pub use crate::record::{Observation, PairKey, ProductAttributes};
pub use crate::service::{
    ForecastOutcome, ForecastRequest, ForecastResponse, ForecastService, PredictionRow,
};
pub use crate::trainer::{ForecastTrainer, TrainedForecast};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
