//! # Demand Forecast
//!
//! Umbrella crate for the order forecasting workspace.
//!
//! - [`order_math`]: regression trees, gradient boosting, time-series folds and metrics
//! - [`order_forecast`]: history storage, feature engineering and the forecast service
//!
//! ## Example
//!
//! ```
//! use demand_forecast_workspace::order_forecast::{CalendarMonth, MinMonths};
//!
//! let month = CalendarMonth::parse("2024-07-15").unwrap();
//! assert_eq!(month.to_string(), "2024-07");
//! assert_eq!(MinMonths::parse(Some("0"), 6).get(), 1);
//! ```

pub use order_forecast;
pub use order_math;

pub use order_forecast::{ForecastConfig, ForecastRequest, ForecastResponse, ForecastService};
pub use order_math::{GradientBoostingRegressor, TimeSeriesSplit};
