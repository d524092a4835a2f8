//! Observation records and the canonical history schema

use crate::month::CalendarMonth;
use serde::Serialize;
use std::fmt;

/// Calendar month column (`YYYY-MM` or `YYYY-MM-DD`)
pub const DATE: &str = "date";
pub const STORE_ID: &str = "store_id";
pub const PRODUCT_CODE: &str = "product_code";
pub const PRODUCT_NAME: &str = "product_name";
pub const MAIN_CATEGORY: &str = "main_category";
pub const SUB_CATEGORY: &str = "sub_category";
pub const UNIT: &str = "unit";
pub const STOCK_LEVEL: &str = "stock_level";
pub const SALES_QUANTITY: &str = "sales_quantity";
pub const EXPIRATION_DAYS_LEFT: &str = "expiration_days_left";
/// Forecast target
pub const ORDERED_QUANTITY: &str = "ordered_quantity";

/// Every column of the persisted history, in file order
pub const CANONICAL_COLUMNS: [&str; 11] = [
    DATE,
    STORE_ID,
    PRODUCT_CODE,
    PRODUCT_NAME,
    MAIN_CATEGORY,
    SUB_CATEGORY,
    UNIT,
    STOCK_LEVEL,
    SALES_QUANTITY,
    EXPIRATION_DAYS_LEFT,
    ORDERED_QUANTITY,
];

/// Columns without which rows cannot be keyed
pub const IDENTITY_COLUMNS: [&str; 3] = [DATE, STORE_ID, PRODUCT_CODE];

/// Text columns of the canonical schema
pub const TEXT_COLUMNS: [&str; 6] = [
    STORE_ID,
    PRODUCT_CODE,
    PRODUCT_NAME,
    MAIN_CATEGORY,
    SUB_CATEGORY,
    UNIT,
];

/// Numeric columns of the canonical schema
pub const NUMERIC_COLUMNS: [&str; 4] = [
    STOCK_LEVEL,
    SALES_QUANTITY,
    EXPIRATION_DAYS_LEFT,
    ORDERED_QUANTITY,
];

/// A (store, product) pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PairKey {
    pub store_id: String,
    pub product_code: String,
}

impl PairKey {
    pub fn new<S: Into<String>, P: Into<String>>(store_id: S, product_code: P) -> Self {
        Self {
            store_id: store_id.into(),
            product_code: product_code.into(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_id, self.product_code)
    }
}

/// Static product attributes carried forward to placeholder rows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductAttributes {
    pub product_name: Option<String>,
    pub main_category: Option<String>,
    pub sub_category: Option<String>,
    pub unit: Option<String>,
}

/// One monthly observation for a store and product
///
/// `None` marks an attribute whose column was missing from the source table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub month: CalendarMonth,
    pub store_id: String,
    pub product_code: String,
    pub attributes: ProductAttributes,
    pub stock_level: Option<f64>,
    pub sales_quantity: Option<f64>,
    pub expiration_days_left: Option<f64>,
    pub ordered_quantity: Option<f64>,
}

impl Observation {
    /// Store/product pair of this observation
    pub fn pair(&self) -> PairKey {
        PairKey::new(self.store_id.clone(), self.product_code.clone())
    }

    /// Unique key inside a history table
    pub fn key(&self) -> (CalendarMonth, &str, &str) {
        (self.month, &self.store_id, &self.product_code)
    }
}

/// An observation before its date has been parsed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawObservation {
    pub date: Option<String>,
    pub store_id: Option<String>,
    pub product_code: Option<String>,
    pub attributes: ProductAttributes,
    pub stock_level: Option<f64>,
    pub sales_quantity: Option<f64>,
    pub expiration_days_left: Option<f64>,
    pub ordered_quantity: Option<f64>,
}

impl RawObservation {
    /// Parse the date and identity fields; `None` when the row cannot be keyed
    pub fn parse(&self) -> Option<Observation> {
        let month = CalendarMonth::parse(self.date.as_deref()?)?;
        let store_id = self.store_id.clone().filter(|s| !s.is_empty())?;
        let product_code = self.product_code.clone().filter(|s| !s.is_empty())?;

        Some(Observation {
            month,
            store_id,
            product_code,
            attributes: self.attributes.clone(),
            stock_level: self.stock_level,
            sales_quantity: self.sales_quantity,
            expiration_days_left: self.expiration_days_left,
            ordered_quantity: self.ordered_quantity,
        })
    }
}

impl From<&Observation> for RawObservation {
    fn from(obs: &Observation) -> Self {
        Self {
            date: Some(obs.month.to_string()),
            store_id: Some(obs.store_id.clone()),
            product_code: Some(obs.product_code.clone()),
            attributes: obs.attributes.clone(),
            stock_level: obs.stock_level,
            sales_quantity: obs.sales_quantity,
            expiration_days_left: obs.expiration_days_left,
            ordered_quantity: obs.ordered_quantity,
        }
    }
}

/// Rows read from a CSV source together with the canonical columns it had
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<RawObservation>,
}

impl RawTable {
    /// Create a table; `columns` lists the canonical columns present in the source
    pub fn new(columns: Vec<String>, rows: Vec<RawObservation>) -> Self {
        Self { columns, rows }
    }

    /// A table holding every canonical column
    pub fn with_canonical_columns(rows: Vec<RawObservation>) -> Self {
        Self::new(CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect(), rows)
    }

    /// Canonical columns present in the source
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether a column was present in the source
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Required columns absent from the source, in the order given
    pub fn missing_columns<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|c| !self.has_column(c))
            .collect()
    }

    /// Raw rows
    pub fn rows(&self) -> &[RawObservation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Latest month among the rows that can be keyed
    ///
    /// Rows a merge would drop (bad date, blank store or product) are ignored.
    pub fn max_month(&self) -> Option<CalendarMonth> {
        crate::month::cutoff_month(
            self.rows
                .iter()
                .filter_map(RawObservation::parse)
                .map(|obs| obs.month),
        )
    }
}
