//! CSV loading and writing for observation tables

use crate::error::{ForecastError, Result};
use crate::history::HistoryFrame;
use crate::record::{
    ProductAttributes, RawObservation, RawTable, CANONICAL_COLUMNS, DATE, EXPIRATION_DAYS_LEFT,
    MAIN_CATEGORY, ORDERED_QUANTITY, PRODUCT_CODE, PRODUCT_NAME, SALES_QUANTITY, STOCK_LEVEL,
    STORE_ID, SUB_CATEGORY, UNIT,
};
use polars::prelude::*;
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;

/// Data loader for observation tables
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load an observation table from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<RawTable> {
        let file = File::open(path)?;
        // Every column is read as text so identifiers like "001" keep their zeros
        let df = CsvReader::new(file)
            .infer_schema(Some(0))
            .has_header(true)
            .finish()?;

        Self::from_dataframe(&df)
    }

    /// Load an observation table from CSV bytes, such as an uploaded file
    pub fn from_bytes(bytes: &[u8]) -> Result<RawTable> {
        let df = CsvReader::new(Cursor::new(bytes.to_vec()))
            .infer_schema(Some(0))
            .has_header(true)
            .finish()?;

        Self::from_dataframe(&df)
    }

    /// Create an observation table from an existing DataFrame
    ///
    /// Canonical columns are matched by their trimmed header name; columns
    /// outside the canonical schema are ignored and missing ones read as null.
    pub fn from_dataframe(df: &DataFrame) -> Result<RawTable> {
        let height = df.height();
        let present: Vec<String> = CANONICAL_COLUMNS
            .iter()
            .filter(|c| Self::find_column(df, c).is_some())
            .map(|c| c.to_string())
            .collect();

        let dates = Self::text_column(df, DATE, height)?;
        let stores = Self::text_column(df, STORE_ID, height)?;
        let products = Self::text_column(df, PRODUCT_CODE, height)?;
        let names = Self::text_column(df, PRODUCT_NAME, height)?;
        let mains = Self::text_column(df, MAIN_CATEGORY, height)?;
        let subs = Self::text_column(df, SUB_CATEGORY, height)?;
        let units = Self::text_column(df, UNIT, height)?;
        let stock = Self::numeric_column(df, STOCK_LEVEL, height)?;
        let sales = Self::numeric_column(df, SALES_QUANTITY, height)?;
        let expiration = Self::numeric_column(df, EXPIRATION_DAYS_LEFT, height)?;
        let ordered = Self::numeric_column(df, ORDERED_QUANTITY, height)?;

        let rows = (0..height)
            .map(|i| RawObservation {
                date: dates[i].clone(),
                store_id: stores[i].clone(),
                product_code: products[i].clone(),
                attributes: ProductAttributes {
                    product_name: names[i].clone(),
                    main_category: mains[i].clone(),
                    sub_category: subs[i].clone(),
                    unit: units[i].clone(),
                },
                stock_level: stock[i],
                sales_quantity: sales[i],
                expiration_days_left: expiration[i],
                ordered_quantity: ordered[i],
            })
            .collect();

        Ok(RawTable::new(present, rows))
    }

    /// Convert a history table to a DataFrame with dates as `YYYY-MM`
    pub fn to_dataframe(frame: &HistoryFrame) -> Result<DataFrame> {
        let records = frame.records();

        let df = DataFrame::new(vec![
            Series::new(
                DATE,
                records
                    .iter()
                    .map(|r| r.month.to_string())
                    .collect::<Vec<String>>(),
            ),
            Series::new(
                STORE_ID,
                records
                    .iter()
                    .map(|r| r.store_id.clone())
                    .collect::<Vec<String>>(),
            ),
            Series::new(
                PRODUCT_CODE,
                records
                    .iter()
                    .map(|r| r.product_code.clone())
                    .collect::<Vec<String>>(),
            ),
            Series::new(
                PRODUCT_NAME,
                records
                    .iter()
                    .map(|r| r.attributes.product_name.clone())
                    .collect::<Vec<Option<String>>>(),
            ),
            Series::new(
                MAIN_CATEGORY,
                records
                    .iter()
                    .map(|r| r.attributes.main_category.clone())
                    .collect::<Vec<Option<String>>>(),
            ),
            Series::new(
                SUB_CATEGORY,
                records
                    .iter()
                    .map(|r| r.attributes.sub_category.clone())
                    .collect::<Vec<Option<String>>>(),
            ),
            Series::new(
                UNIT,
                records
                    .iter()
                    .map(|r| r.attributes.unit.clone())
                    .collect::<Vec<Option<String>>>(),
            ),
            Series::new(
                STOCK_LEVEL,
                records
                    .iter()
                    .map(|r| r.stock_level)
                    .collect::<Vec<Option<f64>>>(),
            ),
            Series::new(
                SALES_QUANTITY,
                records
                    .iter()
                    .map(|r| r.sales_quantity)
                    .collect::<Vec<Option<f64>>>(),
            ),
            Series::new(
                EXPIRATION_DAYS_LEFT,
                records
                    .iter()
                    .map(|r| r.expiration_days_left)
                    .collect::<Vec<Option<f64>>>(),
            ),
            Series::new(
                ORDERED_QUANTITY,
                records
                    .iter()
                    .map(|r| r.ordered_quantity)
                    .collect::<Vec<Option<f64>>>(),
            ),
        ])?;

        Ok(df)
    }

    /// Write a history table as CSV
    pub fn write_csv<W: Write>(frame: &HistoryFrame, writer: W) -> Result<()> {
        let mut df = Self::to_dataframe(frame)?;
        CsvWriter::new(writer).has_header(true).finish(&mut df)?;
        Ok(())
    }

    /// Actual header of a canonical column, tolerating surrounding whitespace
    fn find_column<'a>(df: &'a DataFrame, name: &str) -> Option<&'a str> {
        df.get_column_names()
            .into_iter()
            .find(|c| c.trim() == name)
    }

    /// Helper method to get a column as trimmed, non-empty text values
    fn text_column(df: &DataFrame, name: &str, height: usize) -> Result<Vec<Option<String>>> {
        let Some(actual) = Self::find_column(df, name) else {
            return Ok(vec![None; height]);
        };

        let series = df
            .column(actual)
            .map_err(|e| {
                ForecastError::ValidationError(format!("Column '{}' not found: {}", name, e))
            })?
            .cast(&DataType::Utf8)?;

        let values = series
            .utf8()?
            .into_iter()
            .map(|v| {
                v.map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .collect();

        Ok(values)
    }

    /// Helper method to get a column as f64 values; unparseable cells read as null
    fn numeric_column(df: &DataFrame, name: &str, height: usize) -> Result<Vec<Option<f64>>> {
        let values = Self::text_column(df, name, height)?
            .into_iter()
            .map(|v| v.and_then(|s| s.parse::<f64>().ok()).filter(|f| f.is_finite()))
            .collect();

        Ok(values)
    }
}
