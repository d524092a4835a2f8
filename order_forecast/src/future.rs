//! Placeholder rows for the month being forecast

use crate::error::{ForecastError, Result};
use crate::history::HistoryFrame;
use crate::month::CalendarMonth;
use crate::record::{Observation, PairKey, ProductAttributes};
use std::collections::HashMap;
use tracing::debug;

/// History up to the cutoff plus one placeholder row per eligible pair
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingSet {
    /// History rows followed by the placeholder rows
    pub rows: Vec<Observation>,
    /// Month being forecast
    pub predict_month: CalendarMonth,
    /// Number of placeholder rows at the end of `rows`
    pub future_rows: usize,
}

impl WorkingSet {
    /// Placeholder rows, one per eligible pair
    ///
    /// A `future_rows` larger than `rows` yields every row.
    pub fn future(&self) -> &[Observation] {
        &self.rows[self.rows.len().saturating_sub(self.future_rows)..]
    }
}

/// The month after the cutoff
pub fn predict_month(cutoff: CalendarMonth) -> Result<CalendarMonth> {
    cutoff.succ().ok_or_else(|| {
        ForecastError::ValidationError(format!("no calendar month follows {}", cutoff))
    })
}

/// Refuse to forecast a month that is already in the history
pub fn check_conflict(history: &HistoryFrame, predict_month: CalendarMonth) -> Result<()> {
    if history.contains_month(predict_month) {
        return Err(ForecastError::ConflictError(predict_month.to_string()));
    }
    Ok(())
}

/// Static attributes of each product code, taken from its latest record
///
/// The history is sorted by month, so the last record seen for a code is the
/// most recent one.
pub fn latest_attributes(history: &HistoryFrame) -> HashMap<String, ProductAttributes> {
    history
        .records()
        .iter()
        .map(|r| (r.product_code.clone(), r.attributes.clone()))
        .collect()
}

/// Build the working set for forecasting `cutoff + 1`
pub fn build_working_set(
    history: &HistoryFrame,
    cutoff: CalendarMonth,
    pairs: &[PairKey],
    expiration_days: f64,
) -> Result<WorkingSet> {
    let predict_month = predict_month(cutoff)?;
    check_conflict(history, predict_month)?;

    let attributes = latest_attributes(history);
    let future: Vec<Observation> = pairs
        .iter()
        .map(|pair| Observation {
            month: predict_month,
            store_id: pair.store_id.clone(),
            product_code: pair.product_code.clone(),
            attributes: attributes
                .get(&pair.product_code)
                .cloned()
                .unwrap_or_default(),
            stock_level: Some(0.0),
            sales_quantity: Some(0.0),
            expiration_days_left: Some(expiration_days),
            ordered_quantity: Some(0.0),
        })
        .collect();

    let future_rows = future.len();
    let rows: Vec<Observation> = history
        .records()
        .iter()
        .filter(|r| r.month <= cutoff)
        .cloned()
        .chain(future)
        .collect();

    debug!(
        %predict_month,
        history_rows = rows.len() - future_rows,
        future_rows,
        "built working set"
    );

    Ok(WorkingSet {
        rows,
        predict_month,
        future_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RawObservation, RawTable};

    fn history() -> HistoryFrame {
        let row = |date: &str, store: &str, name: &str| RawObservation {
            date: Some(date.to_string()),
            store_id: Some(store.to_string()),
            product_code: Some("P1".to_string()),
            attributes: ProductAttributes {
                product_name: Some(name.to_string()),
                unit: Some("box".to_string()),
                ..ProductAttributes::default()
            },
            sales_quantity: Some(5.0),
            ..RawObservation::default()
        };
        HistoryFrame::from_raw(&RawTable::with_canonical_columns(vec![
            row("2024-01", "S1", "Old name"),
            row("2024-02", "S2", "New name"),
            row("2024-05", "S1", "Later name"),
        ]))
        .unwrap()
        .frame
    }

    #[test]
    fn test_future_rows_carry_latest_attributes() {
        let frame = history();
        let cutoff = CalendarMonth::new(2024, 2).unwrap();
        let pairs = vec![PairKey::new("S1", "P1"), PairKey::new("S2", "P1")];

        let working = build_working_set(&frame, cutoff, &pairs, 180.0).unwrap();
        assert_eq!(working.predict_month.to_string(), "2024-03");
        assert_eq!(working.future_rows, 2);
        // The 2024-05 row lies beyond the cutoff and is left out
        assert_eq!(working.rows.len(), 4);

        for row in working.future() {
            assert_eq!(row.month, working.predict_month);
            assert_eq!(row.sales_quantity, Some(0.0));
            assert_eq!(row.expiration_days_left, Some(180.0));
            assert_eq!(row.ordered_quantity, Some(0.0));
            assert_eq!(row.attributes.product_name.as_deref(), Some("Later name"));
            assert_eq!(row.attributes.unit.as_deref(), Some("box"));
        }
    }

    #[test]
    fn test_future_with_oversized_count() {
        let working = WorkingSet {
            rows: Vec::new(),
            predict_month: CalendarMonth::new(2024, 3).unwrap(),
            future_rows: 2,
        };
        assert!(working.future().is_empty());
    }

    #[test]
    fn test_conflict_when_month_exists() {
        let frame = history();
        let cutoff = CalendarMonth::new(2024, 4).unwrap();
        let err = build_working_set(&frame, cutoff, &[PairKey::new("S1", "P1")], 180.0)
            .unwrap_err();

        assert!(matches!(err, ForecastError::ConflictError(ref m) if m == "2024-05"));
    }
}
