//! Which store/product pairs have enough history to forecast

use crate::error::{ForecastError, Result};
use crate::history::HistoryFrame;
use crate::month::CalendarMonth;
use crate::record::PairKey;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Minimum number of distinct months a pair needs, never below 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MinMonths(usize);

impl MinMonths {
    pub fn new(months: usize) -> Self {
        Self(months.max(1))
    }

    /// Read a request parameter
    ///
    /// Absent, blank or non-integer values fall back to `default`; integers
    /// below 1 are raised to 1.
    pub fn parse(raw: Option<&str>, default: usize) -> Self {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => match text.parse::<i64>() {
                Ok(n) if n < 1 => Self::new(1),
                Ok(n) => Self::new(usize::try_from(n).unwrap_or(usize::MAX)),
                Err(_) => Self::new(default),
            },
            None => Self::new(default),
        }
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for MinMonths {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MIN_MONTHS)
    }
}

/// Distinct months per pair at or before `cutoff`
pub fn month_counts(history: &HistoryFrame, cutoff: CalendarMonth) -> BTreeMap<PairKey, usize> {
    let mut months: BTreeMap<PairKey, BTreeSet<CalendarMonth>> = BTreeMap::new();
    for record in history.records().iter().filter(|r| r.month <= cutoff) {
        months.entry(record.pair()).or_default().insert(record.month);
    }

    months
        .into_iter()
        .map(|(pair, set)| (pair, set.len()))
        .collect()
}

/// Pairs with at least `min_months` distinct months at or before `cutoff`, sorted
pub fn eligible_pairs(
    history: &HistoryFrame,
    cutoff: CalendarMonth,
    min_months: MinMonths,
) -> Result<Vec<PairKey>> {
    let counts = month_counts(history, cutoff);
    let total = counts.len();

    let eligible: Vec<PairKey> = counts
        .into_iter()
        .filter(|(_, n)| *n >= min_months.get())
        .map(|(pair, _)| pair)
        .collect();

    debug!(
        pairs = total,
        eligible = eligible.len(),
        min_months = min_months.get(),
        %cutoff,
        "filtered eligible pairs"
    );

    if eligible.is_empty() {
        return Err(ForecastError::EligibilityError {
            min_months: min_months.get(),
        });
    }

    Ok(eligible)
}
