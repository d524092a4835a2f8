//! Calendar-month parsing
//!
//! Uploads mix `YYYY-MM` and `YYYY-MM-DD` values. Strings of seven characters
//! or fewer are read as `YYYY-MM` by appending `-01`; everything is truncated
//! to the first day of its month.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;

/// A date truncated to year and month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarMonth(NaiveDate);

impl CalendarMonth {
    /// Build from a year and month number
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    /// Parse a date-like string, `None` when it is not a date
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        let normalized = if value.len() <= 7 {
            format!("{}-01", value)
        } else {
            value.to_string()
        };

        NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
            .ok()
            .or_else(|| {
                ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
                    .map(|dt| dt.date())
            })
            .map(Self::from_date)
    }

    /// Truncate a date to its month
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.with_day(1).unwrap_or(date))
    }

    /// The following calendar month
    pub fn succ(&self) -> Option<Self> {
        self.0.checked_add_months(Months::new(1)).map(Self)
    }

    /// Calendar year
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Month number, 1 through 12
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// First day of the month
    pub fn first_day(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for CalendarMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl Serialize for CalendarMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parse a batch of date-like strings
pub fn parse_months<S: AsRef<str>>(values: &[S]) -> Vec<Option<CalendarMonth>> {
    values.iter().map(|v| CalendarMonth::parse(v.as_ref())).collect()
}

/// Latest valid month of a dataset
pub fn cutoff_month<I>(months: I) -> Option<CalendarMonth>
where
    I: IntoIterator<Item = CalendarMonth>,
{
    months.into_iter().max()
}
