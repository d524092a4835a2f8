//! Persisted order history
//!
//! The history is a table of monthly observations keyed by
//! (month, store_id, product_code). It grows by merging uploads into it and
//! is written back only after a forecast succeeded. Storage is abstracted
//! behind [`HistoryStore`] so callers can swap the CSV file for a fake.

use crate::data::DataLoader;
use crate::error::{ForecastError, Result};
use crate::month::CalendarMonth;
use crate::record::{Observation, PairKey, RawObservation, RawTable, IDENTITY_COLUMNS};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Key-unique observations sorted by month
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFrame {
    records: Vec<Observation>,
}

/// Result of merging a table into the history
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Merged history
    pub frame: HistoryFrame,
    /// Incoming rows dropped for an invalid date or a missing store/product
    pub dropped_rows: usize,
}

impl HistoryFrame {
    /// An empty history
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a history from raw rows, applying the same rules as a merge
    pub fn from_raw(table: &RawTable) -> Result<MergeOutcome> {
        merge(&Self::empty(), table)
    }

    /// Observations, sorted by month
    pub fn records(&self) -> &[Observation] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Latest month in the history
    pub fn max_month(&self) -> Option<CalendarMonth> {
        self.records.last().map(|r| r.month)
    }

    /// Whether any observation falls in `month`
    pub fn contains_month(&self, month: CalendarMonth) -> bool {
        self.records.iter().any(|r| r.month == month)
    }

    /// Observations of one store/product pair, oldest first
    pub fn pair_records<'a>(&'a self, pair: &'a PairKey) -> impl Iterator<Item = &'a Observation> {
        self.records
            .iter()
            .filter(move |r| r.store_id == pair.store_id && r.product_code == pair.product_code)
    }

    /// Back to raw rows with every canonical column present
    pub fn to_raw_table(&self) -> RawTable {
        RawTable::with_canonical_columns(self.records.iter().map(RawObservation::from).collect())
    }
}

/// Merge an incoming table into a base history
///
/// Incoming rows are appended after the base rows, rows without a valid date
/// or identity are dropped, the result is sorted by month, and for duplicate
/// (month, store_id, product_code) keys the later row wins. Merging the same
/// table twice yields the same history as merging it once.
pub fn merge(base: &HistoryFrame, incoming: &RawTable) -> Result<MergeOutcome> {
    let missing = incoming.missing_columns(&IDENTITY_COLUMNS);
    if !missing.is_empty() {
        return Err(ForecastError::MergeError(format!(
            "incoming table lacks identity columns: {}",
            missing.join(", ")
        )));
    }

    let parsed: Vec<Observation> = incoming.rows().iter().filter_map(|r| r.parse()).collect();
    let dropped_rows = incoming.len() - parsed.len();

    let mut seen = HashSet::new();
    let mut records: Vec<Observation> = base
        .records
        .iter()
        .cloned()
        .chain(parsed)
        .rev()
        .filter(|r| seen.insert((r.month, r.store_id.clone(), r.product_code.clone())))
        .collect();
    records.reverse();
    records.sort_by_key(|r| r.month);

    debug!(
        base = base.len(),
        incoming = incoming.len(),
        merged = records.len(),
        dropped_rows,
        "merged history"
    );

    Ok(MergeOutcome {
        frame: HistoryFrame { records },
        dropped_rows,
    })
}

/// Durable storage for the order history
///
/// Implementations are shared between requests; concurrent callers that both
/// merge and persist race, and the later persist wins.
pub trait HistoryStore: Send + Sync {
    /// Load the stored history, or an empty one when nothing was stored yet
    fn load(&self) -> Result<HistoryFrame>;

    /// Merge an incoming table into a history
    fn merge(&self, base: &HistoryFrame, incoming: &RawTable) -> Result<MergeOutcome> {
        merge(base, incoming)
    }

    /// Replace the stored history
    fn persist(&self, frame: &HistoryFrame) -> Result<()>;
}

/// History stored in a CSV file
#[derive(Debug, Clone)]
pub struct CsvHistoryStore {
    path: PathBuf,
}

impl CsvHistoryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for CsvHistoryStore {
    fn load(&self) -> Result<HistoryFrame> {
        let is_blank = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no stored history, starting empty");
                return Ok(HistoryFrame::empty());
            }
            Err(e) => return Err(e.into()),
        };
        if is_blank {
            return Ok(HistoryFrame::empty());
        }

        let table = DataLoader::from_csv(&self.path)?;
        // A broken stored file is a server fault, not a bad request
        let outcome = HistoryFrame::from_raw(&table).map_err(|e| {
            ForecastError::PersistenceError(format!(
                "stored history {} is unusable: {}",
                self.path.display(),
                e
            ))
        })?;
        info!(
            path = %self.path.display(),
            records = outcome.frame.len(),
            dropped_rows = outcome.dropped_rows,
            "loaded stored history"
        );
        Ok(outcome.frame)
    }

    /// Write to a temporary file beside the target, then rename it into place
    fn persist(&self, frame: &HistoryFrame) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        DataLoader::write_csv(frame, tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| ForecastError::PersistenceError(e.to_string()))?;

        info!(path = %self.path.display(), records = frame.len(), "persisted history");
        Ok(())
    }
}

/// History kept in memory, for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    frame: Mutex<Option<HistoryFrame>>,
    fail_persist: AtomicBool,
    persist_count: AtomicUsize,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds a history
    pub fn with_history(frame: HistoryFrame) -> Self {
        Self {
            frame: Mutex::new(Some(frame)),
            ..Self::default()
        }
    }

    /// Make every following persist fail
    pub fn set_fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    /// Stored history, `None` if nothing was ever stored
    pub fn snapshot(&self) -> Option<HistoryFrame> {
        self.frame.lock().ok().and_then(|guard| guard.clone())
    }

    /// Number of successful persists
    pub fn persist_count(&self) -> usize {
        self.persist_count.load(Ordering::SeqCst)
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn load(&self) -> Result<HistoryFrame> {
        let guard = self
            .frame
            .lock()
            .map_err(|e| ForecastError::PersistenceError(e.to_string()))?;
        Ok(guard.clone().unwrap_or_default())
    }

    fn persist(&self, frame: &HistoryFrame) -> Result<()> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(ForecastError::PersistenceError(
                "in-memory store is set to fail".to_string(),
            ));
        }

        let mut guard = self
            .frame
            .lock()
            .map_err(|e| ForecastError::PersistenceError(e.to_string()))?;
        *guard = Some(frame.clone());
        self.persist_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
