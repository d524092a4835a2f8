use order_forecast::history::merge;
use order_forecast::{CsvHistoryStore, DataLoader, ForecastError, HistoryFrame, HistoryStore};
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

const HEADER: &str = "date,store_id,product_code,product_name,main_category,sub_category,unit,stock_level,sales_quantity,expiration_days_left,ordered_quantity";

fn sample_csv() -> String {
    [
        HEADER,
        "2024-02-10,S1,P1,Aspirin,Drug,Pain,box,5,12,150,14",
        "2024-01,S1,P1,Aspirin,Drug,Pain,box,4,10,180,11",
        "2024-01,S2,P1,Aspirin,,Pain,,3,7.5,,8",
        "not a date,S1,P1,Aspirin,Drug,Pain,box,1,1,1,1",
    ]
    .join("\n")
}

#[test]
fn test_missing_file_is_cold_start() {
    let dir = tempdir().unwrap();
    let store = CsvHistoryStore::new(dir.path().join("absent.csv"));
    assert!(store.load().unwrap().is_empty());
}

#[test]
fn test_empty_file_is_cold_start() {
    let file = NamedTempFile::new().unwrap();
    let store = CsvHistoryStore::new(file.path());
    assert!(store.load().unwrap().is_empty());
}

#[test]
fn test_stored_file_without_identity_columns_is_server_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "date,store_id,sales_quantity").unwrap();
    writeln!(file, "2024-01,S1,4").unwrap();

    let err = CsvHistoryStore::new(file.path()).load().unwrap_err();
    assert!(matches!(err, ForecastError::PersistenceError(_)));
    assert!(err.to_string().contains("product_code"));
    assert_eq!(err.http_status(), 500);
}

#[test]
fn test_load_normalizes_and_sorts() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", sample_csv()).unwrap();

    let frame = CsvHistoryStore::new(file.path()).load().unwrap();
    assert_eq!(frame.len(), 3);

    let months: Vec<String> = frame.records().iter().map(|r| r.month.to_string()).collect();
    assert_eq!(months, vec!["2024-01", "2024-01", "2024-02"]);
    let s2 = &frame.records()[1];
    assert_eq!(s2.store_id, "S2");
    assert_eq!(s2.attributes.main_category, None);
    assert_eq!(s2.expiration_days_left, None);
    assert_eq!(s2.sales_quantity, Some(7.5));
}

#[test]
fn test_persist_then_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("history.csv");
    let table = DataLoader::from_bytes(sample_csv().as_bytes()).unwrap();
    let frame = HistoryFrame::from_raw(&table).unwrap().frame;

    let store = CsvHistoryStore::new(&path);
    store.persist(&frame).unwrap();
    assert!(path.exists());

    let reloaded = store.load().unwrap();
    assert_eq!(reloaded, frame);

    // Dates are stored as calendar months
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("date,store_id,product_code"));
    assert!(text.contains("2024-02,S1,P1"));
    assert!(!text.contains("2024-02-10"));
}

#[test]
fn test_persist_replaces_previous_history() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("history.csv");
    let store = CsvHistoryStore::new(&path);

    let table = DataLoader::from_bytes(sample_csv().as_bytes()).unwrap();
    let full = HistoryFrame::from_raw(&table).unwrap().frame;
    store.persist(&full).unwrap();
    store.persist(&HistoryFrame::empty()).unwrap();

    assert!(store.load().unwrap().is_empty());
}

#[test]
fn test_merge_same_upload_twice() {
    let table = DataLoader::from_bytes(sample_csv().as_bytes()).unwrap();
    let once = merge(&HistoryFrame::empty(), &table).unwrap();
    let twice = merge(&once.frame, &table).unwrap();

    assert_eq!(once.dropped_rows, 1);
    assert_eq!(once.frame, twice.frame);
}
