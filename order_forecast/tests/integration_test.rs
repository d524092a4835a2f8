use order_forecast::record::CANONICAL_COLUMNS;
use order_forecast::{
    CsvHistoryStore, DataLoader, ForecastConfig, ForecastError, ForecastRequest, ForecastService,
    HistoryFrame, HistoryStore, InMemoryHistoryStore, PairKey,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::tempdir;

/// (date, store, product, sales)
type Row<'a> = (&'a str, &'a str, &'a str, f64);

// Helper function to build a CSV upload with every canonical column
fn upload_csv(rows: &[Row]) -> Vec<u8> {
    upload_csv_with_columns(rows, &CANONICAL_COLUMNS)
}

fn upload_csv_with_columns(rows: &[Row], columns: &[&str]) -> Vec<u8> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns).unwrap();
    for (date, store, product, sales) in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|column| match *column {
                "date" => date.to_string(),
                "store_id" => store.to_string(),
                "product_code" => product.to_string(),
                "product_name" => format!("Product {}", product),
                "main_category" => "Pharma".to_string(),
                "sub_category" => "Pain".to_string(),
                "unit" => "box".to_string(),
                "stock_level" => "20".to_string(),
                "sales_quantity" => sales.to_string(),
                "expiration_days_left" => "200".to_string(),
                "ordered_quantity" => (sales + 2.0).to_string(),
                _ => String::new(),
            })
            .collect();
        writer.write_record(&record).unwrap();
    }
    writer.into_inner().unwrap()
}

fn history(rows: &[Row]) -> HistoryFrame {
    let table = DataLoader::from_bytes(&upload_csv(rows)).unwrap();
    HistoryFrame::from_raw(&table).unwrap().frame
}

fn s1_p1_history() -> Vec<Row<'static>> {
    vec![
        ("2024-01", "S1", "P1", 10.0),
        ("2024-02", "S1", "P1", 12.0),
        ("2024-03", "S1", "P1", 9.0),
        ("2024-04", "S1", "P1", 11.0),
        ("2024-05", "S1", "P1", 13.0),
        ("2024-06", "S1", "P1", 10.0),
    ]
}

fn two_pair_history() -> Vec<Row<'static>> {
    let mut rows = s1_p1_history();
    rows.extend([
        ("2024-04", "S2", "P2", 3.0),
        ("2024-05", "S2", "P2", 4.0),
        ("2024-06", "S2", "P2", 5.0),
    ]);
    rows
}

fn fast_config() -> ForecastConfig {
    let mut config = ForecastConfig::default();
    config.boosting.n_estimators = 25;
    config
}

#[test]
fn test_monthly_upload_forecasts_next_month() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("history.csv");
    let store = CsvHistoryStore::new(&path);
    store.persist(&history(&s1_p1_history())).unwrap();

    let service = ForecastService::new(store, fast_config().with_history_path(&path));
    let upload = upload_csv(&[("2024-07", "S1", "P1", 14.0)]);
    let outcome = service
        .run(ForecastRequest::new(upload).with_min_months("6"))
        .unwrap();

    assert_eq!(outcome.predict_month.to_string(), "2024-08");
    assert_eq!(outcome.predictions.len(), 1);
    let row = &outcome.predictions[0];
    assert_eq!(row.store_id, "S1");
    assert_eq!(row.product_code, "P1");
    assert_eq!(row.product_name, "Product P1");
    assert_eq!(row.unit, "box");
    assert!(outcome.persisted);

    let stored = CsvHistoryStore::new(&path).load().unwrap();
    assert_eq!(stored.pair_records(&PairKey::new("S1", "P1")).count(), 7);
}

#[test]
fn test_missing_column_rejected_without_side_effects() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("history.csv");
    let service = ForecastService::new(CsvHistoryStore::new(&path), fast_config());

    let columns: Vec<&str> = CANONICAL_COLUMNS
        .iter()
        .copied()
        .filter(|c| *c != "unit")
        .collect();
    let upload = upload_csv_with_columns(&s1_p1_history(), &columns);
    let response = service.forecast(ForecastRequest::new(upload));

    assert!(!response.success);
    assert_eq!(response.data, None);
    assert!(response.error.unwrap().contains("unit"));
    assert!(!path.exists());
}

#[test]
fn test_conflicting_month_is_rejected_every_time() {
    let mut rows = s1_p1_history();
    rows.push(("2024-07", "S1", "P1", 14.0));
    let stored = history(&rows);
    let store = InMemoryHistoryStore::with_history(stored.clone());
    let service = ForecastService::new(store, fast_config());

    let upload = upload_csv(&[("2024-06", "S1", "P1", 10.0)]);
    for _ in 0..2 {
        let err = service
            .run(ForecastRequest::new(upload.clone()).with_min_months("1"))
            .unwrap_err();
        assert!(matches!(err, ForecastError::ConflictError(ref m) if m == "2024-07"));
        assert_eq!(err.http_status(), 400);
    }

    assert_eq!(service.store().persist_count(), 0);
    assert_eq!(service.store().snapshot(), Some(stored));
}

#[test]
fn test_unkeyed_row_does_not_move_forecast_month() {
    let store = InMemoryHistoryStore::with_history(history(&s1_p1_history()));
    let service = ForecastService::new(store, fast_config());

    let upload = upload_csv(&[("2024-07", "S1", "P1", 12.0), ("2024-11", "", "P1", 3.0)]);
    let outcome = service.run(ForecastRequest::new(upload)).unwrap();

    assert_eq!(outcome.predict_month.to_string(), "2024-08");
    assert_eq!(outcome.dropped_rows, 1);
    assert_eq!(outcome.predictions.len(), 1);
}

#[test]
fn test_upload_without_keyed_rows_is_rejected() {
    let service = ForecastService::new(InMemoryHistoryStore::new(), fast_config());
    let upload = upload_csv(&[("2024-07", "", "P1", 12.0), ("bad", "S1", "P1", 3.0)]);

    let err = service.run(ForecastRequest::new(upload)).unwrap_err();
    assert!(matches!(err, ForecastError::ValidationError(_)));
    assert_eq!(service.store().persist_count(), 0);
}

#[rstest]
#[case(Some("6"), 1)]
#[case(Some("5"), 1)]
#[case(Some("4"), 2)]
#[case(Some("0"), 2)]
#[case(Some("many"), 1)]
#[case(None, 1)]
fn test_min_months_controls_eligible_pairs(
    #[case] min_months: Option<&str>,
    #[case] expected_rows: usize,
) {
    let store = InMemoryHistoryStore::with_history(history(&two_pair_history()));
    let service = ForecastService::new(store, fast_config());

    let upload = upload_csv(&[("2024-07", "S1", "P1", 14.0), ("2024-07", "S2", "P2", 6.0)]);
    let mut request = ForecastRequest::new(upload);
    request.min_months = min_months.map(str::to_string);
    let outcome = service.run(request).unwrap();

    assert_eq!(outcome.predictions.len(), expected_rows);
    assert_eq!(outcome.predictions[0].store_id, "S1");
}

#[test]
fn test_no_eligible_pair() {
    let service = ForecastService::new(InMemoryHistoryStore::new(), fast_config());
    let upload = upload_csv(&[("2024-07", "S1", "P1", 14.0)]);

    let response = service.forecast(ForecastRequest::new(upload));
    assert!(!response.success);
    assert!(response.error.unwrap().contains("at least 6 months"));
    assert_eq!(service.store().persist_count(), 0);
}

#[test]
fn test_repeated_upload_leaves_history_unchanged() {
    let store = InMemoryHistoryStore::with_history(history(&s1_p1_history()));
    let service = ForecastService::new(store, fast_config());
    let upload = upload_csv(&[("2024-07", "S1", "P1", 14.0)]);

    let first = service.run(ForecastRequest::new(upload.clone())).unwrap();
    let after_first = service.store().snapshot().unwrap();
    let second = service.run(ForecastRequest::new(upload)).unwrap();
    let after_second = service.store().snapshot().unwrap();

    assert_eq!(after_first, after_second);
    assert_eq!(after_first.len(), 7);
    assert_eq!(first.predictions, second.predictions);
}

#[test]
fn test_persist_failure_still_returns_forecast() {
    let store = InMemoryHistoryStore::with_history(history(&s1_p1_history()));
    store.set_fail_persist(true);
    let service = ForecastService::new(store, fast_config());

    let upload = upload_csv(&[("2024-07", "S1", "P1", 14.0)]);
    let outcome = service.run(ForecastRequest::new(upload.clone())).unwrap();
    assert!(!outcome.persisted);
    assert_eq!(outcome.predictions.len(), 1);

    let response = service.forecast(ForecastRequest::new(upload));
    assert!(response.success);
    assert!(response.model_score.is_some());
}

#[test]
fn test_success_envelope_shape() {
    let store = InMemoryHistoryStore::with_history(history(&s1_p1_history()));
    let service = ForecastService::new(store, fast_config());
    let upload = upload_csv(&[("2024-07", "S1", "P1", 14.0)]);

    let response = service.forecast(ForecastRequest::new(upload));
    let json: serde_json::Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();

    assert_eq!(json["success"], serde_json::json!(true));
    assert!(json["error"].is_null());
    assert!(json["model_score"]["r2"].is_number());
    assert!(json["model_score"]["mae"].is_number());
    let row = &json["data"][0];
    for key in [
        "product_name",
        "product_code",
        "predicted_quantity",
        "store_id",
        "unit",
        "main_category",
        "sub_category",
    ] {
        assert!(row.get(key).is_some(), "missing {}", key);
    }
    assert!(row["predicted_quantity"].is_u64());
}
