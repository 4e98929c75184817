//! Scan Pipeline Integration Tests
//!
//! End-to-end behavior of the scanner against in-memory doubles: candidate
//! validation, partial failure, tolerant parsing and dedup.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use common::{array, date, entry, fast_scanner, MemoryStore, ScriptedOracle, StaticMessages};
use lithium_watch::adapters::{ChannelMessage, ExtractionOracle, OracleError, OracleOutput};
use lithium_watch::core::{PacingPolicy, RetryPolicy, Scanner};
use lithium_watch::domain::{DataSource, IncidentCandidate, ScanStatus};

#[tokio::test]
async fn test_half_failure_keeps_other_half() {
    let first_half = array(&[
        entry("2024-02-01", "Haifa", "e-bike"),
        entry("2024-03-15", "Ashdod", "e-scooter"),
        entry("2024-05-20", "Holon", "power bank"),
    ]);
    let oracle = ScriptedOracle::new(vec![
        Ok(first_half),
        Err(OracleError::Transport("connection timed out".to_string())),
    ]);
    let store = MemoryStore::new();

    let report = fast_scanner(oracle.clone(), store.clone()).scan_year(2024).await;

    assert_eq!(report.total_inserted(), 3);
    assert_eq!(report.total_duplicates(), 0);
    assert_eq!(report.errors().count(), 1);
    assert!(report.details[1].is_failed());
    assert!(report.details[1]
        .error
        .as_deref()
        .unwrap()
        .contains("connection timed out"));
    assert_eq!(report.status(), ScanStatus::Partial);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_invalid_candidates_never_reach_store() {
    let response = r#"[
        {"incident_date":"2024-01-10","city":"Haifa","device_type":"e-bike"},
        {"city":"Haifa","device_type":"e-bike"},
        {"incident_date":"2024-01-11","device_type":"e-bike"},
        {"incident_date":"2024-01-12","city":"Lod"},
        {"incident_date":"not a date","city":"Lod","device_type":"e-bike"}
    ]"#;
    let oracle = ScriptedOracle::new(vec![Ok(response.to_string())]);
    let store = MemoryStore::new();

    let report = fast_scanner(oracle, store.clone()).scan_month(2024, 1).await;
    let detail = &report.details[0];

    assert_eq!(detail.examined, 5);
    assert_eq!(detail.found, 1);
    assert_eq!(detail.inserted, 1);
    assert_eq!(detail.duplicates, 0);
    assert!(!detail.is_failed());

    // One exact + one window lookup, one insert: all for the valid entry
    assert_eq!(store.reads(), 2);
    assert_eq!(store.insert_calls(), 1);
}

#[tokio::test]
async fn test_fenced_response_matches_unfenced() {
    let body = array(&[entry("2024-04-01", "Eilat", "e-bike")]);

    let plain_store = MemoryStore::new();
    let plain = fast_scanner(ScriptedOracle::new(vec![Ok(body.clone())]), plain_store.clone())
        .scan_month(2024, 4)
        .await;

    let fenced_store = MemoryStore::new();
    let fenced = fast_scanner(
        ScriptedOracle::new(vec![Ok(format!("```json\n{}\n```", body))]),
        fenced_store.clone(),
    )
    .scan_month(2024, 4)
    .await;

    assert_eq!(plain.details, fenced.details);
    assert_eq!(
        plain_store.rows.lock().unwrap()[0].candidate,
        fenced_store.rows.lock().unwrap()[0].candidate
    );
}

#[tokio::test]
async fn test_response_without_array_skips_half() {
    let oracle = ScriptedOracle::new(vec![
        Ok("I could not find any reports for this period.".to_string()),
        Ok(array(&[entry("2023-08-09", "Netanya", "laptop")])),
    ]);
    let store = MemoryStore::new();

    let report = fast_scanner(oracle, store.clone()).scan_year(2023).await;

    let first = &report.details[0];
    assert!(first.is_failed());
    assert_eq!(first.inserted, 0);
    assert_eq!(first.duplicates, 0);

    assert_eq!(report.total_inserted(), 1);
    assert_eq!(report.status(), ScanStatus::Partial);
}

#[tokio::test]
async fn test_empty_array_is_not_an_error() {
    let oracle = ScriptedOracle::new(vec![Ok("[]".to_string()), Ok("```json\n[]\n```".to_string())]);
    let report = fast_scanner(oracle, MemoryStore::new()).scan_year(2022).await;

    assert_eq!(report.status(), ScanStatus::Success);
    assert_eq!(report.total_found(), 0);
}

#[tokio::test]
async fn test_existing_incident_within_window_is_duplicate() {
    let store = MemoryStore::seeded(vec![IncidentCandidate::new(
        date("2024-06-10"),
        "Rishon LeZion",
        "e-bike",
    )]);
    let oracle = ScriptedOracle::new(vec![Ok(array(&[
        entry("2024-06-12", "Rishon LeZion", "e-bike"),
        entry("2024-06-14", "Rishon LeZion", "e-bike"),
    ]))]);

    let report = fast_scanner(oracle, store.clone()).scan_month(2024, 6).await;

    assert_eq!(report.total_duplicates(), 1);
    assert_eq!(report.total_inserted(), 1);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_duplicates_within_one_response() {
    // The second entry is two days from the first, which is inserted first
    let oracle = ScriptedOracle::new(vec![Ok(array(&[
        entry("2024-09-01", "Bat Yam", "e-scooter"),
        entry("2024-09-03", "Bat Yam", "e-scooter"),
    ]))]);
    let store = MemoryStore::new();

    let report = fast_scanner(oracle, store.clone()).scan_month(2024, 9).await;

    assert_eq!(report.total_inserted(), 1);
    assert_eq!(report.total_duplicates(), 1);
}

#[tokio::test]
async fn test_store_read_failure_inserts_anyway() {
    let store = MemoryStore::seeded(vec![IncidentCandidate::new(
        date("2024-06-10"),
        "Haifa",
        "e-bike",
    )]);
    store.fail_reads.store(true, Ordering::SeqCst);
    let oracle = ScriptedOracle::new(vec![Ok(array(&[entry("2024-06-10", "Haifa", "e-bike")]))]);

    let report = fast_scanner(oracle, store.clone()).scan_month(2024, 6).await;

    assert_eq!(report.total_inserted(), 1);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_insert_failures_are_counted() {
    let store = MemoryStore::new();
    store.fail_inserts.store(true, Ordering::SeqCst);
    let oracle = ScriptedOracle::new(vec![Ok(array(&[
        entry("2024-01-01", "Haifa", "e-bike"),
        entry("2024-01-20", "Lod", "e-bike"),
    ]))]);

    let report = fast_scanner(oracle, store.clone()).scan_month(2024, 1).await;
    let detail = &report.details[0];

    assert_eq!(detail.insert_errors, 2);
    assert_eq!(detail.inserted, 0);
    assert!(!detail.is_failed());
}

#[tokio::test]
async fn test_transient_oracle_errors_are_retried() {
    let oracle = ScriptedOracle::new(vec![
        Err(OracleError::Status {
            status: 503,
            body: "overloaded".to_string(),
        }),
        Ok(array(&[entry("2024-02-02", "Tiberias", "e-bike")])),
    ]);
    let store = MemoryStore::new();

    let retry = RetryPolicy {
        max_attempts: 2,
        initial_delay_ms: 0,
        max_delay_ms: 0,
        backoff_multiplier: 1.0,
    };
    let report = fast_scanner(oracle.clone(), store)
        .with_retry(retry)
        .scan_month(2024, 2)
        .await;

    assert_eq!(oracle.calls(), 2);
    assert_eq!(report.total_inserted(), 1);
}

#[tokio::test]
async fn test_channel_scan_feeds_messages_to_oracle() {
    let messages = Arc::new(StaticMessages {
        messages: vec![ChannelMessage {
            text: "שריפה בחניון בעקבות סוללת אופניים חשמליים".to_string(),
            date: Some("2024-07-01T06:30:00+00:00".to_string()),
            url: Some("https://t.me/fire_il/5".to_string()),
        }],
        ..Default::default()
    });
    let oracle = ScriptedOracle::new(vec![Ok(array(&[entry("2024-07-01", "Petah Tikva", "e-bike")]))]);
    let store = MemoryStore::new();

    let report = fast_scanner(oracle.clone(), store.clone())
        .with_message_source(messages.clone())
        .scan_channel("fire_il", "סוללת ליתיום")
        .await;

    assert_eq!(report.data_source, DataSource::TelegramScan);
    assert_eq!(report.total_inserted(), 1);
    assert!(oracle.prompts.lock().unwrap()[0].contains("https://t.me/fire_il/5"));

    let row = &store.rows.lock().unwrap()[0];
    assert_eq!(row.data_source, DataSource::TelegramScan);
    assert!(!row.verified);
}

/// Oracle that notes when each call arrives
#[derive(Default)]
struct TimedOracle {
    calls: Mutex<Vec<Instant>>,
}

#[async_trait]
impl ExtractionOracle for TimedOracle {
    fn name(&self) -> &str {
        "timed"
    }

    async fn generate(&self, _prompt: &str) -> Result<OracleOutput, OracleError> {
        self.calls.lock().unwrap().push(Instant::now());
        Ok(OracleOutput::new("[]".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_halves_are_paced_apart() {
    let oracle = Arc::new(TimedOracle::default());
    let scanner = Scanner::new(oracle.clone(), MemoryStore::new())
        .with_retry(RetryPolicy::none())
        .with_pacing(PacingPolicy::new(Duration::from_secs(1)));

    let report = scanner.scan_year(2024).await;
    assert_eq!(report.details.len(), 2);

    let calls = oracle.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].duration_since(calls[0]) >= Duration::from_secs(1));
}
