//! Run Ledger Integration Tests
//!
//! Tests for the JSONL event format, append order and run reconstruction.

use lithium_watch::core::EventStore;
use lithium_watch::domain::{Run, RunEvent, RunEventType, RunState, TaskOutcome, TaskStatus};
use tempfile::TempDir;
use uuid::Uuid;

fn task_event(run_id: Uuid, task: &str, event_type: RunEventType) -> RunEvent {
    RunEvent::new(
        run_id,
        Some(task.to_string()),
        event_type,
        format!("{} {:?}", task, event_type),
    )
}

#[tokio::test]
async fn test_one_json_object_per_line() {
    let temp = TempDir::new().unwrap();
    let run_id = Uuid::new_v4();
    let store = EventStore::open_in(temp.path(), run_id).await.unwrap();

    store
        .append(&RunEvent::new(
            run_id,
            None,
            RunEventType::RunStarted,
            "Run started".to_string(),
        ))
        .await
        .unwrap();
    store
        .append(
            &task_event(run_id, "2024-01", RunEventType::TaskCompleted)
                .with_outcome(TaskOutcome {
                    examined: 4,
                    found: 3,
                    inserted: 2,
                    duplicates: 1,
                    error: None,
                })
                .with_duration(1200),
        )
        .await
        .unwrap();

    let content = tokio::fs::read_to_string(store.events_path()).await.unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second["event_type"], "task_completed");
    assert_eq!(second["task"], "2024-01");
    assert_eq!(second["outcome"]["inserted"], 2);
    assert_eq!(second["duration_ms"], 1200);
    assert!(second["timestamp"].as_str().unwrap().contains('T'));
}

#[tokio::test]
async fn test_replay_preserves_order() {
    let temp = TempDir::new().unwrap();
    let run_id = Uuid::new_v4();
    let store = EventStore::open_in(temp.path(), run_id).await.unwrap();

    let labels = ["2024-01", "2024-02", "2024-03", "fire_il / e-bike"];
    for label in labels {
        store
            .append(&task_event(run_id, label, RunEventType::TaskStarted))
            .await
            .unwrap();
    }

    let replayed: Vec<String> = store
        .replay()
        .await
        .unwrap()
        .into_iter()
        .filter_map(|e| e.task)
        .collect();
    assert_eq!(replayed, labels);
}

#[tokio::test]
async fn test_interrupted_run_reads_as_running() {
    let temp = TempDir::new().unwrap();
    let run_id = Uuid::new_v4();
    let store = EventStore::open_in(temp.path(), run_id).await.unwrap();

    store
        .append(&RunEvent::new(
            run_id,
            None,
            RunEventType::RunStarted,
            "Run started".to_string(),
        ))
        .await
        .unwrap();
    store
        .append(
            &task_event(run_id, "2024-01", RunEventType::TaskCompleted).with_outcome(TaskOutcome {
                inserted: 5,
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    store
        .append(&task_event(run_id, "2024-02", RunEventType::TaskStarted))
        .await
        .unwrap();

    let run = store.load_run().await.unwrap().unwrap();
    assert!(run.is_running());
    assert_eq!(run.totals.inserted, 5);
    assert_eq!(
        run.tasks,
        vec![
            ("2024-01".to_string(), TaskStatus::Completed),
            ("2024-02".to_string(), TaskStatus::Running),
        ]
    );
    assert_eq!(run.finished_tasks().collect::<Vec<_>>(), vec!["2024-01"]);
}

#[tokio::test]
async fn test_budget_exhausted_state() {
    let run_id = Uuid::new_v4();
    let events = vec![
        RunEvent::new(run_id, None, RunEventType::RunStarted, "start".to_string()),
        RunEvent::new(
            run_id,
            None,
            RunEventType::BudgetExhausted,
            "stopped".to_string(),
        )
        .with_error("Maximum tasks exceeded: 2 >= 2".to_string()),
    ];

    let run = Run::from_events(&events).unwrap();
    assert_eq!(
        run.state,
        RunState::BudgetExhausted {
            limit: "Maximum tasks exceeded: 2 >= 2".to_string()
        }
    );
    assert!(run.completed_at.is_some());
}

#[tokio::test]
async fn test_list_runs_ignores_stray_entries() {
    let temp = TempDir::new().unwrap();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    EventStore::open_in(temp.path(), first).await.unwrap();
    EventStore::open_in(temp.path(), second).await.unwrap();
    tokio::fs::create_dir(temp.path().join("not-a-run")).await.unwrap();
    tokio::fs::write(temp.path().join("notes.txt"), "x").await.unwrap();

    let mut runs = EventStore::list_runs_in(temp.path()).await.unwrap();
    runs.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(runs, expected);
}

#[tokio::test]
async fn test_missing_ledger_is_empty() {
    let temp = TempDir::new().unwrap();
    let store = EventStore::open_in(temp.path(), Uuid::new_v4()).await.unwrap();

    assert!(store.replay().await.unwrap().is_empty());
    assert!(store.load_run().await.unwrap().is_none());
    assert!(EventStore::list_runs_in(&temp.path().join("absent"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_open_existing_never_creates_run_dir() {
    let temp = TempDir::new().unwrap();
    let unknown = Uuid::new_v4();

    assert!(EventStore::open_existing_in(temp.path(), unknown).is_none());
    assert!(!temp.path().join(unknown.to_string()).exists());
    assert!(EventStore::list_runs_in(temp.path()).await.unwrap().is_empty());

    let run_id = Uuid::new_v4();
    let store = EventStore::open_in(temp.path(), run_id).await.unwrap();
    // Directory alone is not a ledger
    assert!(EventStore::open_existing_in(temp.path(), run_id).is_none());

    store
        .append(&RunEvent::new(
            run_id,
            None,
            RunEventType::RunStarted,
            "Run started".to_string(),
        ))
        .await
        .unwrap();
    let existing = EventStore::open_existing_in(temp.path(), run_id).unwrap();
    assert_eq!(existing.events_path(), store.events_path());
    assert!(existing.load_run().await.unwrap().unwrap().is_running());
}
