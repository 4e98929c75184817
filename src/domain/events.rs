//! Events recorded in the run ledger.
//!
//! Every multi-task run appends immutable events to its own log; the state
//! shown by `status` is rebuilt by replaying them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scan::TaskOutcome;

/// A single event in a run's append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Task label (if applicable)
    pub task: Option<String>,

    /// Type of event
    pub event_type: RunEventType,

    /// Human-readable summary
    pub summary: String,

    /// Counts reported by a finished task
    #[serde(default)]
    pub outcome: Option<TaskOutcome>,

    /// Time taken in milliseconds (for finished tasks)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl RunEvent {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        task: Option<String>,
        event_type: RunEventType,
        summary: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            task,
            event_type,
            summary,
            outcome: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_outcome(mut self, outcome: TaskOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Types of events that can occur during a multi-task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventType {
    RunStarted,
    RunCompleted,

    /// Operator cancelled between tasks
    RunCancelled,

    /// Wall-clock or task-count budget ran out
    BudgetExhausted,

    TaskStarted,
    TaskCompleted,

    /// Task reported an error; the run moves on
    TaskFailed,
}

/// Status of a single task inside a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}
