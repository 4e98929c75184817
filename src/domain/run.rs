//! Run state and reconstruction from ledger events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{RunEvent, RunEventType, TaskStatus};
use super::scan::TaskTotals;

/// A multi-task runner invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,

    /// Current state of the run
    pub state: RunState,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Accumulated counts across finished tasks
    pub totals: TaskTotals,

    /// Task label and status, in execution order
    pub tasks: Vec<(String, TaskStatus)>,
}

impl Run {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            state: RunState::Running,
            started_at: Utc::now(),
            completed_at: None,
            totals: TaskTotals::default(),
            tasks: Vec::new(),
        }
    }

    /// Reconstruct run state from a sequence of events
    pub fn from_events(events: &[RunEvent]) -> Option<Self> {
        let first = events.first()?;

        let mut run = Self::new(first.run_id);
        run.started_at = first.timestamp;

        for event in events {
            run.apply_event(event);
        }

        Some(run)
    }

    /// Apply a single event to update run state
    pub fn apply_event(&mut self, event: &RunEvent) {
        match event.event_type {
            RunEventType::RunStarted => {
                self.state = RunState::Running;
                self.started_at = event.timestamp;
            }
            RunEventType::RunCompleted => {
                self.state = RunState::Completed;
                self.completed_at = Some(event.timestamp);
            }
            RunEventType::RunCancelled => {
                self.state = RunState::Cancelled;
                self.completed_at = Some(event.timestamp);
            }
            RunEventType::BudgetExhausted => {
                self.state = RunState::BudgetExhausted {
                    limit: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
            RunEventType::TaskStarted => {
                if let Some(ref task) = event.task {
                    self.set_task_status(task, TaskStatus::Running);
                }
            }
            RunEventType::TaskCompleted | RunEventType::TaskFailed => {
                if let Some(ref task) = event.task {
                    let status = if event.event_type == RunEventType::TaskFailed {
                        TaskStatus::Failed
                    } else {
                        TaskStatus::Completed
                    };
                    self.set_task_status(task, status);
                }
                if let Some(ref outcome) = event.outcome {
                    self.totals.add(outcome);
                }
            }
        }
    }

    fn set_task_status(&mut self, task: &str, status: TaskStatus) {
        match self.tasks.iter_mut().find(|(label, _)| label == task) {
            Some(entry) => entry.1 = status,
            None => self.tasks.push((task.to_string(), status)),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running)
    }

    /// Labels of tasks that finished (successfully or not)
    pub fn finished_tasks(&self) -> impl Iterator<Item = &str> {
        self.tasks
            .iter()
            .filter(|(_, s)| matches!(s, TaskStatus::Completed | TaskStatus::Failed))
            .map(|(label, _)| label.as_str())
    }
}

/// State of a runner invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    Running,
    Completed,
    Cancelled,
    BudgetExhausted { limit: String },
}

impl Default for RunState {
    fn default() -> Self {
        Self::Running
    }
}
