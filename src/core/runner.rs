//! Multi-task runner for long backfills.
//!
//! Sequences scan tasks (one per archive month, one per channel/keyword
//! pair) with a fixed gap between them, keeps running totals, reports
//! progress after every task and stops cooperatively when cancelled.
//! Nothing already inserted is undone on cancellation.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::core::budget::{BudgetTracker, ScanBudget};
use crate::core::event_store::EventStore;
use crate::core::pacing::PacingPolicy;
use crate::core::scanner::Scanner;
use crate::domain::{RunEvent, RunEventType, ScanSummary, TaskOutcome, TaskTotals};

/// One unit of work for the runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ScanTask {
    /// Archive scan of a single calendar month
    ArchiveMonth { year: i32, month: u32 },

    /// Keyword search in a public channel
    Channel { channel: String, keyword: String },
}

impl ScanTask {
    pub fn label(&self) -> String {
        match self {
            Self::ArchiveMonth { year, month } => format!("{}-{:02}", year, month),
            Self::Channel { channel, keyword } => format!("{} / {}", channel, keyword),
        }
    }

    /// Month tasks for `years` (skipping months after `today`), then one
    /// task per (channel, keyword) pair
    pub fn plan(
        years: RangeInclusive<i32>,
        channels: &[String],
        keywords: &[String],
        today: NaiveDate,
    ) -> Vec<ScanTask> {
        let mut tasks = Vec::new();

        for year in years {
            for month in 1..=12u32 {
                if (year, month) > (today.year(), today.month()) {
                    break;
                }
                tasks.push(Self::ArchiveMonth { year, month });
            }
        }

        for channel in channels {
            for keyword in keywords {
                tasks.push(Self::Channel {
                    channel: channel.clone(),
                    keyword: keyword.clone(),
                });
            }
        }

        tasks
    }
}

/// Something that can run a `ScanTask`.
///
/// An `Err` means the task could not be run at all (server unreachable);
/// unit-level failures come back inside the outcome.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, task: &ScanTask) -> Result<TaskOutcome>;
}

/// Runs tasks with an in-process scanner
pub struct LocalExecutor {
    scanner: Scanner,
}

impl LocalExecutor {
    pub fn new(scanner: Scanner) -> Self {
        Self { scanner }
    }
}

#[async_trait]
impl TaskExecutor for LocalExecutor {
    fn name(&self) -> &str {
        "local"
    }

    async fn execute(&self, task: &ScanTask) -> Result<TaskOutcome> {
        let report = match task {
            ScanTask::ArchiveMonth { year, month } => self.scanner.scan_month(*year, *month).await,
            ScanTask::Channel { channel, keyword } => {
                self.scanner.scan_channel(channel, keyword).await
            }
        };
        Ok(TaskOutcome::from(&report))
    }
}

/// Runs tasks by calling the scan endpoints of a running server
pub struct HttpExecutor {
    base_url: String,
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Endpoint and query string for a task
    pub fn request_for(&self, task: &ScanTask) -> (String, Vec<(&'static str, String)>) {
        match task {
            ScanTask::ArchiveMonth { year, month } => (
                format!("{}/api/scan/month", self.base_url),
                vec![("year", year.to_string()), ("month", month.to_string())],
            ),
            ScanTask::Channel { channel, keyword } => (
                format!("{}/api/scan/telegram", self.base_url),
                vec![("channel", channel.clone()), ("keyword", keyword.clone())],
            ),
        }
    }
}

#[async_trait]
impl TaskExecutor for HttpExecutor {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(&self, task: &ScanTask) -> Result<TaskOutcome> {
        let (url, query) = self.request_for(task);

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Failed to call {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Scan endpoint error ({}): {}", status, text);
        }

        let summary: ScanSummary = response
            .json()
            .await
            .context("Failed to parse scan response")?;

        Ok(summary.outcome())
    }
}

/// Shared flag checked before each task
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunOutcome {
    Completed,
    Cancelled,
    BudgetExhausted { limit: String },
}

/// Snapshot passed to the progress callback after each task
#[derive(Debug)]
pub struct RunProgress<'a> {
    /// 1-based position of the finished task
    pub position: usize,
    pub total: usize,
    pub task: &'a ScanTask,
    pub outcome: &'a TaskOutcome,
    pub totals: &'a TaskTotals,
}

/// Final result of a runner invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub totals: TaskTotals,
    /// Label and outcome of every task that ran, in order
    pub tasks: Vec<(String, TaskOutcome)>,
    pub duration_ms: u64,
}

async fn append_to_ledger(ledger: Option<&EventStore>, event: RunEvent) -> Result<()> {
    match ledger {
        Some(store) => store.append(&event).await,
        None => Ok(()),
    }
}

/// Sequential task runner
pub struct MultiTaskRunner {
    executor: Box<dyn TaskExecutor>,
    pacing: PacingPolicy,
    budget: ScanBudget,
    cancel: CancellationFlag,
    ledger_dir: Option<std::path::PathBuf>,
}

impl MultiTaskRunner {
    pub fn new(executor: Box<dyn TaskExecutor>) -> Self {
        Self {
            executor,
            pacing: PacingPolicy::from_millis(crate::config::DEFAULT_TASK_DELAY_MS),
            budget: ScanBudget::default(),
            cancel: CancellationFlag::new(),
            ledger_dir: None,
        }
    }

    pub fn with_pacing(mut self, pacing: PacingPolicy) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_budget(mut self, budget: ScanBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Record every run under `runs_dir/<run-id>/events.jsonl`
    pub fn with_ledger(mut self, runs_dir: impl Into<std::path::PathBuf>) -> Self {
        self.ledger_dir = Some(runs_dir.into());
        self
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Run `tasks` in order, calling `progress` after each one
    #[instrument(skip_all, fields(executor = self.executor.name(), tasks = tasks.len()))]
    pub async fn run<F>(&self, tasks: &[ScanTask], mut progress: F) -> Result<RunReport>
    where
        F: FnMut(&RunProgress<'_>),
    {
        let run_id = Uuid::new_v4();
        let ledger = match self.ledger_dir {
            Some(ref dir) => Some(EventStore::open_in(dir, run_id).await?),
            None => None,
        };
        let record = |event: RunEvent| append_to_ledger(ledger.as_ref(), event);

        info!(%run_id, "Starting run");
        record(RunEvent::new(
            run_id,
            None,
            RunEventType::RunStarted,
            format!("Run of {} tasks started", tasks.len()),
        ))
        .await?;

        let mut tracker = BudgetTracker::new();
        let mut pacer = self.pacing.pacer();
        let mut totals = TaskTotals::default();
        let mut finished = Vec::new();
        let mut outcome = RunOutcome::Completed;

        for (index, task) in tasks.iter().enumerate() {
            if let Err(violation) = self.budget.check_run(&tracker) {
                warn!(%run_id, error = %violation, "Budget exhausted, stopping run");
                record(
                    RunEvent::new(
                        run_id,
                        None,
                        RunEventType::BudgetExhausted,
                        "Run stopped by budget".to_string(),
                    )
                    .with_error(violation.to_string()),
                )
                .await?;
                outcome = RunOutcome::BudgetExhausted {
                    limit: violation.to_string(),
                };
                break;
            }

            pacer.ready().await;

            if self.cancel.is_cancelled() {
                info!(%run_id, completed = index, "Run cancelled");
                record(RunEvent::new(
                    run_id,
                    None,
                    RunEventType::RunCancelled,
                    format!("Cancelled after {} of {} tasks", index, tasks.len()),
                ))
                .await?;
                outcome = RunOutcome::Cancelled;
                break;
            }

            let label = task.label();
            record(RunEvent::new(
                run_id,
                Some(label.clone()),
                RunEventType::TaskStarted,
                format!("Task {} started", label),
            ))
            .await?;

            let started = Instant::now();
            let task_outcome = match self.executor.execute(task).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(task = %label, error = %e, "Task failed");
                    TaskOutcome {
                        error: Some(e.to_string()),
                        ..Default::default()
                    }
                }
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            tracker.record_task();
            totals.add(&task_outcome);

            let event_type = if task_outcome.error.is_some() {
                RunEventType::TaskFailed
            } else {
                RunEventType::TaskCompleted
            };
            let mut event = RunEvent::new(
                run_id,
                Some(label.clone()),
                event_type,
                format!(
                    "Task {}: {} inserted, {} duplicates",
                    label, task_outcome.inserted, task_outcome.duplicates
                ),
            )
            .with_outcome(task_outcome.clone())
            .with_duration(duration_ms);
            if let Some(ref error) = task_outcome.error {
                event = event.with_error(error.clone());
            }
            record(event).await?;

            info!(
                task = %label,
                position = index + 1,
                total = tasks.len(),
                inserted = task_outcome.inserted,
                duplicates = task_outcome.duplicates,
                "Task finished"
            );

            progress(&RunProgress {
                position: index + 1,
                total: tasks.len(),
                task,
                outcome: &task_outcome,
                totals: &totals,
            });

            finished.push((label, task_outcome));
        }

        if outcome == RunOutcome::Completed {
            record(RunEvent::new(
                run_id,
                None,
                RunEventType::RunCompleted,
                format!("Run completed: {} inserted", totals.inserted),
            ))
            .await?;
        }

        info!(
            %run_id,
            outcome = ?outcome,
            tasks_run = totals.tasks_run,
            inserted = totals.inserted,
            duplicates = totals.duplicates,
            "Run finished"
        );

        Ok(RunReport {
            run_id,
            outcome,
            totals,
            tasks: finished,
            duration_ms: tracker.elapsed_ms(),
        })
    }
}
