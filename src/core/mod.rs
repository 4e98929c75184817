//! Core ingestion logic.
//!
//! This module contains:
//! - Extraction: prompts and tolerant parsing of oracle output
//! - Dedup: exact and fuzzy-window duplicate checks
//! - Scanner: archive, month, recent and channel scans
//! - Runner: sequential multi-task runner with cancellation
//! - EventStore: append-only run ledger
//! - Retry / Pacing / Budget: limits around external calls
//! - Stats: dashboard aggregates

pub mod budget;
pub mod dedup;
pub mod event_store;
pub mod extraction;
pub mod pacing;
pub mod retry;
pub mod runner;
pub mod scanner;
pub mod stats;

// Re-export commonly used types
pub use budget::{BudgetTracker, BudgetViolation, ScanBudget};
pub use dedup::DuplicateChecker;
pub use event_store::EventStore;
pub use extraction::ExtractionOutcome;
pub use pacing::{Pacer, PacingPolicy};
pub use retry::RetryPolicy;
pub use runner::{
    CancellationFlag, HttpExecutor, LocalExecutor, MultiTaskRunner, RunOutcome, RunProgress,
    RunReport, ScanTask, TaskExecutor,
};
pub use scanner::Scanner;
pub use stats::{CityCount, DashboardStats};
