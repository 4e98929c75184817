//! Resource limits for scans and runner invocations.
//!
//! Prevents runaway execution through configurable limits on:
//! - Wall-clock time per scan and per multi-task run
//! - Number of tasks per run
//! - Oracle response size
//! - Per-request HTTP timeout

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Limits applied to scans and runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanBudget {
    /// Maximum number of tasks per runner invocation (default: 200)
    #[serde(default = "default_max_tasks")]
    pub max_tasks: u32,

    /// Maximum oracle response size in bytes (default: 1MB)
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,

    /// Per-request HTTP timeout in seconds (default: 60)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Wall-clock budget of one scan invocation in seconds (default: 300)
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_seconds: u64,

    /// Wall-clock budget of one runner invocation in seconds (default: 7200)
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,
}

fn default_max_tasks() -> u32 {
    200
}
fn default_max_response_bytes() -> u64 {
    1024 * 1024
} // 1MB
fn default_request_timeout() -> u64 {
    60
}
fn default_scan_timeout() -> u64 {
    300
} // 5 min
fn default_run_timeout() -> u64 {
    7200
} // 2 hours

impl Default for ScanBudget {
    fn default() -> Self {
        Self {
            max_tasks: default_max_tasks(),
            max_response_bytes: default_max_response_bytes(),
            request_timeout_seconds: default_request_timeout(),
            scan_timeout_seconds: default_scan_timeout(),
            run_timeout_seconds: default_run_timeout(),
        }
    }
}

impl ScanBudget {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_seconds)
    }

    /// Reject oversized oracle output
    pub fn validate_response(&self, response: &str) -> Result<(), BudgetViolation> {
        let size = response.len() as u64;
        if size > self.max_response_bytes {
            return Err(BudgetViolation::MaxResponseBytes {
                actual: size,
                limit: self.max_response_bytes,
            });
        }
        Ok(())
    }

    /// Check a single scan's elapsed time
    pub fn check_scan(&self, tracker: &BudgetTracker) -> Result<(), BudgetViolation> {
        let elapsed = tracker.elapsed_seconds();
        if elapsed >= self.scan_timeout_seconds {
            return Err(BudgetViolation::ScanTimeout {
                elapsed_seconds: elapsed,
                limit_seconds: self.scan_timeout_seconds,
            });
        }
        Ok(())
    }

    /// Check a runner invocation before starting another task
    pub fn check_run(&self, tracker: &BudgetTracker) -> Result<(), BudgetViolation> {
        if tracker.tasks_run >= self.max_tasks {
            return Err(BudgetViolation::MaxTasks {
                actual: tracker.tasks_run,
                limit: self.max_tasks,
            });
        }

        let elapsed = tracker.elapsed_seconds();
        if elapsed >= self.run_timeout_seconds {
            return Err(BudgetViolation::RunTimeout {
                elapsed_seconds: elapsed,
                limit_seconds: self.run_timeout_seconds,
            });
        }

        Ok(())
    }
}

/// Tracks resource usage during a scan or run
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    /// Number of tasks executed
    pub tasks_run: u32,

    /// When the scan or run started
    pub started_at: Instant,
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BudgetTracker {
    pub fn new() -> Self {
        Self {
            tasks_run: 0,
            started_at: Instant::now(),
        }
    }

    pub fn record_task(&mut self) {
        self.tasks_run += 1;
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

/// Budget violation errors
#[derive(Debug, Clone, Error)]
pub enum BudgetViolation {
    #[error("Maximum tasks exceeded: {actual} >= {limit}")]
    MaxTasks { actual: u32, limit: u32 },

    #[error("Oracle response too large: {actual} > {limit} bytes")]
    MaxResponseBytes { actual: u64, limit: u64 },

    #[error("Scan timeout: {elapsed_seconds}s >= {limit_seconds}s")]
    ScanTimeout {
        elapsed_seconds: u64,
        limit_seconds: u64,
    },

    #[error("Run timeout: {elapsed_seconds}s >= {limit_seconds}s")]
    RunTimeout {
        elapsed_seconds: u64,
        limit_seconds: u64,
    },
}
