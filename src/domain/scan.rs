//! Results of scan invocations.
//!
//! Partial success is the normal case: every report carries counts and
//! per-unit errors side by side.

use serde::{Deserialize, Serialize};

use super::incident::DataSource;

/// Outcome of one extraction unit (a half-year, a month, a channel query)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanDetail {
    /// Human-readable unit label, e.g. "2024 H1"
    pub label: String,

    /// Raw array entries returned by the oracle
    pub examined: usize,

    /// Entries that passed validation
    pub found: usize,

    /// Rows written to the store
    pub inserted: usize,

    /// Valid candidates skipped as duplicates
    pub duplicates: usize,

    /// Inserts rejected by the store
    #[serde(default, skip_serializing_if = "is_zero")]
    pub insert_errors: usize,

    /// Set when the unit was skipped (oracle failure, malformed output)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Raw oracle text, only kept in debug mode
    #[serde(skip)]
    pub raw_response: Option<String>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl ScanDetail {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// A unit that produced nothing because of `error`
    pub fn failed(label: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Overall status of a scan, derived from its details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// No unit reported an error
    Success,

    /// Some units failed, others ran
    Partial,

    /// Every unit failed
    Failed,
}

/// Aggregate report of a scan invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub label: String,
    pub data_source: DataSource,
    pub details: Vec<ScanDetail>,
}

impl ScanReport {
    pub fn new(label: impl Into<String>, data_source: DataSource) -> Self {
        Self {
            label: label.into(),
            data_source,
            details: Vec::new(),
        }
    }

    pub fn push(&mut self, detail: ScanDetail) {
        self.details.push(detail);
    }

    pub fn total_examined(&self) -> usize {
        self.details.iter().map(|d| d.examined).sum()
    }

    pub fn total_found(&self) -> usize {
        self.details.iter().map(|d| d.found).sum()
    }

    pub fn total_inserted(&self) -> usize {
        self.details.iter().map(|d| d.inserted).sum()
    }

    pub fn total_duplicates(&self) -> usize {
        self.details.iter().map(|d| d.duplicates).sum()
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.details.iter().filter_map(|d| d.error.as_deref())
    }

    pub fn status(&self) -> ScanStatus {
        let failed = self.details.iter().filter(|d| d.is_failed()).count();
        if failed == 0 {
            ScanStatus::Success
        } else if failed == self.details.len() {
            ScanStatus::Failed
        } else {
            ScanStatus::Partial
        }
    }
}

/// Raw oracle text for one unit (debug mode)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    pub label: String,
    pub response: String,
}

/// Wire shape of a finished scan, as returned by the scan endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub status: ScanStatus,
    pub label: String,
    pub data_source: DataSource,
    pub total_examined: usize,
    pub total_found: usize,
    pub total_inserted: usize,
    pub total_duplicates: usize,
    #[serde(default)]
    pub details: Vec<ScanDetail>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_responses: Option<Vec<RawResponse>>,
}

impl ScanSummary {
    /// Summarize `report`; raw responses are included only when `debug` is set
    pub fn from_report(report: &ScanReport, duration_ms: u64, debug: bool) -> Self {
        let raw_responses = debug.then(|| {
            report
                .details
                .iter()
                .filter_map(|d| {
                    d.raw_response.as_ref().map(|r| RawResponse {
                        label: d.label.clone(),
                        response: r.clone(),
                    })
                })
                .collect()
        });

        Self {
            status: report.status(),
            label: report.label.clone(),
            data_source: report.data_source,
            total_examined: report.total_examined(),
            total_found: report.total_found(),
            total_inserted: report.total_inserted(),
            total_duplicates: report.total_duplicates(),
            details: report.details.clone(),
            duration_ms,
            raw_responses,
        }
    }

    /// Counts for the runner, with unit errors joined
    pub fn outcome(&self) -> TaskOutcome {
        let errors: Vec<&str> = self
            .details
            .iter()
            .filter_map(|d| d.error.as_deref())
            .collect();

        TaskOutcome {
            examined: self.total_examined,
            found: self.total_found,
            inserted: self.total_inserted,
            duplicates: self.total_duplicates,
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
        }
    }
}

/// Counts produced by one runner task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub examined: usize,
    pub found: usize,
    pub inserted: usize,
    pub duplicates: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ScanReport> for TaskOutcome {
    fn from(report: &ScanReport) -> Self {
        let errors: Vec<&str> = report.errors().collect();
        Self {
            examined: report.total_examined(),
            found: report.total_found(),
            inserted: report.total_inserted(),
            duplicates: report.total_duplicates(),
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
        }
    }
}

/// Running totals across runner tasks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTotals {
    pub tasks_run: usize,
    pub tasks_failed: usize,
    pub examined: usize,
    pub found: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

impl TaskTotals {
    pub fn add(&mut self, outcome: &TaskOutcome) {
        self.tasks_run += 1;
        if outcome.error.is_some() {
            self.tasks_failed += 1;
        }
        self.examined += outcome.examined;
        self.found += outcome.found;
        self.inserted += outcome.inserted;
        self.duplicates += outcome.duplicates;
    }
}
