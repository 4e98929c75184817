//! Domain types for the ingestion pipeline.
//!
//! This module contains the core data structures:
//! - Incident: candidates, persisted incidents, stored rows, duplicate keys
//! - Scan: per-unit and aggregate scan reports
//! - Events / Run: the runner's ledger and its replayed state

pub mod events;
pub mod incident;
pub mod run;
pub mod scan;

// Re-export commonly used types
pub use events::{RunEvent, RunEventType, TaskStatus};
pub use incident::{
    DataSource, District, DuplicateKey, IncidentCandidate, IncidentRow, PersistedIncident,
    DEFAULT_DISTRICT, DEFAULT_SEVERITY,
};
pub use run::{Run, RunState};
pub use scan::{
    RawResponse, ScanDetail, ScanReport, ScanStatus, ScanSummary, TaskOutcome, TaskTotals,
};
