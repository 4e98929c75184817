//! lithium-watch - Lithium-battery fire incident ingestion for Israel
//!
//! Turns noisy, model-extracted incident reports from several sources
//! (archive news scans, periodic scans, public Telegram channels) into a
//! deduplicated incident table, and serves dashboard aggregates over it.
//!
//! # Architecture
//!
//! Every scan is a strictly sequential loop:
//! - Build a prompt and call the extraction oracle (with retry and pacing)
//! - Pull the JSON array out of the free-text response
//! - Drop candidates missing a date, city or device type
//! - Check each candidate against the store (exact, then ±N-day window)
//! - Insert what's new; every insert is durable on its own
//!
//! Long backfills run through the multi-task runner, which records each
//! run in an append-only JSONL ledger.
//!
//! # Modules
//!
//! - `adapters`: External systems (Gemini, Supabase, Telegram previews)
//! - `core`: Extraction, dedup, scanning, runner, ledger, stats
//! - `domain`: Data structures (incidents, scan reports, run events)
//! - `server`: HTTP API
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Scan an archive year
//! lithium-watch scan-year 2024
//!
//! # Backfill 2022 onwards, one task per month
//! lithium-watch run-all --from-year 2022
//!
//! # Serve the dashboard and scan endpoints
//! lithium-watch serve
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;

// Re-export main types at crate root for convenience
pub use core::{DashboardStats, DuplicateChecker, MultiTaskRunner, Scanner};
pub use domain::{IncidentCandidate, PersistedIncident, Run, RunState, ScanReport};
