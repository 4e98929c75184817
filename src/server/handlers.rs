use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::AppState;
use crate::adapters::RecentQuery;
use crate::core::scanner::DEFAULT_RECENT_DAYS;
use crate::core::DashboardStats;
use crate::domain::{DataSource, ScanDetail, ScanReport, ScanSummary};

// --- Query types ---

#[derive(Debug, Default, Deserialize)]
pub struct IncidentsQuery {
    pub limit: Option<usize>,
    pub year: Option<i32>,
    pub device: Option<String>,
}

// Scan params arrive as strings so a bad value still gets a status body

#[derive(Debug, Default, Deserialize)]
pub struct ArchiveQuery {
    pub year: Option<String>,
    pub debug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    pub year: Option<String>,
    pub month: Option<String>,
    pub debug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentScanQuery {
    pub days: Option<String>,
    pub debug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TelegramQuery {
    pub channel: Option<String>,
    pub keyword: Option<String>,
    pub debug: Option<String>,
}

/// `debug=1`, `debug=true` and a bare `debug` all switch it on
fn debug_flag(value: Option<&str>) -> bool {
    match value {
        Some(v) => !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"),
        None => false,
    }
}

fn current_year() -> i32 {
    Local::now().year()
}

/// Parse an optional numeric param; an empty value counts as absent
fn numeric_param<T: FromStr>(name: &str, value: Option<&str>) -> Result<Option<T>, String> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| format!("invalid {} '{}'", name, raw)),
    }
}

/// Report for a request whose params never reached the scanner
fn rejected(label: &str, data_source: DataSource, error: String) -> ScanReport {
    warn!(%label, %error, "Rejected scan request");
    let mut report = ScanReport::new(label, data_source);
    report.push(ScanDetail::failed(label, error));
    report
}

// --- Responses ---

/// A scan summary with the request's scope fields alongside
#[derive(Debug, Serialize)]
pub struct ScanResponse<S: Serialize> {
    #[serde(flatten)]
    pub scope: S,
    #[serde(flatten)]
    pub summary: ScanSummary,
}

fn scan_response<S: Serialize>(
    scope: S,
    report: &ScanReport,
    started: Instant,
    debug: bool,
) -> Json<ScanResponse<S>> {
    let summary = ScanSummary::from_report(report, started.elapsed().as_millis() as u64, debug);
    info!(
        label = %summary.label,
        status = ?summary.status,
        inserted = summary.total_inserted,
        duplicates = summary.total_duplicates,
        duration_ms = summary.duration_ms,
        "Scan request finished"
    );
    Json(ScanResponse { scope, summary })
}

// --- Handlers ---

pub async fn health() -> &'static str {
    "ok"
}

pub async fn incidents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IncidentsQuery>,
) -> impl IntoResponse {
    let query = RecentQuery {
        limit: params.limit.unwrap_or(RecentQuery::default().limit),
        year: params.year,
        device: params.device.filter(|d| !d.is_empty()),
    };

    match state.store.recent(&query).await {
        Ok(rows) => {
            let stats = DashboardStats::compute(&rows, current_year());
            Json(serde_json::json!({
                "incidents": rows,
                "stats": stats,
            }))
            .into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to load incidents");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn scan_archive(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ArchiveQuery>,
) -> impl IntoResponse {
    let started = Instant::now();
    let debug = debug_flag(params.debug.as_deref());

    #[derive(Serialize)]
    struct Scope {
        year: Option<i32>,
    }

    let year = match numeric_param("year", params.year.as_deref()) {
        Ok(year) => year.unwrap_or_else(current_year),
        Err(e) => {
            let report = rejected("archive", DataSource::ArchiveScan, e);
            return scan_response(Scope { year: None }, &report, started, debug);
        }
    };

    let report = state.scanner.clone().with_debug(debug).scan_year(year).await;
    scan_response(Scope { year: Some(year) }, &report, started, debug)
}

pub async fn scan_month(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MonthQuery>,
) -> impl IntoResponse {
    let started = Instant::now();
    let debug = debug_flag(params.debug.as_deref());

    #[derive(Serialize)]
    struct Scope {
        year: Option<i32>,
        month: Option<u32>,
    }

    let parsed = numeric_param("year", params.year.as_deref()).and_then(|year| {
        numeric_param("month", params.month.as_deref()).map(|month| (year, month))
    });
    let (year, month) = match parsed {
        Ok((year, month)) => (year.unwrap_or_else(current_year), month.unwrap_or(0)),
        Err(e) => {
            let report = rejected("month", DataSource::ArchiveScan, e);
            let scope = Scope {
                year: None,
                month: None,
            };
            return scan_response(scope, &report, started, debug);
        }
    };

    let report = state
        .scanner
        .clone()
        .with_debug(debug)
        .scan_month(year, month)
        .await;

    let scope = Scope {
        year: Some(year),
        month: Some(month),
    };
    scan_response(scope, &report, started, debug)
}

pub async fn scan_recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentScanQuery>,
) -> impl IntoResponse {
    let started = Instant::now();
    let debug = debug_flag(params.debug.as_deref());

    #[derive(Serialize)]
    struct Scope {
        days: Option<u32>,
    }

    let days = match numeric_param("days", params.days.as_deref()) {
        Ok(days) => days.unwrap_or(DEFAULT_RECENT_DAYS),
        Err(e) => {
            let report = rejected("recent", DataSource::CronScan, e);
            return scan_response(Scope { days: None }, &report, started, debug);
        }
    };

    let report = state.scanner.clone().with_debug(debug).scan_recent(days).await;
    scan_response(Scope { days: Some(days) }, &report, started, debug)
}

pub async fn scan_telegram(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TelegramQuery>,
) -> impl IntoResponse {
    let started = Instant::now();
    let debug = debug_flag(params.debug.as_deref());

    let channel = params
        .channel
        .filter(|c| !c.is_empty())
        .or_else(|| state.telegram.channels.first().cloned());
    let keyword = params
        .keyword
        .filter(|k| !k.is_empty())
        .or_else(|| state.telegram.keywords.first().cloned())
        .unwrap_or_default();

    let report = match channel {
        Some(ref channel) => {
            state
                .scanner
                .clone()
                .with_debug(debug)
                .scan_channel(channel, &keyword)
                .await
        }
        None => {
            let mut report = ScanReport::new("telegram", DataSource::TelegramScan);
            report.push(ScanDetail::failed("telegram", "no channel given or configured"));
            report
        }
    };

    #[derive(Serialize)]
    struct Scope {
        channel: Option<String>,
        keyword: String,
    }
    scan_response(Scope { channel, keyword }, &report, started, debug)
}
