//! HTTP surface: dashboard stats and scan triggers.
//!
//! Routes:
//! - GET /api/incidents       recent incidents plus aggregates
//! - GET /api/scan/archive    scan one archive year (two halves)
//! - GET /api/scan/month      scan one archive month
//! - GET /api/scan/recent     periodic scan over the last N days
//! - GET /api/scan/telegram   channel keyword scan
//! - GET /health

pub mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tracing::info;

use crate::adapters::IncidentStore;
use crate::config::TelegramSettings;
use crate::core::Scanner;

/// Shared state for all handlers
pub struct AppState {
    pub store: Arc<dyn IncidentStore>,
    pub scanner: Scanner,
    pub telegram: TelegramSettings,
}

impl AppState {
    pub fn new(store: Arc<dyn IncidentStore>, scanner: Scanner, telegram: TelegramSettings) -> Self {
        Self {
            store,
            scanner,
            telegram,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/incidents", get(handlers::incidents))
        .route("/api/scan/archive", get(handlers::scan_archive))
        .route("/api/scan/month", get(handlers::scan_month))
        .route("/api/scan/recent", get(handlers::scan_recent))
        .route("/api/scan/telegram", get(handlers::scan_telegram))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Bind `address` and serve until the process is stopped
pub async fn serve(address: &str, state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!(%address, "Listening");
    axum::serve(listener, build_router(state))
        .await
        .context("Server error")?;

    Ok(())
}
