//! Command-line interface for lithium-watch.
//!
//! Provides commands for serving the HTTP API, running individual scans,
//! running multi-task backfills, and inspecting the run ledger.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::{
    GeminiClient, IncidentStore, RecentQuery, SupabaseStore, TelegramChannelSource,
};
use crate::config::{self, ResolvedConfig};
use crate::core::scanner::DEFAULT_RECENT_DAYS;
use crate::core::{
    CancellationFlag, DashboardStats, EventStore, HttpExecutor, LocalExecutor, MultiTaskRunner,
    RunOutcome, ScanTask, Scanner, TaskExecutor,
};
use crate::domain::{Run, RunState, ScanReport};
use crate::server::{self, AppState};

/// lithium-watch - Lithium-battery fire incident ingestion
#[derive(Parser, Debug)]
#[command(name = "lithium-watch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (stats + scan endpoints)
    Serve {
        /// Address to bind to (defaults to server.address / LITHIUM_WATCH_ADDR)
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Scan one archive year (two half-year prompts)
    ScanYear {
        year: i32,

        /// Print the raw oracle response of each half
        #[arg(long)]
        debug: bool,
    },

    /// Scan one archive month
    ScanMonth { year: i32, month: u32 },

    /// Periodic scan over the last N days
    ScanRecent {
        #[arg(short, long, default_value_t = DEFAULT_RECENT_DAYS)]
        days: u32,
    },

    /// Search a public Telegram channel for a keyword
    ScanChannel { channel: String, keyword: String },

    /// Run every month of a year range, then every channel/keyword pair
    RunAll {
        /// First year (inclusive)
        #[arg(long)]
        from_year: i32,

        /// Last year (inclusive, defaults to the current year)
        #[arg(long)]
        to_year: Option<i32>,

        /// Skip the channel tasks
        #[arg(long)]
        no_channels: bool,

        /// Call the scan endpoints of a running server instead of scanning in-process
        #[arg(long, value_name = "BASE_URL")]
        remote: Option<String>,
    },

    /// Print dashboard aggregates
    Stats {
        #[arg(short, long, default_value = "200")]
        limit: usize,

        #[arg(short, long)]
        year: Option<i32>,

        #[arg(short, long)]
        device: Option<String>,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Check the status of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve { address } => serve(address).await,
            Commands::ScanYear { year, debug } => scan_year(year, debug).await,
            Commands::ScanMonth { year, month } => {
                let scanner = build_scanner(config::config()?)?;
                print_report(&scanner.scan_month(year, month).await, false);
                Ok(())
            }
            Commands::ScanRecent { days } => {
                let scanner = build_scanner(config::config()?)?;
                print_report(&scanner.scan_recent(days).await, false);
                Ok(())
            }
            Commands::ScanChannel { channel, keyword } => {
                let scanner = build_scanner(config::config()?)?;
                print_report(&scanner.scan_channel(&channel, &keyword).await, false);
                Ok(())
            }
            Commands::RunAll {
                from_year,
                to_year,
                no_channels,
                remote,
            } => run_all(from_year, to_year, no_channels, remote).await,
            Commands::Stats {
                limit,
                year,
                device,
            } => show_stats(limit, year, device).await,
            Commands::Runs { limit } => list_runs(limit).await,
            Commands::Status { run_id } => show_status(&run_id).await,
            Commands::Config => show_config(),
        }
    }
}

fn build_store(cfg: &ResolvedConfig) -> Result<Arc<dyn IncidentStore>> {
    let store = SupabaseStore::from_settings(&cfg.supabase, cfg.request_timeout())?;
    Ok(Arc::new(store))
}

fn build_scanner(cfg: &ResolvedConfig) -> Result<Scanner> {
    let oracle = GeminiClient::from_settings(&cfg.gemini, cfg.request_timeout())?;
    let store = build_store(cfg)?;
    let channels = TelegramChannelSource::from_settings(&cfg.telegram, cfg.request_timeout());

    Ok(Scanner::from_config(cfg, Arc::new(oracle), store).with_message_source(Arc::new(channels)))
}

async fn serve(address: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    let address = address.unwrap_or_else(|| cfg.server_address.clone());

    let state = AppState::new(build_store(cfg)?, build_scanner(cfg)?, cfg.telegram.clone());
    server::serve(&address, Arc::new(state)).await
}

async fn scan_year(year: i32, debug: bool) -> Result<()> {
    let scanner = build_scanner(config::config()?)?.with_debug(debug);
    let report = scanner.scan_year(year).await;
    print_report(&report, debug);
    Ok(())
}

fn print_report(report: &ScanReport, debug: bool) {
    println!("Scan: {} ({})", report.label, report.data_source);
    println!("Status: {:?}", report.status());
    println!(
        "Inserted: {}  Duplicates: {}  Found: {}  Examined: {}",
        report.total_inserted(),
        report.total_duplicates(),
        report.total_found(),
        report.total_examined()
    );

    println!("\n{:<24} {:>8} {:>6} {:>9} {:>11}  ERROR", "UNIT", "EXAMINED", "FOUND", "INSERTED", "DUPLICATES");
    println!("{}", "-".repeat(75));
    for detail in &report.details {
        println!(
            "{:<24} {:>8} {:>6} {:>9} {:>11}  {}",
            detail.label,
            detail.examined,
            detail.found,
            detail.inserted,
            detail.duplicates,
            detail.error.as_deref().unwrap_or("")
        );
    }

    if debug {
        for detail in &report.details {
            if let Some(ref raw) = detail.raw_response {
                println!("\n--- {} raw response ---\n{}", detail.label, raw);
            }
        }
    }
}

async fn run_all(
    from_year: i32,
    to_year: Option<i32>,
    no_channels: bool,
    remote: Option<String>,
) -> Result<()> {
    let cfg = config::config()?;
    let today = Local::now().date_naive();
    let to_year = to_year.unwrap_or(today.year());

    let (channels, keywords) = if no_channels {
        (Vec::new(), Vec::new())
    } else {
        (cfg.telegram.channels.clone(), cfg.telegram.keywords.clone())
    };
    let tasks = ScanTask::plan(from_year..=to_year, &channels, &keywords, today);

    let executor: Box<dyn TaskExecutor> = match remote {
        Some(base_url) => Box::new(HttpExecutor::new(base_url, cfg.budget.scan_timeout())?),
        None => Box::new(LocalExecutor::new(build_scanner(cfg)?)),
    };

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current task");
            on_interrupt.cancel();
        }
    });

    let runner = MultiTaskRunner::new(executor)
        .with_pacing(cfg.task_pacing)
        .with_budget(cfg.budget.clone())
        .with_cancellation(cancel)
        .with_ledger(cfg.runs_dir());

    info!(tasks = tasks.len(), "Starting multi-task run");
    let report = runner
        .run(&tasks, |p| {
            println!(
                "[{}/{}] {:<24} +{} inserted, {} duplicates{}  (total {} inserted)",
                p.position,
                p.total,
                p.task.label(),
                p.outcome.inserted,
                p.outcome.duplicates,
                p.outcome
                    .error
                    .as_ref()
                    .map(|e| format!(", error: {}", e))
                    .unwrap_or_default(),
                p.totals.inserted
            );
        })
        .await?;

    println!();
    println!("Run ID: {}", report.run_id);
    match report.outcome {
        RunOutcome::Completed => println!("Outcome: completed"),
        RunOutcome::Cancelled => println!("Outcome: cancelled"),
        RunOutcome::BudgetExhausted { ref limit } => println!("Outcome: budget exhausted ({})", limit),
    }
    println!(
        "Tasks: {} run, {} failed",
        report.totals.tasks_run, report.totals.tasks_failed
    );
    println!(
        "Inserted: {}  Duplicates: {}  Found: {}  Examined: {}",
        report.totals.inserted, report.totals.duplicates, report.totals.found, report.totals.examined
    );

    Ok(())
}

async fn show_stats(limit: usize, year: Option<i32>, device: Option<String>) -> Result<()> {
    let store = build_store(config::config()?)?;
    let rows = store
        .recent(&RecentQuery {
            limit,
            year,
            device,
        })
        .await
        .context("Failed to load incidents")?;

    let stats = DashboardStats::compute(&rows, Local::now().year());
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).context("Failed to serialize stats")?
    );
    Ok(())
}

async fn load_run(run_id: Uuid) -> Result<Run> {
    let store = EventStore::open_existing(run_id)?
        .with_context(|| format!("No ledger found for run {}", run_id))?;
    store
        .load_run()
        .await?
        .with_context(|| format!("No events found for run {}", run_id))
}

fn state_label(state: &RunState) -> String {
    match state {
        RunState::Running => "running".to_string(),
        RunState::Completed => "completed".to_string(),
        RunState::Cancelled => "cancelled".to_string(),
        RunState::BudgetExhausted { .. } => "budget-exhausted".to_string(),
    }
}

async fn show_status(run_id_str: &str) -> Result<()> {
    let run_id = Uuid::parse_str(run_id_str)
        .with_context(|| format!("Invalid run ID: {}", run_id_str))?;

    let run = load_run(run_id).await?;

    println!("Run ID: {}", run.id);
    println!("State: {}", state_label(&run.state));
    if let RunState::BudgetExhausted { ref limit } = run.state {
        println!("Limit: {}", limit);
    }
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }
    println!(
        "Totals: {} tasks ({} failed), {} inserted, {} duplicates",
        run.totals.tasks_run, run.totals.tasks_failed, run.totals.inserted, run.totals.duplicates
    );
    println!("\nTask statuses:");
    for (task, status) in &run.tasks {
        println!("  {}: {:?}", task, status);
    }

    Ok(())
}

async fn list_runs(limit: usize) -> Result<()> {
    let mut runs = Vec::new();
    for run_id in EventStore::list_runs().await? {
        match load_run(run_id).await {
            Ok(run) => runs.push(run),
            Err(e) => warn!(%run_id, error = %e, "Skipping unreadable run"),
        }
    }

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    runs.truncate(limit);

    println!("{:<38} {:<20} {:<18} {:>8}", "RUN ID", "STARTED", "STATE", "INSERTED");
    println!("{}", "-".repeat(87));

    for run in runs {
        println!(
            "{:<38} {:<20} {:<18} {:>8}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            state_label(&run.state),
            run.totals.inserted
        );
    }

    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("lithium-watch configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home: {}", cfg.home.display());
    println!("  Runs: {}", cfg.runs_dir().display());
    println!();
    println!("Gemini:");
    println!("  Model:    {}", cfg.gemini.model);
    println!("  API key:  {}", if cfg.gemini.api_key.is_some() { "set" } else { "(missing)" });
    println!();
    println!("Supabase:");
    println!("  URL:      {}", cfg.supabase.url.as_deref().unwrap_or("(missing)"));
    println!("  Key:      {}", if cfg.supabase.key.is_some() { "set" } else { "(missing)" });
    println!("  Table:    {}", cfg.supabase.table);
    println!();
    println!("Scanning:");
    println!("  Dedup window:   ±{} days", cfg.window_days);
    println!("  Half delay:     {}ms", cfg.scan_pacing.min_interval().as_millis());
    println!("  Task delay:     {}ms", cfg.task_pacing.min_interval().as_millis());
    println!("  Retry attempts: {}", cfg.retry.max_attempts);
    println!();
    println!("Budget:");
    println!("  Max tasks:          {}", cfg.budget.max_tasks);
    println!("  Request timeout:    {}s", cfg.budget.request_timeout_seconds);
    println!("  Scan timeout:       {}s", cfg.budget.scan_timeout_seconds);
    println!("  Run timeout:        {}s", cfg.budget.run_timeout_seconds);
    println!("  Max response size:  {} bytes", cfg.budget.max_response_bytes);
    println!();
    println!("Server: {}", cfg.server_address);
    println!("Telegram channels: {}", if cfg.telegram.channels.is_empty() {
        "(none)".to_string()
    } else {
        cfg.telegram.channels.join(", ")
    });

    Ok(())
}
