//! Scan orchestration: prompt → oracle → parse → dedup → insert.
//!
//! A scan is split into units (two half-years for an archive year, one
//! month, one recent window, one channel query). Units run strictly in
//! order; a failing unit is annotated in the report and the next one still
//! runs. Every successful insert is durable on its own.

use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use tracing::{debug, info, instrument, warn};

use crate::adapters::{ExtractionOracle, IncidentStore, MessageSource};
use crate::config::ResolvedConfig;
use crate::core::budget::{BudgetTracker, ScanBudget};
use crate::core::dedup::DuplicateChecker;
use crate::core::extraction::{self, ExtractionOutcome};
use crate::core::pacing::{Pacer, PacingPolicy};
use crate::core::retry::RetryPolicy;
use crate::domain::{DataSource, PersistedIncident, ScanDetail, ScanReport};

/// Raw oracle text kept per unit in debug mode is cut to this many chars
pub const DEBUG_RAW_LIMIT: usize = 3000;

/// Default look-back of the periodic scan
pub const DEFAULT_RECENT_DAYS: u32 = 7;

/// Months covered by each half of an archive year
const HALVES: [(&str, u32, u32); 2] = [("H1", 1, 6), ("H2", 7, 12)];

/// Drives extraction units against an oracle and a store
#[derive(Clone)]
pub struct Scanner {
    oracle: Arc<dyn ExtractionOracle>,
    store: Arc<dyn IncidentStore>,
    checker: DuplicateChecker,
    messages: Option<Arc<dyn MessageSource>>,
    retry: RetryPolicy,
    pacing: PacingPolicy,
    budget: ScanBudget,
    debug: bool,
}

impl Scanner {
    /// Scanner with default window, retry, pacing and budget
    pub fn new(oracle: Arc<dyn ExtractionOracle>, store: Arc<dyn IncidentStore>) -> Self {
        let checker = DuplicateChecker::new(store.clone(), crate::config::DEFAULT_WINDOW_DAYS);
        Self {
            oracle,
            store,
            checker,
            messages: None,
            retry: RetryPolicy::default(),
            pacing: PacingPolicy::default(),
            budget: ScanBudget::default(),
            debug: false,
        }
    }

    /// Scanner configured from resolved settings
    pub fn from_config(
        config: &ResolvedConfig,
        oracle: Arc<dyn ExtractionOracle>,
        store: Arc<dyn IncidentStore>,
    ) -> Self {
        Self::new(oracle, store)
            .with_window_days(config.window_days)
            .with_retry(config.retry.clone())
            .with_pacing(config.scan_pacing)
            .with_budget(config.budget.clone())
    }

    pub fn with_window_days(mut self, window_days: u32) -> Self {
        self.checker = DuplicateChecker::new(self.store.clone(), window_days);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pacing(mut self, pacing: PacingPolicy) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_budget(mut self, budget: ScanBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_message_source(mut self, source: Arc<dyn MessageSource>) -> Self {
        self.messages = Some(source);
        self
    }

    /// Keep truncated raw oracle output on each unit
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Scan one calendar year of news, January–June then July–December
    #[instrument(skip(self))]
    pub async fn scan_year(&self, year: i32) -> ScanReport {
        let mut report = ScanReport::new(year.to_string(), DataSource::ArchiveScan);
        let tracker = BudgetTracker::new();
        let mut pacer = self.pacing.pacer();

        for (half, first, last) in HALVES {
            let label = format!("{} {}", year, half);

            if let Err(violation) = self.budget.check_scan(&tracker) {
                warn!(unit = %label, error = %violation, "Skipping unit");
                report.push(ScanDetail::failed(label, violation.to_string()));
                continue;
            }

            let prompt = extraction::archive_prompt(year, first, last);
            let detail = self
                .process_unit(&label, &prompt, DataSource::ArchiveScan, &mut pacer)
                .await;
            report.push(detail);
        }

        info!(
            year,
            inserted = report.total_inserted(),
            duplicates = report.total_duplicates(),
            elapsed_ms = tracker.elapsed_ms(),
            status = ?report.status(),
            "Archive year scanned"
        );
        report
    }

    /// Scan a single month; the runner's archive task
    #[instrument(skip(self))]
    pub async fn scan_month(&self, year: i32, month: u32) -> ScanReport {
        let label = format!("{}-{:02}", year, month);
        let mut report = ScanReport::new(label.clone(), DataSource::ArchiveScan);

        if !(1..=12).contains(&month) {
            report.push(ScanDetail::failed(label, format!("invalid month {}", month)));
            return report;
        }

        let prompt = extraction::archive_prompt(year, month, month);
        let mut pacer = self.pacing.pacer();
        let detail = self
            .process_unit(&label, &prompt, DataSource::ArchiveScan, &mut pacer)
            .await;
        report.push(detail);

        info!(
            %label,
            inserted = report.total_inserted(),
            duplicates = report.total_duplicates(),
            "Month scanned"
        );
        report
    }

    /// Periodic scan over the last `days` days ending today
    pub async fn scan_recent(&self, days: u32) -> ScanReport {
        self.scan_recent_ending(Local::now().date_naive(), days).await
    }

    /// Periodic scan over `days` days ending on `today` (inclusive)
    #[instrument(skip(self))]
    pub async fn scan_recent_ending(&self, today: NaiveDate, days: u32) -> ScanReport {
        let days = days.max(1);
        let from = today
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .unwrap_or(today);
        let label = format!("{}..{}", from, today);
        let mut report = ScanReport::new(format!("last {} days", days), DataSource::CronScan);

        let prompt = extraction::recent_prompt(from, today);
        let mut pacer = self.pacing.pacer();
        let detail = self
            .process_unit(&label, &prompt, DataSource::CronScan, &mut pacer)
            .await;
        report.push(detail);

        info!(
            days,
            inserted = report.total_inserted(),
            duplicates = report.total_duplicates(),
            "Recent scan finished"
        );
        report
    }

    /// Search a public channel and extract incidents from the matches
    #[instrument(skip(self))]
    pub async fn scan_channel(&self, channel: &str, keyword: &str) -> ScanReport {
        let label = format!("{} / {}", channel, keyword);
        let mut report = ScanReport::new(label.clone(), DataSource::TelegramScan);

        let Some(ref source) = self.messages else {
            report.push(ScanDetail::failed(label, "no message source configured"));
            return report;
        };

        let messages = match source.search(channel, keyword).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(channel, keyword, error = %e, "Channel search failed");
                report.push(ScanDetail::failed(label, e.to_string()));
                return report;
            }
        };

        if messages.is_empty() {
            debug!(channel, keyword, "No matching messages");
            report.push(ScanDetail::new(label));
            return report;
        }

        let prompt = extraction::messages_prompt(channel, &messages);
        let mut pacer = self.pacing.pacer();
        let detail = self
            .process_unit(&label, &prompt, DataSource::TelegramScan, &mut pacer)
            .await;
        report.push(detail);

        info!(
            channel,
            keyword,
            messages = messages.len(),
            inserted = report.total_inserted(),
            "Channel scanned"
        );
        report
    }

    /// Run one unit end to end. Never fails; problems land in the detail.
    async fn process_unit(
        &self,
        label: &str,
        prompt: &str,
        source: DataSource,
        pacer: &mut Pacer,
    ) -> ScanDetail {
        pacer.ready().await;

        let output = match self
            .retry
            .run(label, || self.oracle.generate(prompt))
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(unit = label, error = %e, "Oracle call failed");
                return ScanDetail::failed(label, format!("{} error: {}", self.oracle.name(), e));
            }
        };

        let mut detail = ScanDetail::new(label);
        if self.debug {
            detail.raw_response = Some(output.content.chars().take(DEBUG_RAW_LIMIT).collect());
        }

        if let Err(violation) = self.budget.validate_response(&output.content) {
            warn!(unit = label, error = %violation, "Discarding oversized response");
            detail.error = Some(violation.to_string());
            return detail;
        }

        let (candidates, examined) = match ExtractionOutcome::parse(&output.content) {
            ExtractionOutcome::Parsed {
                candidates,
                examined,
            } => (candidates, examined),
            ExtractionOutcome::Empty => {
                debug!(unit = label, "Oracle reported no incidents");
                return detail;
            }
            ExtractionOutcome::Malformed(reason) => {
                warn!(unit = label, %reason, "Skipping unit with malformed output");
                detail.error = Some(reason);
                return detail;
            }
        };

        detail.examined = examined;
        detail.found = candidates.len();

        for candidate in candidates {
            if self.checker.is_duplicate(&candidate).await {
                detail.duplicates += 1;
                continue;
            }

            let incident = PersistedIncident::from_candidate(candidate, source);
            match self.store.insert(&incident).await {
                Ok(()) => detail.inserted += 1,
                Err(e) => {
                    warn!(
                        unit = label,
                        city = %incident.candidate.city,
                        error = %e,
                        "Insert failed"
                    );
                    detail.insert_errors += 1;
                }
            }
        }

        debug!(
            unit = label,
            examined = detail.examined,
            found = detail.found,
            inserted = detail.inserted,
            duplicates = detail.duplicates,
            "Unit processed"
        );
        detail
    }
}
