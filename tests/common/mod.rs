//! In-memory doubles for the oracle, store and channel traits.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use lithium_watch::adapters::{
    ChannelError, ChannelMessage, ExtractionOracle, IncidentStore, MessageSource, OracleError,
    OracleOutput, RecentQuery, StoreError,
};
use lithium_watch::core::{PacingPolicy, RetryPolicy, Scanner};
use lithium_watch::domain::{DuplicateKey, IncidentCandidate, IncidentRow, PersistedIncident};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Incident table kept in a Vec, with read/write counters and failure switches
#[derive(Default)]
pub struct MemoryStore {
    pub rows: Mutex<Vec<PersistedIncident>>,
    pub reads: AtomicUsize,
    pub insert_calls: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub fail_inserts: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store pre-seeded with one archive row per candidate
    pub fn seeded(candidates: Vec<IncidentCandidate>) -> Arc<Self> {
        let store = Self::default();
        {
            let mut rows = store.rows.lock().unwrap();
            for c in candidates {
                rows.push(PersistedIncident::from_candidate(
                    c,
                    lithium_watch::domain::DataSource::ArchiveScan,
                ));
            }
        }
        Arc::new(store)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    fn select(
        &self,
        pred: impl Fn(&PersistedIncident) -> bool,
    ) -> Result<Vec<IncidentRow>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("connection reset".to_string()));
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| pred(r))
            .map(IncidentRow::from)
            .collect())
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn find_exact(&self, key: &DuplicateKey) -> Result<Vec<IncidentRow>, StoreError> {
        self.select(|r| &r.candidate.key() == key)
    }

    async fn find_in_range(
        &self,
        city: &str,
        device_type: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<IncidentRow>, StoreError> {
        self.select(|r| {
            r.candidate.city == city
                && r.candidate.device_type == device_type
                && r.candidate.incident_date >= from
                && r.candidate.incident_date <= to
        })
    }

    async fn insert(&self, incident: &PersistedIncident) -> Result<(), StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 400,
                body: "invalid input syntax".to_string(),
            });
        }
        self.rows.lock().unwrap().push(incident.clone());
        Ok(())
    }

    async fn recent(&self, query: &RecentQuery) -> Result<Vec<IncidentRow>, StoreError> {
        let mut rows = self.select(|r| {
            query
                .year
                .map_or(true, |y| chrono::Datelike::year(&r.candidate.incident_date) == y)
                && query
                    .device
                    .as_deref()
                    .map_or(true, |d| r.candidate.device_type == d)
        })?;
        rows.sort_by(|a, b| b.incident_date.cmp(&a.incident_date));
        rows.truncate(query.limit);
        Ok(rows)
    }
}

/// Oracle answering from a queue of scripted responses, recording prompts.
/// Once the queue is empty it answers `[]`.
#[derive(Default)]
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<Result<String, OracleError>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(responses: Vec<Result<String, OracleError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ExtractionOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<OracleOutput, OracleError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(OracleOutput::new(text)),
            Some(Err(e)) => Err(e),
            None => Ok(OracleOutput::new("[]".to_string())),
        }
    }
}

/// Channel source returning the same messages for every search
#[derive(Default)]
pub struct StaticMessages {
    pub messages: Vec<ChannelMessage>,
    pub searches: AtomicUsize,
}

#[async_trait]
impl MessageSource for StaticMessages {
    async fn search(
        &self,
        _channel: &str,
        _keyword: &str,
    ) -> Result<Vec<ChannelMessage>, ChannelError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.messages.clone())
    }
}

/// Scanner with no pacing and a single oracle attempt
pub fn fast_scanner(oracle: Arc<ScriptedOracle>, store: Arc<MemoryStore>) -> Scanner {
    Scanner::new(oracle, store)
        .with_pacing(PacingPolicy::disabled())
        .with_retry(RetryPolicy::none())
}

/// JSON object for one incident entry
pub fn entry(date: &str, city: &str, device: &str) -> String {
    format!(
        r#"{{"incident_date":"{}","city":"{}","device_type":"{}","injuries":0}}"#,
        date, city, device
    )
}

/// JSON array of entries
pub fn array(entries: &[String]) -> String {
    format!("[{}]", entries.join(","))
}
