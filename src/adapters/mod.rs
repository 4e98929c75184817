//! Adapter interfaces for external systems.
//!
//! The pipeline talks to three outside services: a text-generation oracle
//! (Gemini), the incident table (Supabase/PostgREST) and public Telegram
//! channel previews. Each sits behind a trait so scans can run against test
//! doubles.

pub mod gemini;
pub mod supabase;
pub mod telegram;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{DuplicateKey, IncidentRow, PersistedIncident};

pub use gemini::GeminiClient;
pub use supabase::SupabaseStore;
pub use telegram::{ChannelMessage, TelegramChannelSource};

/// Output from an oracle call
#[derive(Debug, Clone)]
pub struct OracleOutput {
    /// The generated text
    pub content: String,

    /// Tokens used (if reported)
    pub tokens_used: Option<u64>,
}

impl OracleOutput {
    pub fn new(content: String) -> Self {
        Self {
            content,
            tokens_used: None,
        }
    }
}

/// Failures talking to the extraction oracle
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("Oracle request failed: {0}")]
    Transport(String),

    #[error("Oracle returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Oracle response could not be decoded: {0}")]
    Decode(String),

    #[error("Oracle returned no text")]
    Empty,
}

impl OracleError {
    /// Whether another attempt might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Empty => false,
        }
    }
}

/// Text-generation service used to surface incident candidates
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    /// Human-readable oracle name
    fn name(&self) -> &str;

    /// Send a prompt, get free text back
    async fn generate(&self, prompt: &str) -> Result<OracleOutput, OracleError>;
}

/// Failures talking to the incident store.
///
/// "No rows" is never an error; it is an empty `Vec`.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store request failed: {0}")]
    Transport(String),

    #[error("Store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Store response could not be decoded: {0}")]
    Decode(String),
}

/// Filters for the dashboard's recent-incidents query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentQuery {
    pub limit: usize,
    pub year: Option<i32>,
    pub device: Option<String>,
}

impl Default for RecentQuery {
    fn default() -> Self {
        Self {
            limit: 200,
            year: None,
            device: None,
        }
    }
}

/// Queryable, appendable incident table
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Rows with exactly this date, city and device type
    async fn find_exact(&self, key: &DuplicateKey) -> Result<Vec<IncidentRow>, StoreError>;

    /// Rows for this city and device type dated within `[from, to]`
    async fn find_in_range(
        &self,
        city: &str,
        device_type: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<IncidentRow>, StoreError>;

    /// Append one incident
    async fn insert(&self, incident: &PersistedIncident) -> Result<(), StoreError>;

    /// Most recent incidents, newest first
    async fn recent(&self, query: &RecentQuery) -> Result<Vec<IncidentRow>, StoreError>;
}

/// Failures fetching channel messages
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("Channel request failed: {0}")]
    Transport(String),

    #[error("Channel returned status {status}")]
    Status { status: u16 },
}

/// Message-based secondary source (public channel search)
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn search(
        &self,
        channel: &str,
        keyword: &str,
    ) -> Result<Vec<ChannelMessage>, ChannelError>;
}
