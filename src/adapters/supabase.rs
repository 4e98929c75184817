//! Supabase incident table over PostgREST.
//!
//! Endpoint: {url}/rest/v1/{table}
//! Auth: `apikey` header plus `Authorization: Bearer {key}`

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use super::{IncidentStore, RecentQuery, StoreError};
use crate::config::SupabaseSettings;
use crate::domain::{DuplicateKey, IncidentRow, PersistedIncident};

/// PostgREST client for the incidents table
pub struct SupabaseStore {
    table_url: String,
    key: String,
    client: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(url: &str, key: impl Into<String>, table: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            table_url: format!("{}/rest/v1/{}", url.trim_end_matches('/'), table),
            key: key.into(),
            client,
        })
    }

    /// Build from resolved settings; URL and key are both required
    pub fn from_settings(settings: &SupabaseSettings, timeout: Duration) -> Result<Self> {
        let url = settings
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .context("SUPABASE_URL (or supabase.url) is required")?;
        let key = settings
            .key
            .clone()
            .filter(|k| !k.is_empty())
            .context("SUPABASE_KEY (or supabase.key) is required")?;

        Self::new(url, key, &settings.table, timeout)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", self.key))
    }

    async fn select(&self, params: Vec<(String, String)>) -> Result<Vec<IncidentRow>, StoreError> {
        let response = self
            .authed(self.client.get(&self.table_url))
            .query(&params)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        decode_rows(&body)
    }
}

/// Decode a PostgREST result set row by row.
///
/// Only a body that isn't a JSON array is an error; a bad value inside a
/// row is coerced or dropped for that field alone.
pub fn decode_rows(body: &str) -> Result<Vec<IncidentRow>, StoreError> {
    let rows: Vec<Value> =
        serde_json::from_str(body).map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(rows.iter().filter_map(IncidentRow::from_value).collect())
}

fn eq(column: &str, value: &str) -> (String, String) {
    (column.to_string(), format!("eq.{}", value))
}

fn date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Query string for an exact duplicate lookup
pub fn exact_params(key: &DuplicateKey) -> Vec<(String, String)> {
    vec![
        ("select".to_string(), "id".to_string()),
        eq("incident_date", &date(key.date)),
        eq("city", &key.city),
        eq("device_type", &key.device_type),
        ("limit".to_string(), "1".to_string()),
    ]
}

/// Query string for a window lookup
pub fn range_params(
    city: &str,
    device_type: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<(String, String)> {
    vec![
        ("select".to_string(), "id,incident_date".to_string()),
        eq("city", city),
        eq("device_type", device_type),
        ("incident_date".to_string(), format!("gte.{}", date(from))),
        ("incident_date".to_string(), format!("lte.{}", date(to))),
    ]
}

/// Query string for the dashboard listing
pub fn recent_params(query: &RecentQuery) -> Vec<(String, String)> {
    let mut params = vec![
        ("select".to_string(), "*".to_string()),
        ("order".to_string(), "incident_date.desc".to_string()),
        ("limit".to_string(), query.limit.to_string()),
    ];

    if let Some(year) = query.year {
        params.push(("incident_date".to_string(), format!("gte.{}-01-01", year)));
        params.push(("incident_date".to_string(), format!("lte.{}-12-31", year)));
    }
    if let Some(ref device) = query.device {
        params.push(eq("device_type", device));
    }

    params
}

#[async_trait]
impl IncidentStore for SupabaseStore {
    async fn find_exact(&self, key: &DuplicateKey) -> Result<Vec<IncidentRow>, StoreError> {
        self.select(exact_params(key)).await
    }

    async fn find_in_range(
        &self,
        city: &str,
        device_type: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<IncidentRow>, StoreError> {
        self.select(range_params(city, device_type, from, to)).await
    }

    async fn insert(&self, incident: &PersistedIncident) -> Result<(), StoreError> {
        let response = self
            .authed(self.client.post(&self.table_url))
            .header("Prefer", "return=minimal")
            .json(incident)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            city = %incident.candidate.city,
            device = %incident.candidate.device_type,
            date = %incident.candidate.incident_date,
            "Inserted incident"
        );
        Ok(())
    }

    async fn recent(&self, query: &RecentQuery) -> Result<Vec<IncidentRow>, StoreError> {
        self.select(recent_params(query)).await
    }
}
