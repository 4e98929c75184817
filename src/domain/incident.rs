//! Incident records as they move through the ingestion pipeline.
//!
//! A candidate comes out of the extraction oracle, gets validated, checked
//! for duplicates and finally persisted with provenance fields attached.

use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default district label for candidates without a usable district
pub const DEFAULT_DISTRICT: &str = "other";

/// Default severity label
pub const DEFAULT_SEVERITY: &str = "moderate";

/// Administrative region an incident happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum District {
    North,
    Haifa,
    Center,
    TelAviv,
    Jerusalem,
    South,
    JudeaSamaria,
    Other,
}

impl Default for District {
    fn default() -> Self {
        Self::Other
    }
}

impl District {
    /// Parse a loosely formatted label. Unknown labels map to `Other`.
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "north" | "northern" => Self::North,
            "haifa" => Self::Haifa,
            "center" | "central" | "centre" => Self::Center,
            "tel_aviv" | "telaviv" | "tel_aviv_yafo" => Self::TelAviv,
            "jerusalem" => Self::Jerusalem,
            "south" | "southern" => Self::South,
            "judea_samaria" | "judea_and_samaria" | "west_bank" => Self::JudeaSamaria,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::North => "north",
            Self::Haifa => "haifa",
            Self::Center => "center",
            Self::TelAviv => "tel_aviv",
            Self::Jerusalem => "jerusalem",
            Self::South => "south",
            Self::JudeaSamaria => "judea_samaria",
            Self::Other => DEFAULT_DISTRICT,
        }
    }
}

impl fmt::Display for District {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a persisted incident came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Year-scoped backfill over archived news
    ArchiveScan,

    /// Recurring scan over the last few days
    CronScan,

    /// Public Telegram channel messages
    TelegramScan,
}

impl DataSource {
    /// Fixed heuristic score stored alongside the incident.
    ///
    /// This is not a model confidence; it only ranks provenance.
    pub fn heuristic_confidence(&self) -> f64 {
        match self {
            Self::ArchiveScan => 0.7,
            Self::CronScan => 0.8,
            Self::TelegramScan => 0.6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArchiveScan => "archive_scan",
            Self::CronScan => "cron_scan",
            Self::TelegramScan => "telegram_scan",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical identity of an incident for duplicate detection.
///
/// Two keys describe the same real-world event when city and device type
/// match exactly and their dates are at most `window_days` apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DuplicateKey {
    pub date: NaiveDate,
    pub city: String,
    pub device_type: String,
}

impl DuplicateKey {
    pub fn new(date: NaiveDate, city: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            date,
            city: city.into(),
            device_type: device_type.into(),
        }
    }

    /// Inclusive date range `[date - days, date + days]`
    pub fn window(&self, window_days: u32) -> (NaiveDate, NaiveDate) {
        let span = Duration::days(i64::from(window_days));
        (self.date - span, self.date + span)
    }

    /// Whether `other` falls inside this key's fuzzy window
    pub fn within_window(&self, other: &DuplicateKey, window_days: u32) -> bool {
        if self.city != other.city || self.device_type != other.device_type {
            return false;
        }
        let (from, to) = self.window(window_days);
        other.date >= from && other.date <= to
    }
}

/// An unvalidated-then-validated record extracted from oracle output.
///
/// Instances only exist once the required fields are known to be present,
/// so everything downstream can rely on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentCandidate {
    pub incident_date: NaiveDate,
    pub city: String,
    pub district: District,
    pub device_type: String,
    pub severity: String,
    pub injuries: u32,
    pub fatalities: u32,
    pub property_damage: bool,
    pub description: Option<String>,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
}

impl IncidentCandidate {
    /// Build a candidate with defaults for every optional field
    pub fn new(
        incident_date: NaiveDate,
        city: impl Into<String>,
        device_type: impl Into<String>,
    ) -> Self {
        Self {
            incident_date,
            city: city.into(),
            district: District::Other,
            device_type: device_type.into(),
            severity: DEFAULT_SEVERITY.to_string(),
            injuries: 0,
            fatalities: 0,
            property_damage: true,
            description: None,
            source_name: None,
            source_url: None,
        }
    }

    /// Validate one element of the oracle's JSON array.
    ///
    /// Returns `None` when `incident_date`, `city` or `device_type` is
    /// missing or unusable. Optional fields are coerced leniently.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        let incident_date = text_field(obj.get("incident_date"))
            .and_then(|s| parse_date(&s))?;
        let city = text_field(obj.get("city"))?;
        let device_type = text_field(obj.get("device_type"))?;

        Some(Self {
            incident_date,
            city,
            district: text_field(obj.get("district"))
                .map(|d| District::from_label(&d))
                .unwrap_or_default(),
            device_type,
            severity: text_field(obj.get("severity"))
                .unwrap_or_else(|| DEFAULT_SEVERITY.to_string()),
            injuries: count_field(obj.get("injuries")),
            fatalities: count_field(obj.get("fatalities")),
            property_damage: bool_field(obj.get("property_damage")).unwrap_or(true),
            description: text_field(obj.get("description")),
            source_name: text_field(obj.get("source_name")),
            source_url: text_field(obj.get("source_url")),
        })
    }

    pub fn key(&self) -> DuplicateKey {
        DuplicateKey::new(self.incident_date, self.city.clone(), self.device_type.clone())
    }
}

/// A candidate plus the system-assigned provenance fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedIncident {
    #[serde(flatten)]
    pub candidate: IncidentCandidate,
    pub data_source: DataSource,
    pub gemini_confidence: f64,
    pub verified: bool,
}

impl PersistedIncident {
    /// Attach ingestion metadata. `verified` always starts out false.
    pub fn from_candidate(candidate: IncidentCandidate, data_source: DataSource) -> Self {
        Self {
            candidate,
            data_source,
            gemini_confidence: data_source.heuristic_confidence(),
            verified: false,
        }
    }
}

/// A stored incident row as read back for the dashboard.
///
/// Every field is optional so that rows written by older versions or by
/// hand never break aggregation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentRow {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub incident_date: Option<NaiveDate>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub injuries: Option<u32>,
    #[serde(default)]
    pub fatalities: Option<u32>,
    #[serde(default)]
    pub property_damage: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub verified: Option<bool>,
}

impl IncidentRow {
    /// Coerce one stored row field by field.
    ///
    /// A field of the wrong shape becomes `None` (or 0 for counts) instead
    /// of failing the row. Non-object values yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let count = |key: &str| {
            obj.get(key)
                .filter(|v| !v.is_null())
                .map(|v| count_field(Some(v)))
        };

        Some(Self {
            id: obj.get("id").filter(|v| !v.is_null()).cloned(),
            incident_date: text_field(obj.get("incident_date")).and_then(|s| parse_date(&s)),
            city: text_field(obj.get("city")),
            district: text_field(obj.get("district")),
            device_type: text_field(obj.get("device_type")),
            severity: text_field(obj.get("severity")),
            injuries: count("injuries"),
            fatalities: count("fatalities"),
            property_damage: bool_field(obj.get("property_damage")),
            description: text_field(obj.get("description")),
            source_name: text_field(obj.get("source_name")),
            source_url: text_field(obj.get("source_url")),
            data_source: text_field(obj.get("data_source")),
            verified: bool_field(obj.get("verified")),
        })
    }
}

impl From<&PersistedIncident> for IncidentRow {
    fn from(incident: &PersistedIncident) -> Self {
        let c = &incident.candidate;
        Self {
            id: None,
            incident_date: Some(c.incident_date),
            city: Some(c.city.clone()),
            district: Some(c.district.to_string()),
            device_type: Some(c.device_type.clone()),
            severity: Some(c.severity.clone()),
            injuries: Some(c.injuries),
            fatalities: Some(c.fatalities),
            property_damage: Some(c.property_damage),
            description: c.description.clone(),
            source_name: c.source_name.clone(),
            source_url: c.source_url.clone(),
            data_source: Some(incident.data_source.to_string()),
            verified: Some(incident.verified),
        }
    }
}

/// Non-empty trimmed string, or `None`
fn text_field(value: Option<&Value>) -> Option<String> {
    let s = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() || s.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(s)
    }
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time component
fn parse_date(s: &str) -> Option<NaiveDate> {
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn count_field(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|n| n.min(u64::from(u32::MAX)) as u32)
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<u32>().unwrap_or(0),
        _ => 0,
    }
}

fn bool_field(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_candidate_defaults() {
        let value = json!({
            "incident_date": "2024-06-10",
            "city": "Haifa",
            "device_type": "e-bike"
        });

        let candidate = IncidentCandidate::from_value(&value).unwrap();
        assert_eq!(candidate.district, District::Other);
        assert_eq!(candidate.severity, "moderate");
        assert_eq!(candidate.injuries, 0);
        assert_eq!(candidate.fatalities, 0);
        assert!(candidate.property_damage);
        assert!(candidate.description.is_none());
    }

    #[test]
    fn test_candidate_missing_required_fields() {
        let no_date = json!({ "city": "Haifa", "device_type": "e-bike" });
        let no_city = json!({ "incident_date": "2024-06-10", "device_type": "e-bike" });
        let no_device = json!({ "incident_date": "2024-06-10", "city": "Haifa" });
        let blank_city = json!({ "incident_date": "2024-06-10", "city": "  ", "device_type": "e-bike" });
        let bad_date = json!({ "incident_date": "June 10th", "city": "Haifa", "device_type": "e-bike" });

        assert!(IncidentCandidate::from_value(&no_date).is_none());
        assert!(IncidentCandidate::from_value(&no_city).is_none());
        assert!(IncidentCandidate::from_value(&no_device).is_none());
        assert!(IncidentCandidate::from_value(&blank_city).is_none());
        assert!(IncidentCandidate::from_value(&bad_date).is_none());
        assert!(IncidentCandidate::from_value(&json!("not an object")).is_none());
    }

    #[test]
    fn test_candidate_lenient_optional_fields() {
        let value = json!({
            "incident_date": "2024-03-01T08:00:00",
            "city": "Bnei Brak",
            "district": "Tel Aviv",
            "device_type": "scooter",
            "severity": "severe",
            "injuries": "2",
            "fatalities": -1,
            "property_damage": "no",
            "source_url": "https://example.com/a"
        });

        let candidate = IncidentCandidate::from_value(&value).unwrap();
        assert_eq!(candidate.incident_date, date("2024-03-01"));
        assert_eq!(candidate.district, District::TelAviv);
        assert_eq!(candidate.severity, "severe");
        assert_eq!(candidate.injuries, 2);
        assert_eq!(candidate.fatalities, 0);
        assert!(!candidate.property_damage);
        assert_eq!(candidate.source_url.as_deref(), Some("https://example.com/a"));
    }

    #[test]
    fn test_district_labels() {
        assert_eq!(District::from_label("judea-samaria"), District::JudeaSamaria);
        assert_eq!(District::from_label("CENTRAL"), District::Center);
        assert_eq!(District::from_label("atlantis"), District::Other);
        assert_eq!(District::TelAviv.to_string(), "tel_aviv");
    }

    #[test]
    fn test_duplicate_key_window() {
        let stored = DuplicateKey::new(date("2024-06-10"), "X", "e-bike");

        let two_days = DuplicateKey::new(date("2024-06-12"), "X", "e-bike");
        let four_days = DuplicateKey::new(date("2024-06-14"), "X", "e-bike");
        let other_city = DuplicateKey::new(date("2024-06-10"), "Y", "e-bike");

        assert!(stored.within_window(&two_days, 3));
        assert!(two_days.within_window(&stored, 3));
        assert!(!stored.within_window(&four_days, 3));
        assert!(!stored.within_window(&other_city, 3));
        assert_eq!(
            stored.window(3),
            (date("2024-06-07"), date("2024-06-13"))
        );
    }

    #[test]
    fn test_persisted_incident_serialization() {
        let candidate = IncidentCandidate::new(date("2024-06-10"), "Ashdod", "power bank");
        let incident = PersistedIncident::from_candidate(candidate, DataSource::ArchiveScan);

        assert!(!incident.verified);
        assert_eq!(incident.gemini_confidence, 0.7);

        let json = serde_json::to_value(&incident).unwrap();
        assert_eq!(json["incident_date"], "2024-06-10");
        assert_eq!(json["city"], "Ashdod");
        assert_eq!(json["district"], "other");
        assert_eq!(json["data_source"], "archive_scan");
        assert_eq!(json["verified"], false);
    }

    #[test]
    fn test_incident_row_tolerates_sparse_rows() {
        let row: IncidentRow = serde_json::from_value(json!({ "id": 7, "city": "Eilat" })).unwrap();
        assert_eq!(row.city.as_deref(), Some("Eilat"));
        assert!(row.device_type.is_none());
        assert!(row.incident_date.is_none());
    }
}
