//! Dashboard aggregates over fetched incident rows.

use std::collections::{BTreeMap, HashMap};

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::domain::{IncidentRow, DEFAULT_SEVERITY};

/// Number of cities in the leaderboard
pub const TOP_CITIES: usize = 10;

/// Placeholder for rows without a city
pub const UNKNOWN_CITY: &str = "unknown";

/// Placeholder for rows without a device type
pub const OTHER_DEVICE: &str = "other";

/// Incident count for one city
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityCount {
    pub city: String,
    pub count: usize,
}

/// Aggregates shown on the dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total: usize,
    pub deaths: u64,
    pub injuries: u64,
    pub by_device: BTreeMap<String, usize>,
    pub by_year: BTreeMap<i32, usize>,
    /// Month number (1-12) within the current year
    pub by_month: BTreeMap<u32, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub top_cities: Vec<CityCount>,
}

fn label_or(value: Option<&str>, placeholder: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => placeholder.to_string(),
    }
}

impl DashboardStats {
    /// Aggregate `rows`; `current_year` selects the months shown in `by_month`
    pub fn compute(rows: &[IncidentRow], current_year: i32) -> Self {
        let mut stats = Self {
            total: rows.len(),
            ..Default::default()
        };

        // Cities in first-encounter order, so the stable sort keeps ties that way
        let mut city_order: Vec<String> = Vec::new();
        let mut city_counts: HashMap<String, usize> = HashMap::new();

        for row in rows {
            stats.deaths += u64::from(row.fatalities.unwrap_or(0));
            stats.injuries += u64::from(row.injuries.unwrap_or(0));

            let device = label_or(row.device_type.as_deref(), OTHER_DEVICE);
            *stats.by_device.entry(device).or_default() += 1;

            let severity = label_or(row.severity.as_deref(), DEFAULT_SEVERITY);
            *stats.by_severity.entry(severity).or_default() += 1;

            if let Some(date) = row.incident_date {
                *stats.by_year.entry(date.year()).or_default() += 1;
                if date.year() == current_year {
                    *stats.by_month.entry(date.month()).or_default() += 1;
                }
            }

            let city = label_or(row.city.as_deref(), UNKNOWN_CITY);
            let count = city_counts.entry(city.clone()).or_default();
            if *count == 0 {
                city_order.push(city);
            }
            *count += 1;
        }

        let mut cities: Vec<CityCount> = city_order
            .into_iter()
            .map(|city| {
                let count = city_counts.get(&city).copied().unwrap_or(0);
                CityCount { city, count }
            })
            .collect();
        cities.sort_by(|a, b| b.count.cmp(&a.count));
        cities.truncate(TOP_CITIES);
        stats.top_cities = cities;

        stats
    }
}
