//! Duplicate detection against the incident store.
//!
//! The store has no uniqueness constraint; identity is checked here before
//! every insert. Failures count as "not a duplicate": inserting a duplicate
//! is recoverable, silently dropping a real incident is not.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::adapters::IncidentStore;
use crate::domain::{DuplicateKey, IncidentCandidate};

/// Checks candidates against existing rows
#[derive(Clone)]
pub struct DuplicateChecker {
    store: Arc<dyn IncidentStore>,
    window_days: u32,
}

impl DuplicateChecker {
    pub fn new(store: Arc<dyn IncidentStore>, window_days: u32) -> Self {
        Self { store, window_days }
    }

    /// Whether an equivalent incident is already stored.
    ///
    /// Exact (date, city, device) match first, then the fuzzy date window.
    pub async fn is_duplicate(&self, candidate: &IncidentCandidate) -> bool {
        let key = candidate.key();

        match self.store.find_exact(&key).await {
            Ok(rows) if !rows.is_empty() => {
                debug!(city = %key.city, device = %key.device_type, date = %key.date, "Exact duplicate");
                return true;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, city = %key.city, "Exact duplicate lookup failed, assuming new");
                return false;
            }
        }

        self.in_window(&key).await
    }

    async fn in_window(&self, key: &DuplicateKey) -> bool {
        let (from, to) = key.window(self.window_days);

        match self
            .store
            .find_in_range(&key.city, &key.device_type, from, to)
            .await
        {
            Ok(rows) => {
                let found = !rows.is_empty();
                if found {
                    debug!(
                        city = %key.city,
                        device = %key.device_type,
                        %from,
                        %to,
                        "Fuzzy duplicate within window"
                    );
                }
                found
            }
            Err(e) => {
                warn!(error = %e, city = %key.city, "Window duplicate lookup failed, assuming new");
                false
            }
        }
    }
}
