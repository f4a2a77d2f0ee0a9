use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{WorldDataClient, WorldDataError, WorldDataQuery, WorldDataResponse};

/// Deterministic client used by the demo CLI and tests. Responses are looked
/// up by query date, falling back to a default payload.
#[derive(Debug, Default)]
pub struct FixtureWorldDataClient {
    by_date: Mutex<HashMap<NaiveDate, WorldDataResponse>>,
    fallback: Mutex<WorldDataResponse>,
    outage: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl FixtureWorldDataClient {
    pub fn new(fallback: WorldDataResponse) -> Self {
        Self {
            fallback: Mutex::new(fallback),
            ..Self::default()
        }
    }

    pub fn set_fallback(&self, response: WorldDataResponse) {
        *self.fallback.lock().expect("fixture mutex poisoned") = response;
    }

    pub fn set_for_date(&self, date: NaiveDate, response: WorldDataResponse) {
        self.by_date
            .lock()
            .expect("fixture mutex poisoned")
            .insert(date, response);
    }

    /// Make every subsequent call fail until [`Self::restore`] is called.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.outage.lock().expect("fixture mutex poisoned") = Some(reason.into());
    }

    pub fn restore(&self) {
        *self.outage.lock().expect("fixture mutex poisoned") = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorldDataClient for FixtureWorldDataClient {
    async fn location_bulk(
        &self,
        queries: &[WorldDataQuery],
    ) -> Result<BTreeMap<usize, WorldDataResponse>, WorldDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.outage.lock().expect("fixture mutex poisoned").clone() {
            return Err(WorldDataError::Unavailable(reason));
        }

        let by_date = self.by_date.lock().expect("fixture mutex poisoned");
        let fallback = self.fallback.lock().expect("fixture mutex poisoned");
        Ok(queries
            .iter()
            .enumerate()
            .map(|(ordinal, query)| {
                let response = by_date
                    .get(&query.date)
                    .cloned()
                    .unwrap_or_else(|| fallback.clone());
                (ordinal, response)
            })
            .collect())
    }
}
