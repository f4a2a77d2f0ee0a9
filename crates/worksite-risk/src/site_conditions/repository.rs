use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    LibrarySiteConditionId, LocationId, SiteCondition, SiteConditionId, SiteConditionOrigin,
};
use crate::error::RepositoryError;

/// One applying classifier result, ready to be written for (location, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedRow {
    pub library_site_condition_id: LibrarySiteConditionId,
    pub multiplier: f64,
    pub alert: bool,
    pub details: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
}

impl ReplaceSummary {
    pub fn changed(&self) -> usize {
        self.inserted + self.updated + self.removed
    }
}

pub trait SiteConditionRepository: Send + Sync {
    fn site_condition(&self, id: SiteConditionId) -> Result<Option<SiteCondition>, RepositoryError>;
    /// Non-archived manual rows for the location.
    fn manual_for_location(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<SiteCondition>, RepositoryError>;
    fn evaluated_for(
        &self,
        location_id: LocationId,
        date: NaiveDate,
    ) -> Result<Vec<SiteCondition>, RepositoryError>;
    /// Rejects a second non-archived manual row for (location, library entry).
    fn insert_manual(&self, condition: SiteCondition) -> Result<SiteCondition, RepositoryError>;
    /// Atomically make the evaluated set for (location, date) equal `rows`:
    /// upsert each row, delete the ones no longer present.
    fn replace_evaluated(
        &self,
        location_id: LocationId,
        date: NaiveDate,
        rows: &[EvaluatedRow],
    ) -> Result<ReplaceSummary, RepositoryError>;
    fn archive(&self, id: SiteConditionId, at: DateTime<Utc>) -> Result<(), RepositoryError>;
    fn archive_for_location(
        &self,
        location_id: LocationId,
        at: DateTime<Utc>,
    ) -> Result<Vec<SiteConditionId>, RepositoryError>;
}

#[derive(Debug, Default)]
pub struct InMemorySiteConditionRepository {
    rows: Mutex<HashMap<SiteConditionId, SiteCondition>>,
}

impl InMemorySiteConditionRepository {
    pub fn all(&self) -> Vec<SiteCondition> {
        self.rows
            .lock()
            .expect("site condition mutex poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl SiteConditionRepository for InMemorySiteConditionRepository {
    fn site_condition(
        &self,
        id: SiteConditionId,
    ) -> Result<Option<SiteCondition>, RepositoryError> {
        let guard = self.rows.lock().expect("site condition mutex poisoned");
        Ok(guard.get(&id).cloned())
    }

    fn manual_for_location(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<SiteCondition>, RepositoryError> {
        let guard = self.rows.lock().expect("site condition mutex poisoned");
        Ok(guard
            .values()
            .filter(|row| {
                row.location_id == location_id && row.is_manually_added() && !row.is_archived()
            })
            .cloned()
            .collect())
    }

    fn evaluated_for(
        &self,
        location_id: LocationId,
        date: NaiveDate,
    ) -> Result<Vec<SiteCondition>, RepositoryError> {
        let guard = self.rows.lock().expect("site condition mutex poisoned");
        Ok(guard
            .values()
            .filter(|row| row.location_id == location_id && row.evaluated_on() == Some(date))
            .cloned()
            .collect())
    }

    fn insert_manual(&self, condition: SiteCondition) -> Result<SiteCondition, RepositoryError> {
        if !condition.is_manually_added() {
            return Err(RepositoryError::Conflict(
                "only manual rows may be inserted directly".to_string(),
            ));
        }
        let mut guard = self.rows.lock().expect("site condition mutex poisoned");
        let duplicate = guard.values().any(|row| {
            row.location_id == condition.location_id
                && row.library_site_condition_id == condition.library_site_condition_id
                && row.is_manually_added()
                && !row.is_archived()
        });
        if duplicate || guard.contains_key(&condition.id) {
            return Err(RepositoryError::Conflict(format!(
                "manual site condition {} already present at location {}",
                condition.library_site_condition_id, condition.location_id
            )));
        }
        guard.insert(condition.id, condition.clone());
        Ok(condition)
    }

    fn replace_evaluated(
        &self,
        location_id: LocationId,
        date: NaiveDate,
        rows: &[EvaluatedRow],
    ) -> Result<ReplaceSummary, RepositoryError> {
        let mut guard = self.rows.lock().expect("site condition mutex poisoned");
        let mut summary = ReplaceSummary::default();

        let existing: HashMap<LibrarySiteConditionId, SiteConditionId> = guard
            .values()
            .filter(|row| row.location_id == location_id && row.evaluated_on() == Some(date))
            .map(|row| (row.library_site_condition_id, row.id))
            .collect();

        for row in rows {
            let origin = SiteConditionOrigin::Evaluated {
                date,
                alert: row.alert,
                multiplier: row.multiplier,
                details: row.details.clone(),
            };
            match existing.get(&row.library_site_condition_id) {
                Some(id) => {
                    let stored = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
                    if stored.origin == origin && stored.archived_at.is_none() {
                        summary.unchanged += 1;
                    } else {
                        stored.origin = origin;
                        stored.archived_at = None;
                        summary.updated += 1;
                    }
                }
                None => {
                    let condition = SiteCondition {
                        id: SiteConditionId::new(),
                        location_id,
                        library_site_condition_id: row.library_site_condition_id,
                        origin,
                        archived_at: None,
                    };
                    guard.insert(condition.id, condition);
                    summary.inserted += 1;
                }
            }
        }

        for (library_id, id) in existing {
            if !rows
                .iter()
                .any(|row| row.library_site_condition_id == library_id)
            {
                guard.remove(&id);
                summary.removed += 1;
            }
        }

        Ok(summary)
    }

    fn archive(&self, id: SiteConditionId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut guard = self.rows.lock().expect("site condition mutex poisoned");
        let row = guard.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        row.archived_at.get_or_insert(at);
        Ok(())
    }

    fn archive_for_location(
        &self,
        location_id: LocationId,
        at: DateTime<Utc>,
    ) -> Result<Vec<SiteConditionId>, RepositoryError> {
        let mut guard = self.rows.lock().expect("site condition mutex poisoned");
        let mut archived = Vec::new();
        for row in guard
            .values_mut()
            .filter(|row| row.location_id == location_id && row.archived_at.is_none())
        {
            row.archived_at = Some(at);
            archived.push(row.id);
        }
        Ok(archived)
    }
}
