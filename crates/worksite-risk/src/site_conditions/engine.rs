use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::classifiers::{Classifier, ClassifierError, ConditionResult};
use super::repository::{EvaluatedRow, ReplaceSummary, SiteConditionRepository};
use crate::domain::{LibrarySiteCondition, LibrarySiteConditionId, Location, LocationId};
use crate::error::RepositoryError;
use crate::library::LibraryCatalog;
use crate::world_data::{WorldDataClient, WorldDataQuery, WorldDataSource};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedCondition {
    pub library: LibrarySiteCondition,
    pub result: ConditionResult,
    pub manual: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclinedCondition {
    pub handle_code: String,
    pub reason: String,
}

/// Full account of one evaluation, including partial failures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationOutcome {
    pub location_id: LocationId,
    pub date: NaiveDate,
    pub conditions: Vec<EvaluatedCondition>,
    pub persisted: bool,
    pub changes: ReplaceSummary,
    pub declined: Vec<DeclinedCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_error: Option<String>,
}

impl EvaluationOutcome {
    pub fn find(&self, handle_code: &str) -> Option<&EvaluatedCondition> {
        self.conditions
            .iter()
            .find(|condition| condition.library.handle_code == handle_code)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SiteConditionError {
    #[error("library site condition {0} referenced by a manual row does not exist")]
    MissingDependency(LibrarySiteConditionId),
    #[error("evaluated rows for location {location_id} on {date} kept conflicting")]
    Conflict {
        location_id: LocationId,
        date: NaiveDate,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl SiteConditionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingDependency(_) => "MISSING_DEPENDENCY",
            Self::Conflict { .. } => "CONFLICT",
            Self::Repository(err) => err.code(),
        }
    }
}

struct Candidate {
    library: LibrarySiteCondition,
    classifier: Classifier,
}

/// Evaluates the automatic site conditions of one location for one date and
/// persists the applying set. Manual rows are read, never written.
pub struct SiteConditionsEngine<S> {
    repository: Arc<S>,
    world_data: Arc<dyn WorldDataClient>,
    catalog: Arc<LibraryCatalog>,
}

impl<S> SiteConditionsEngine<S>
where
    S: SiteConditionRepository + 'static,
{
    pub fn new(
        repository: Arc<S>,
        world_data: Arc<dyn WorldDataClient>,
        catalog: Arc<LibraryCatalog>,
    ) -> Self {
        Self {
            repository,
            world_data,
            catalog,
        }
    }

    pub fn repository(&self) -> &Arc<S> {
        &self.repository
    }

    pub fn catalog(&self) -> &Arc<LibraryCatalog> {
        &self.catalog
    }

    fn manual_conditions(
        &self,
        location: &Location,
        catalog: &[LibrarySiteCondition],
    ) -> Result<Vec<EvaluatedCondition>, SiteConditionError> {
        let mut conditions = Vec::new();
        for row in self.repository.manual_for_location(location.id)? {
            let library = match catalog
                .iter()
                .find(|entry| entry.id == row.library_site_condition_id)
            {
                Some(entry) => entry.clone(),
                None => self
                    .catalog
                    .repository()
                    .site_condition(row.library_site_condition_id)?
                    .ok_or(SiteConditionError::MissingDependency(
                        row.library_site_condition_id,
                    ))?,
            };
            conditions.push(EvaluatedCondition {
                result: ConditionResult::manual(&library),
                library,
                manual: true,
            });
        }
        Ok(conditions)
    }

    fn candidates(
        catalog: &[LibrarySiteCondition],
        manual: &[EvaluatedCondition],
    ) -> Vec<Candidate> {
        let suppressed: HashSet<LibrarySiteConditionId> =
            manual.iter().map(|condition| condition.library.id).collect();
        catalog
            .iter()
            .filter(|entry| !suppressed.contains(&entry.id))
            .filter_map(|entry| match Classifier::from_handle(&entry.handle_code) {
                Some(classifier) => Some(Candidate {
                    library: entry.clone(),
                    classifier,
                }),
                None => {
                    debug!(
                        handle_code = %entry.handle_code,
                        "no classifier for library site condition"
                    );
                    None
                }
            })
            .collect()
    }

    /// Manual conditions plus every applying evaluated condition. When world
    /// data is unavailable only the manual set is returned and nothing is
    /// written.
    pub async fn evaluate_location(
        &self,
        location: &Location,
        date: NaiveDate,
    ) -> Result<EvaluationOutcome, SiteConditionError> {
        let catalog = self.catalog.site_conditions(location.tenant_id)?;
        let mut conditions = self.manual_conditions(location, &catalog)?;
        let candidates = Self::candidates(&catalog, &conditions);

        let mut outcome = EvaluationOutcome {
            location_id: location.id,
            date,
            conditions: Vec::new(),
            persisted: false,
            changes: ReplaceSummary::default(),
            declined: Vec::new(),
            upstream_error: None,
        };

        let mut rows = Vec::new();
        if !candidates.is_empty() {
            let sources: BTreeSet<WorldDataSource> = candidates
                .iter()
                .map(|candidate| candidate.classifier.source())
                .collect();
            let query = WorldDataQuery {
                point: location.geom,
                date,
                sources: sources.into_iter().collect(),
            };

            let response = match self.world_data.location_bulk(&[query]).await {
                Ok(mut responses) => responses.remove(&0),
                Err(err) => {
                    warn!(
                        location_id = %location.id,
                        %date,
                        error = %err,
                        "world data unavailable; returning manual conditions only"
                    );
                    outcome.upstream_error = Some(err.to_string());
                    outcome.conditions = conditions;
                    return Ok(outcome);
                }
            };
            let Some(response) = response else {
                warn!(location_id = %location.id, %date, "world data response missing for query");
                outcome.upstream_error = Some("world data response missing for query".to_string());
                outcome.conditions = conditions;
                return Ok(outcome);
            };

            for candidate in candidates {
                tokio::task::yield_now().await;
                let handle_code = candidate.library.handle_code.clone();
                match candidate.classifier.classify(&candidate.library, &response) {
                    Ok(result) if result.condition_applies => {
                        rows.push(EvaluatedRow {
                            library_site_condition_id: candidate.library.id,
                            multiplier: result.multiplier,
                            alert: result.alert,
                            details: json!({
                                "handle_code": handle_code,
                                "value": result.value,
                            }),
                        });
                        conditions.push(EvaluatedCondition {
                            library: candidate.library,
                            result,
                            manual: false,
                        });
                    }
                    Ok(_) => {}
                    Err(ClassifierError::Missing(missing)) => {
                        info!(
                            location_id = %location.id,
                            handle_code = %handle_code,
                            section = %missing.0,
                            "section not found; classifier declined"
                        );
                        outcome.declined.push(DeclinedCondition {
                            handle_code,
                            reason: missing.to_string(),
                        });
                    }
                    Err(err) => {
                        warn!(
                            location_id = %location.id,
                            handle_code = %handle_code,
                            error = %err,
                            "classifier failed; skipping"
                        );
                        outcome.declined.push(DeclinedCondition {
                            handle_code,
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }

        tokio::task::yield_now().await;
        outcome.changes = self.persist(location.id, date, &rows)?;
        outcome.persisted = true;
        outcome.conditions = conditions;
        info!(
            location_id = %location.id,
            %date,
            applying = outcome.conditions.len(),
            declined = outcome.declined.len(),
            changed = outcome.changes.changed(),
            "site conditions evaluated"
        );
        Ok(outcome)
    }

    fn persist(
        &self,
        location_id: LocationId,
        date: NaiveDate,
        rows: &[EvaluatedRow],
    ) -> Result<ReplaceSummary, SiteConditionError> {
        match self.repository.replace_evaluated(location_id, date, rows) {
            Err(RepositoryError::Conflict(reason)) => {
                warn!(%location_id, %date, %reason, "evaluated replace conflicted; retrying once");
                match self.repository.replace_evaluated(location_id, date, rows) {
                    Err(RepositoryError::Conflict(_)) => {
                        Err(SiteConditionError::Conflict { location_id, date })
                    }
                    other => Ok(other?),
                }
            }
            other => Ok(other?),
        }
    }
}
