//! Decides when locations are re-evaluated and keeps evaluations for the same
//! `(location, date)` from overlapping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clustering::ClusterIndex;
use crate::domain::{Location, LocationId, TenantId};
use crate::error::RepositoryError;
use crate::projects::ProjectRepository;
use crate::ranking::{RiskEvent, RiskEventSink};
use crate::site_conditions::{
    EvaluationOutcome, SiteConditionError, SiteConditionRepository, SiteConditionsEngine,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    LocationCreated,
    GeometryChanged,
    Explicit,
    LibraryChanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationRun {
    /// `runs > 1` when triggers arrived while the evaluation was in flight.
    Completed {
        outcome: EvaluationOutcome,
        runs: usize,
    },
    /// Another evaluation of the same key was running; it re-runs instead.
    Coalesced,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryChangeReport {
    pub evaluated: usize,
    pub coalesced: usize,
    pub failed: Vec<LocationId>,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("location {0} not found")]
    LocationNotFound(LocationId),
    #[error(transparent)]
    SiteConditions(#[from] SiteConditionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl OrchestratorError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::LocationNotFound(_) => "NOT_FOUND",
            Self::SiteConditions(err) => err.code(),
            Self::Repository(err) => err.code(),
        }
    }
}

type SlotKey = (LocationId, NaiveDate);

/// Presence of a key means an evaluation is running; `true` means another
/// trigger arrived meanwhile.
type Slots = Mutex<HashMap<SlotKey, bool>>;

fn claim_slot(slots: &Slots, key: SlotKey) -> Option<SlotGuard<'_>> {
    let mut held = slots.lock().expect("orchestrator mutex poisoned");
    if let Some(pending) = held.get_mut(&key) {
        *pending = true;
        return None;
    }
    held.insert(key, false);
    Some(SlotGuard {
        slots,
        key,
        released: false,
    })
}

/// Releases the slot even if the evaluating future is dropped mid-way.
struct SlotGuard<'a> {
    slots: &'a Slots,
    key: SlotKey,
    released: bool,
}

impl SlotGuard<'_> {
    /// Either owes another run (pending flag cleared, slot kept) or releases
    /// the slot. Both happen under one lock so no trigger slips in between.
    fn release_or_rerun(&mut self) -> bool {
        let mut slots = self.slots.lock().expect("orchestrator mutex poisoned");
        if let Some(pending) = slots.get_mut(&self.key) {
            if std::mem::replace(pending, false) {
                return true;
            }
        }
        slots.remove(&self.key);
        self.released = true;
        false
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(&self.key);
        }
    }
}

pub struct EvaluationOrchestrator<S, P> {
    engine: Arc<SiteConditionsEngine<S>>,
    projects: Arc<P>,
    clusters: Arc<ClusterIndex>,
    events: Arc<dyn RiskEventSink>,
    slots: Slots,
}

impl<S, P> EvaluationOrchestrator<S, P>
where
    S: SiteConditionRepository + 'static,
    P: ProjectRepository,
{
    pub fn new(
        engine: Arc<SiteConditionsEngine<S>>,
        projects: Arc<P>,
        clusters: Arc<ClusterIndex>,
        events: Arc<dyn RiskEventSink>,
    ) -> Self {
        Self {
            engine,
            projects,
            clusters,
            events,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<SiteConditionsEngine<S>> {
        &self.engine
    }

    pub fn clusters(&self) -> &Arc<ClusterIndex> {
        &self.clusters
    }

    fn emit(&self, event: RiskEvent) {
        if let Err(err) = self.events.emit(event.clone()) {
            warn!(?event, error = %err, "failed to emit risk event");
        }
    }

    /// Evaluates the location as currently stored. A trigger arriving while
    /// the same key is running folds into one more run of the holder.
    pub async fn evaluate(
        &self,
        location_id: LocationId,
        date: NaiveDate,
        trigger: Trigger,
    ) -> Result<EvaluationRun, OrchestratorError> {
        let Some(mut guard) = claim_slot(&self.slots, (location_id, date)) else {
            debug!(%location_id, %date, ?trigger, "evaluation in flight; coalesced");
            return Ok(EvaluationRun::Coalesced);
        };

        let mut runs = 0;
        loop {
            runs += 1;
            let location = self
                .projects
                .location(location_id)?
                .filter(|location| !location.is_archived())
                .ok_or(OrchestratorError::LocationNotFound(location_id))?;
            let outcome = self.engine.evaluate_location(&location, date).await?;

            if guard.release_or_rerun() {
                debug!(%location_id, %date, runs, "re-running coalesced evaluation");
                continue;
            }

            if outcome.persisted {
                self.emit(RiskEvent::ProjectLocationSiteConditionsChanged {
                    tenant_id: location.tenant_id,
                    location_id,
                    date,
                });
            }
            info!(
                %location_id,
                %date,
                ?trigger,
                runs,
                persisted = outcome.persisted,
                "evaluation finished"
            );
            return Ok(EvaluationRun::Completed { outcome, runs });
        }
    }

    pub async fn reevaluate(
        &self,
        location_id: LocationId,
        date: NaiveDate,
    ) -> Result<EvaluationRun, OrchestratorError> {
        self.evaluate(location_id, date, Trigger::Explicit).await
    }

    /// Indexes a freshly written location and evaluates it for `date`.
    pub async fn location_created(
        &self,
        location: &Location,
        date: NaiveDate,
    ) -> Result<EvaluationRun, OrchestratorError> {
        self.clusters
            .cluster_batch(location.tenant_id, std::slice::from_ref(location), &[], &[]);
        self.emit(RiskEvent::LocationChanged {
            tenant_id: location.tenant_id,
            location_id: location.id,
        });
        self.evaluate(location.id, date, Trigger::LocationCreated).await
    }

    /// Re-indexes an updated location; only a geometry change re-evaluates.
    pub async fn location_updated(
        &self,
        before: &Location,
        after: &Location,
        date: NaiveDate,
    ) -> Result<Option<EvaluationRun>, OrchestratorError> {
        self.clusters
            .cluster_batch(after.tenant_id, &[], std::slice::from_ref(after), &[]);
        if before.geom == after.geom || after.is_archived() {
            return Ok(None);
        }
        self.emit(RiskEvent::LocationChanged {
            tenant_id: after.tenant_id,
            location_id: after.id,
        });
        self.evaluate(after.id, date, Trigger::GeometryChanged)
            .await
            .map(Some)
    }

    pub fn location_archived(&self, tenant_id: TenantId, location_id: LocationId) {
        self.clusters.cluster_batch(tenant_id, &[], &[], &[location_id]);
    }

    /// Re-evaluates every live location of the tenant after a library
    /// change. Failures are collected, not fatal.
    pub async fn library_changed(
        &self,
        tenant_id: TenantId,
        date: NaiveDate,
    ) -> Result<LibraryChangeReport, OrchestratorError> {
        self.engine.catalog().invalidate(tenant_id);
        let locations = self.projects.locations(tenant_id)?;
        let mut report = LibraryChangeReport::default();

        for location in locations.iter().filter(|location| !location.is_archived()) {
            match self
                .evaluate(location.id, date, Trigger::LibraryChanged)
                .await
            {
                Ok(EvaluationRun::Completed { .. }) => report.evaluated += 1,
                Ok(EvaluationRun::Coalesced) => report.coalesced += 1,
                Err(err) => {
                    warn!(
                        location_id = %location.id,
                        error = %err,
                        "library change evaluation failed"
                    );
                    report.failed.push(location.id);
                }
            }
        }
        info!(
            %tenant_id,
            %date,
            evaluated = report.evaluated,
            coalesced = report.coalesced,
            failed = report.failed.len(),
            "library change batch finished"
        );
        Ok(report)
    }
}
