use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use super::query::{
    allows, matches_search, paginate, LocationRanking, RankingPage, RankingQuery, TaskRanking,
    WorkPackageRanking,
};
use super::{
    derive_level, LevelInputs, MetricReading, RecalculationWindow, RiskLevel, ThresholdRegistry,
};
use crate::domain::{
    Activity, Location, LocationId, Task, TaskId, TenantId, User, UserId, WorkPackage,
    WorkPackageId,
};
use crate::error::RepositoryError;
use crate::metrics::{MetricError, MetricKind, RiskMetricRepository, RiskMetricStore};
use crate::projects::ProjectRepository;

#[derive(Debug, thiserror::Error)]
pub enum RankingError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error(transparent)]
    Metric(#[from] MetricError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RankingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Metric(err) => err.code(),
            Self::Repository(err) => err.code(),
        }
    }
}

/// Level plus the value it was banded from, if one was stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskProjection {
    pub level: RiskLevel,
    pub ordinal: u8,
    pub value: Option<f64>,
}

impl RiskProjection {
    fn new(level: RiskLevel, reading: MetricReading) -> Self {
        let value = match reading {
            MetricReading::Value(value) => Some(value),
            MetricReading::Missing | MetricReading::NotAvailableForDate => None,
        };
        Self {
            level,
            ordinal: level.ordinal(),
            value,
        }
    }
}

/// Everything one tenant-wide ranking needs, loaded once per query.
struct TenantSnapshot {
    work_packages: HashMap<WorkPackageId, WorkPackage>,
    locations: Vec<Location>,
    activities: HashMap<LocationId, Vec<Activity>>,
    users: HashMap<UserId, User>,
}

impl TenantSnapshot {
    fn location_has_active_tasks(&self, location_id: LocationId, date: NaiveDate) -> bool {
        self.activities
            .get(&location_id)
            .map_or(false, |activities| {
                activities.iter().any(|activity| activity.is_active_on(date))
            })
    }

    fn location_valid_on(&self, location: &Location, date: NaiveDate) -> bool {
        match location.work_package_id {
            Some(id) => self
                .work_packages
                .get(&id)
                .map_or(false, |work_package| work_package.is_valid_on(date)),
            None => true,
        }
    }

    fn work_package_locations(&self, id: WorkPackageId) -> impl Iterator<Item = &Location> {
        self.locations
            .iter()
            .filter(move |location| location.work_package_id == Some(id))
    }
}

/// Read-only projection of stored scores into risk levels.
pub struct RiskRankingProjector<P, M> {
    projects: Arc<P>,
    metrics: RiskMetricStore<M>,
    thresholds: Arc<ThresholdRegistry>,
    horizon_days: i64,
}

impl<P, M> RiskRankingProjector<P, M>
where
    P: ProjectRepository,
    M: RiskMetricRepository,
{
    pub fn new(
        projects: Arc<P>,
        metrics: RiskMetricStore<M>,
        thresholds: Arc<ThresholdRegistry>,
        horizon_days: i64,
    ) -> Self {
        Self {
            projects,
            metrics,
            thresholds,
            horizon_days,
        }
    }

    pub fn window(&self, today: NaiveDate) -> RecalculationWindow {
        RecalculationWindow::new(today, self.horizon_days)
    }

    fn snapshot(&self, tenant_id: TenantId) -> Result<TenantSnapshot, RankingError> {
        let work_packages = self
            .projects
            .work_packages(tenant_id)?
            .into_iter()
            .filter(|work_package| work_package.archived_at.is_none())
            .map(|work_package| (work_package.id, work_package))
            .collect();
        let locations = self
            .projects
            .locations(tenant_id)?
            .into_iter()
            .filter(|location| !location.is_archived())
            .collect();
        let mut activities: HashMap<LocationId, Vec<Activity>> = HashMap::new();
        for activity in self.projects.activities(tenant_id)? {
            activities
                .entry(activity.location_id)
                .or_default()
                .push(activity);
        }
        let users = self
            .projects
            .users(tenant_id)?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();
        Ok(TenantSnapshot {
            work_packages,
            locations,
            activities,
            users,
        })
    }

    fn project(
        &self,
        tenant_id: TenantId,
        kind: MetricKind,
        inputs: LevelInputs,
        window: &RecalculationWindow,
    ) -> RiskProjection {
        let thresholds = self.thresholds.resolve(tenant_id, kind);
        let level = derive_level(inputs, window, &thresholds);
        RiskProjection::new(level, inputs.reading)
    }

    pub fn location_level(
        &self,
        location_id: LocationId,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<RiskProjection, RankingError> {
        let location = self
            .projects
            .location(location_id)?
            .ok_or(RankingError::NotFound {
                entity: "location",
                id: location_id.0,
            })?;
        let window = self.window(today);
        let reading = self.single_reading(MetricKind::LocationTotal, location_id.0, date, &window)?;
        let valid = match location.work_package_id {
            Some(id) => self
                .projects
                .work_package(id)?
                .map_or(false, |work_package| work_package.is_valid_on(date)),
            None => true,
        };
        let active = self
            .projects
            .activities(location.tenant_id)?
            .iter()
            .any(|activity| activity.location_id == location_id && activity.is_active_on(date));
        Ok(self.project(
            location.tenant_id,
            MetricKind::LocationTotal,
            LevelInputs {
                reading,
                valid_on_date: valid && !location.is_archived(),
                has_active_tasks: active,
                date,
            },
            &window,
        ))
    }

    pub fn work_package_level(
        &self,
        work_package_id: WorkPackageId,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<RiskProjection, RankingError> {
        let work_package =
            self.projects
                .work_package(work_package_id)?
                .ok_or(RankingError::NotFound {
                    entity: "work package",
                    id: work_package_id.0,
                })?;
        let snapshot = self.snapshot(work_package.tenant_id)?;
        let window = self.window(today);
        let reading = self.single_reading(
            MetricKind::WorkPackageTotal,
            work_package_id.0,
            date,
            &window,
        )?;
        let active = snapshot
            .work_package_locations(work_package_id)
            .any(|location| snapshot.location_has_active_tasks(location.id, date));
        Ok(self.project(
            work_package.tenant_id,
            MetricKind::WorkPackageTotal,
            LevelInputs {
                reading,
                valid_on_date: work_package.archived_at.is_none() && work_package.is_valid_on(date),
                has_active_tasks: active,
                date,
            },
            &window,
        ))
    }

    /// Task ranking uses the task's own dates for both guards.
    pub fn task_level(
        &self,
        task_id: TaskId,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<RiskProjection, RankingError> {
        let task = self.projects.task(task_id)?.ok_or(RankingError::NotFound {
            entity: "task",
            id: task_id.0,
        })?;
        let window = self.window(today);
        let reading = self.single_reading(MetricKind::TaskSpecific, task_id.0, date, &window)?;
        Ok(self.task_projection(&task, reading, date, &window))
    }

    fn task_projection(
        &self,
        task: &Task,
        reading: MetricReading,
        date: NaiveDate,
        window: &RecalculationWindow,
    ) -> RiskProjection {
        let valid = task.start_date <= date && date <= task.end_date;
        self.project(
            task.tenant_id,
            MetricKind::TaskSpecific,
            LevelInputs {
                reading,
                valid_on_date: valid,
                has_active_tasks: task.is_active_on(date),
                date,
            },
            window,
        )
    }

    fn single_reading(
        &self,
        kind: MetricKind,
        entity_id: Uuid,
        date: NaiveDate,
        window: &RecalculationWindow,
    ) -> Result<MetricReading, RankingError> {
        let readings = self.metrics.readings(kind, &[entity_id], date, window)?;
        Ok(readings
            .get(&entity_id)
            .copied()
            .unwrap_or(MetricReading::Missing))
    }

    pub fn rank_locations(
        &self,
        query: &RankingQuery,
        today: NaiveDate,
    ) -> Result<RankingPage<LocationRanking>, RankingError> {
        let snapshot = self.snapshot(query.tenant_id)?;
        let window = self.window(today);
        let ids: Vec<Uuid> = snapshot.locations.iter().map(|location| location.id.0).collect();
        let readings =
            self.metrics
                .readings(MetricKind::LocationTotal, &ids, query.date, &window)?;

        let filters = &query.filters;
        let needle = filters.needle();
        let mut rows = Vec::new();
        for location in &snapshot.locations {
            let work_package = location
                .work_package_id
                .and_then(|id| snapshot.work_packages.get(&id));
            let reading = readings
                .get(&location.id.0)
                .copied()
                .unwrap_or(MetricReading::Missing);
            let projection = self.project(
                query.tenant_id,
                MetricKind::LocationTotal,
                LevelInputs {
                    reading,
                    valid_on_date: snapshot.location_valid_on(location, query.date),
                    has_active_tasks: snapshot.location_has_active_tasks(location.id, query.date),
                    date: query.date,
                },
                &window,
            );

            if !filters.accepts_level(projection.level) {
                continue;
            }
            if let Some(bbox) = &filters.bbox {
                if !bbox.contains(&location.geom) {
                    continue;
                }
            }
            if !work_package_filters_pass(filters, work_package, location) {
                continue;
            }

            let supervisor_name = location
                .supervisor_id
                .and_then(|id| snapshot.users.get(&id))
                .map(|user| user.name.clone());
            if let Some(needle) = &needle {
                let mut haystacks = vec![location.name.as_str(), projection.level.name()];
                if let Some(work_package) = work_package {
                    haystacks.push(work_package.name.as_str());
                    if let Some(kind) = work_package.work_package_type.as_deref() {
                        haystacks.push(kind);
                    }
                    haystacks.extend(work_package.work_types.iter().map(|wt| wt.name.as_str()));
                }
                if let Some(name) = supervisor_name.as_deref() {
                    haystacks.push(name);
                }
                if !matches_search(needle, haystacks) {
                    continue;
                }
            }

            rows.push(LocationRanking {
                location_id: location.id,
                name: location.name.clone(),
                work_package_id: location.work_package_id,
                work_package_name: work_package.map(|work_package| work_package.name.clone()),
                supervisor_name,
                risk_level: projection.level,
                risk_level_ordinal: projection.ordinal,
                metric_value: projection.value,
            });
        }

        Ok(paginate(rows, query.order, query.pagination))
    }

    pub fn rank_work_packages(
        &self,
        query: &RankingQuery,
        today: NaiveDate,
    ) -> Result<RankingPage<WorkPackageRanking>, RankingError> {
        let snapshot = self.snapshot(query.tenant_id)?;
        let window = self.window(today);
        let ids: Vec<Uuid> = snapshot.work_packages.keys().map(|id| id.0).collect();
        let readings =
            self.metrics
                .readings(MetricKind::WorkPackageTotal, &ids, query.date, &window)?;

        let filters = &query.filters;
        let needle = filters.needle();
        let mut rows = Vec::new();
        for work_package in snapshot.work_packages.values() {
            let reading = readings
                .get(&work_package.id.0)
                .copied()
                .unwrap_or(MetricReading::Missing);
            let active = snapshot
                .work_package_locations(work_package.id)
                .any(|location| snapshot.location_has_active_tasks(location.id, query.date));
            let projection = self.project(
                query.tenant_id,
                MetricKind::WorkPackageTotal,
                LevelInputs {
                    reading,
                    valid_on_date: work_package.is_valid_on(query.date),
                    has_active_tasks: active,
                    date: query.date,
                },
                &window,
            );

            if !filters.accepts_level(projection.level) {
                continue;
            }
            if let Some(bbox) = &filters.bbox {
                let inside = snapshot
                    .work_package_locations(work_package.id)
                    .any(|location| bbox.contains(&location.geom));
                if !inside {
                    continue;
                }
            }
            if !allows(&filters.work_package_ids, Some(&work_package.id))
                || !catalog_filters_pass(filters, work_package)
            {
                continue;
            }
            if let Some(needle) = &needle {
                let mut haystacks = vec![work_package.name.as_str(), projection.level.name()];
                if let Some(kind) = work_package.work_package_type.as_deref() {
                    haystacks.push(kind);
                }
                haystacks.extend(work_package.work_types.iter().map(|wt| wt.name.as_str()));
                if !matches_search(needle, haystacks) {
                    continue;
                }
            }

            rows.push(WorkPackageRanking {
                work_package_id: work_package.id,
                name: work_package.name.clone(),
                risk_level: projection.level,
                risk_level_ordinal: projection.ordinal,
                metric_value: projection.value,
            });
        }

        Ok(paginate(rows, query.order, query.pagination))
    }

    /// Non-archived tasks at a location, highest risk first.
    pub fn rank_tasks_for_location(
        &self,
        location_id: LocationId,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Vec<TaskRanking>, RankingError> {
        let location = self
            .projects
            .location(location_id)?
            .ok_or(RankingError::NotFound {
                entity: "location",
                id: location_id.0,
            })?;
        let tasks: Vec<Task> = self
            .projects
            .tasks(location.tenant_id)?
            .into_iter()
            .filter(|task| task.location_id == location_id && task.archived_at.is_none())
            .collect();
        let window = self.window(today);
        let ids: Vec<Uuid> = tasks.iter().map(|task| task.id.0).collect();
        let readings = self
            .metrics
            .readings(MetricKind::TaskSpecific, &ids, date, &window)?;

        let mut rows: Vec<TaskRanking> = tasks
            .iter()
            .map(|task| {
                let reading = readings
                    .get(&task.id.0)
                    .copied()
                    .unwrap_or(MetricReading::Missing);
                let projection = self.task_projection(task, reading, date, &window);
                TaskRanking {
                    task_id: task.id,
                    location_id,
                    risk_level: projection.level,
                    risk_level_ordinal: projection.ordinal,
                    metric_value: projection.value,
                }
            })
            .collect();
        rows.sort_by(|left, right| {
            right
                .risk_level_ordinal
                .cmp(&left.risk_level_ordinal)
                .then_with(|| left.task_id.cmp(&right.task_id))
        });
        Ok(rows)
    }
}

fn catalog_filters_pass(filters: &super::RankingFilters, work_package: &WorkPackage) -> bool {
    allows(&filters.region_ids, work_package.region_id.as_ref())
        && allows(&filters.division_ids, work_package.division_id.as_ref())
        && allows(&filters.contractor_ids, work_package.contractor_id.as_ref())
        && (filters.work_type_ids.is_empty()
            || work_package
                .work_types
                .iter()
                .any(|work_type| filters.work_type_ids.contains(&work_type.id)))
}

fn work_package_filters_pass(
    filters: &super::RankingFilters,
    work_package: Option<&WorkPackage>,
    location: &Location,
) -> bool {
    if !allows(&filters.work_package_ids, location.work_package_id.as_ref()) {
        return false;
    }
    let catalog_filtered = !(filters.region_ids.is_empty()
        && filters.division_ids.is_empty()
        && filters.contractor_ids.is_empty()
        && filters.work_type_ids.is_empty());
    match work_package {
        Some(work_package) => catalog_filters_pass(filters, work_package),
        None => !catalog_filtered,
    }
}
