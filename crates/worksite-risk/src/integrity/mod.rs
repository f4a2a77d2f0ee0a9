//! Write-path invariants spanning several repositories: supervisor lists,
//! per-tenant external keys, date ranges, hazard edits, task re-creation and
//! the location archival cascade.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    Activity, DailyReportStatus, Location, LocationId, SiteConditionId, Task, UserId, WorkPackage,
};
use crate::error::RepositoryError;
use crate::hazards::{
    EditSummary, HazardEdit, HazardError, HazardParent, HazardService, HazardStore, ParentRef,
};
use crate::projects::ProjectRepository;
use crate::site_conditions::SiteConditionRepository;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum IntegrityError {
    #[error("Supervisor ID {0} duplicated")]
    SupervisorDuplicated(UserId),
    #[error("{entity} external key '{external_key}' is already used in this tenant")]
    DuplicateExternalKey {
        entity: &'static str,
        external_key: String,
    },
    #[error("{entity} {id} ends on {end} before it starts on {start}")]
    InvalidDateRange {
        entity: &'static str,
        id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("task {task_id} already uses this library task on the activity")]
    DuplicateTask { task_id: Uuid },
    #[error(
        "location {location_id} cannot be archived: {in_progress} daily report(s) in progress, {complete} complete"
    )]
    ArchiveBlocked {
        location_id: LocationId,
        in_progress: usize,
        complete: usize,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error(transparent)]
    Hazards(#[from] HazardError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl IntegrityError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SupervisorDuplicated(_)
            | Self::DuplicateTask { .. }
            | Self::ArchiveBlocked { .. } => "INTEGRITY_VIOLATION",
            Self::DuplicateExternalKey { .. } => "DUPLICATE_EXTERNAL_KEY",
            Self::InvalidDateRange { .. } => "VALIDATION",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Hazards(err) => err.code(),
            Self::Repository(err) => err.code(),
        }
    }
}

/// Outcome of [`IntegrityEnforcer::create_task`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskWrite {
    pub task: Task,
    pub unarchived: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    pub activities: usize,
    pub tasks: usize,
    pub daily_reports: usize,
    pub site_conditions: usize,
    pub hazards: usize,
}

pub fn check_supervisors(location: &Location) -> Result<(), IntegrityError> {
    let mut seen: HashSet<UserId> = location.supervisor_id.into_iter().collect();
    for id in &location.additional_supervisor_ids {
        if !seen.insert(*id) {
            return Err(IntegrityError::SupervisorDuplicated(*id));
        }
    }
    Ok(())
}

fn check_dates(
    entity: &'static str,
    id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(), IntegrityError> {
    if start > end {
        return Err(IntegrityError::InvalidDateRange {
            entity,
            id,
            start,
            end,
        });
    }
    Ok(())
}

fn check_external_key<I>(
    entity: &'static str,
    own_id: Uuid,
    external_key: Option<&str>,
    existing: I,
) -> Result<(), IntegrityError>
where
    I: IntoIterator<Item = (Uuid, Option<String>)>,
{
    let Some(external_key) = external_key else {
        return Ok(());
    };
    let taken = existing
        .into_iter()
        .any(|(id, key)| id != own_id && key.as_deref() == Some(external_key));
    if taken {
        return Err(IntegrityError::DuplicateExternalKey {
            entity,
            external_key: external_key.to_string(),
        });
    }
    Ok(())
}

/// Checks run before any row is written, so a rejected write leaves storage
/// untouched.
pub struct IntegrityEnforcer<P, S, H> {
    projects: Arc<P>,
    site_conditions: Arc<S>,
    hazards: Arc<HazardService<H>>,
}

impl<P, S, H> IntegrityEnforcer<P, S, H>
where
    P: ProjectRepository,
    S: SiteConditionRepository,
    H: HazardStore,
{
    pub fn new(projects: Arc<P>, site_conditions: Arc<S>, hazards: Arc<HazardService<H>>) -> Self {
        Self {
            projects,
            site_conditions,
            hazards,
        }
    }

    pub fn projects(&self) -> &Arc<P> {
        &self.projects
    }

    fn check_location(&self, location: &Location) -> Result<(), IntegrityError> {
        check_supervisors(location)?;
        let existing = self
            .projects
            .locations(location.tenant_id)?
            .into_iter()
            .map(|row| (row.id.0, row.external_key));
        check_external_key(
            "location",
            location.id.0,
            location.external_key.as_deref(),
            existing,
        )
    }

    pub fn create_location(&self, location: Location) -> Result<Location, IntegrityError> {
        self.check_location(&location)?;
        Ok(self.projects.insert_location(location)?)
    }

    pub fn update_location(&self, location: Location) -> Result<(), IntegrityError> {
        self.check_location(&location)?;
        Ok(self.projects.update_location(location)?)
    }

    fn check_work_package(&self, work_package: &WorkPackage) -> Result<(), IntegrityError> {
        check_dates(
            "work package",
            work_package.id.0,
            work_package.start_date,
            work_package.end_date,
        )?;
        let existing = self
            .projects
            .work_packages(work_package.tenant_id)?
            .into_iter()
            .map(|row| (row.id.0, row.external_key));
        check_external_key(
            "work package",
            work_package.id.0,
            work_package.external_key.as_deref(),
            existing,
        )
    }

    pub fn create_work_package(
        &self,
        work_package: WorkPackage,
    ) -> Result<WorkPackage, IntegrityError> {
        self.check_work_package(&work_package)?;
        Ok(self.projects.insert_work_package(work_package)?)
    }

    pub fn update_work_package(&self, work_package: WorkPackage) -> Result<(), IntegrityError> {
        self.check_work_package(&work_package)?;
        Ok(self.projects.update_work_package(work_package)?)
    }

    fn check_activity(&self, activity: &Activity) -> Result<(), IntegrityError> {
        check_dates(
            "activity",
            activity.id.0,
            activity.start_date,
            activity.end_date,
        )?;
        if self.projects.location(activity.location_id)?.is_none() {
            return Err(IntegrityError::NotFound {
                entity: "location",
                id: activity.location_id.0,
            });
        }
        let existing = self
            .projects
            .activities(activity.tenant_id)?
            .into_iter()
            .map(|row| (row.id.0, row.external_key));
        check_external_key(
            "activity",
            activity.id.0,
            activity.external_key.as_deref(),
            existing,
        )
    }

    pub fn create_activity(&self, activity: Activity) -> Result<Activity, IntegrityError> {
        self.check_activity(&activity)?;
        Ok(self.projects.insert_activity(activity)?)
    }

    pub fn update_activity(&self, activity: Activity) -> Result<(), IntegrityError> {
        self.check_activity(&activity)?;
        Ok(self.projects.update_activity(activity)?)
    }

    /// Tasks take their tenant, location and dates from the owning activity.
    /// Re-creating an archived `(activity, library task)` pair revives the
    /// archived row instead of inserting a second one.
    pub fn create_task(&self, task: Task) -> Result<TaskWrite, IntegrityError> {
        let activity = self
            .projects
            .activity(task.activity_id)?
            .ok_or(IntegrityError::NotFound {
                entity: "activity",
                id: task.activity_id.0,
            })?;
        let task = Task {
            tenant_id: activity.tenant_id,
            location_id: activity.location_id,
            start_date: activity.start_date,
            end_date: activity.end_date,
            ..task
        };
        let existing = self
            .projects
            .tasks_for_activity(task.activity_id)?
            .into_iter()
            .find(|row| row.library_task_id == task.library_task_id);

        match existing {
            Some(row) if row.archived_at.is_none() => {
                Err(IntegrityError::DuplicateTask { task_id: row.id.0 })
            }
            Some(row) => {
                let revived = Task {
                    id: row.id,
                    archived_at: None,
                    ..task
                };
                self.projects.update_task(revived.clone())?;
                info!(
                    task_id = %revived.id,
                    activity_id = %revived.activity_id,
                    "archived task unarchived"
                );
                Ok(TaskWrite {
                    task: revived,
                    unarchived: true,
                })
            }
            None => Ok(TaskWrite {
                task: self.projects.insert_task(task)?,
                unarchived: false,
            }),
        }
    }

    pub fn edit_hazards<T: HazardParent>(
        &self,
        parent: &T,
        edits: &[HazardEdit],
        user_id: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<EditSummary, IntegrityError> {
        Ok(self.hazards.apply_edits(parent, edits, user_id, at)?)
    }

    /// Archives the location and everything hanging off it. Live daily
    /// reports block the whole cascade.
    pub fn archive_location(
        &self,
        location_id: LocationId,
        at: DateTime<Utc>,
    ) -> Result<ArchiveReport, IntegrityError> {
        if self.projects.location(location_id)?.is_none() {
            return Err(IntegrityError::NotFound {
                entity: "location",
                id: location_id.0,
            });
        }

        let reports = self.projects.daily_reports_for_location(location_id)?;
        let live = |status: DailyReportStatus| {
            reports
                .iter()
                .filter(|report| report.archived_at.is_none() && report.status == status)
                .count()
        };
        let in_progress = live(DailyReportStatus::InProgress);
        let complete = live(DailyReportStatus::Complete);
        if in_progress + complete > 0 {
            warn!(
                %location_id,
                in_progress,
                complete,
                "location archival blocked by daily reports"
            );
            return Err(IntegrityError::ArchiveBlocked {
                location_id,
                in_progress,
                complete,
            });
        }

        let summary = self.projects.archive_location(location_id, at)?;
        let site_conditions: Vec<SiteConditionId> =
            self.site_conditions.archive_for_location(location_id, at)?;

        let parents: Vec<ParentRef> = summary
            .tasks
            .iter()
            .map(|id| ParentRef::Task(*id))
            .chain(site_conditions.iter().map(|id| ParentRef::SiteCondition(*id)))
            .collect();
        let hazards = self.hazards.store().archive_hazards(&parents, at)?;

        let report = ArchiveReport {
            activities: summary.activities.len(),
            tasks: summary.tasks.len(),
            daily_reports: summary.daily_reports,
            site_conditions: site_conditions.len(),
            hazards: hazards.len(),
        };
        info!(%location_id, ?report, "location archived");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GeoPoint, TenantId};

    #[test]
    fn supervisor_repeated_in_additional_list_is_named() {
        let supervisor = UserId::new();
        let location = Location {
            id: LocationId::new(),
            tenant_id: TenantId::new(),
            work_package_id: None,
            name: "Yard".to_string(),
            address: None,
            geom: GeoPoint::new(40.0, -74.0).unwrap(),
            risk: Default::default(),
            supervisor_id: Some(supervisor),
            additional_supervisor_ids: vec![UserId::new(), supervisor],
            external_key: None,
            archived_at: None,
        };
        let err = check_supervisors(&location).unwrap_err();
        assert_eq!(err.to_string(), format!("Supervisor ID {supervisor} duplicated"));
        assert_eq!(err.code(), "INTEGRITY_VIOLATION");
    }

    #[test]
    fn external_key_clash_ignores_own_row() {
        let own = Uuid::new_v4();
        let rows = vec![(own, Some("LOC-1".to_string()))];
        check_external_key("location", own, Some("LOC-1"), rows.clone()).unwrap();
        let err = check_external_key("location", Uuid::new_v4(), Some("LOC-1"), rows).unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_EXTERNAL_KEY");
    }
}
