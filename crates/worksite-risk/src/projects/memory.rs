use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::{LocationArchiveSummary, ProjectRepository};
use crate::domain::{
    Activity, ActivityId, DailyReport, DailyReportId, DailyReportStatus, Location, LocationId,
    Task, TaskId, TenantId, User, UserId, WorkPackage, WorkPackageId,
};
use crate::error::RepositoryError;

#[derive(Debug, Default)]
struct Tables {
    work_packages: HashMap<WorkPackageId, WorkPackage>,
    locations: HashMap<LocationId, Location>,
    activities: HashMap<ActivityId, Activity>,
    tasks: HashMap<TaskId, Task>,
    users: HashMap<UserId, User>,
    daily_reports: HashMap<DailyReportId, DailyReport>,
}

/// Relational stand-in honoring the per-tenant external-key and
/// `(activity, library_task)` unique indexes.
#[derive(Debug, Default)]
pub struct InMemoryProjectRepository {
    tables: Mutex<Tables>,
}

fn external_key_taken<'a, I>(
    rows: I,
    tenant_id: TenantId,
    key: Option<&str>,
    own_id: uuid::Uuid,
) -> bool
where
    I: IntoIterator<Item = (TenantId, Option<&'a str>, uuid::Uuid)>,
{
    let Some(key) = key else {
        return false;
    };
    rows.into_iter()
        .any(|(tenant, existing, id)| tenant == tenant_id && existing == Some(key) && id != own_id)
}

impl InMemoryProjectRepository {
    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("project mutex poisoned")
    }

    fn check_location_key(tables: &Tables, location: &Location) -> Result<(), RepositoryError> {
        let rows = tables.locations.values().map(|row| {
            (row.tenant_id, row.external_key.as_deref(), row.id.0)
        });
        if external_key_taken(
            rows,
            location.tenant_id,
            location.external_key.as_deref(),
            location.id.0,
        ) {
            return Err(RepositoryError::Conflict(
                "locations (tenant_id, external_key)".to_string(),
            ));
        }
        Ok(())
    }

    fn check_activity_key(tables: &Tables, activity: &Activity) -> Result<(), RepositoryError> {
        let rows = tables.activities.values().map(|row| {
            (row.tenant_id, row.external_key.as_deref(), row.id.0)
        });
        if external_key_taken(
            rows,
            activity.tenant_id,
            activity.external_key.as_deref(),
            activity.id.0,
        ) {
            return Err(RepositoryError::Conflict(
                "activities (tenant_id, external_key)".to_string(),
            ));
        }
        Ok(())
    }

    fn check_work_package_key(
        tables: &Tables,
        work_package: &WorkPackage,
    ) -> Result<(), RepositoryError> {
        let rows = tables.work_packages.values().map(|row| {
            (row.tenant_id, row.external_key.as_deref(), row.id.0)
        });
        if external_key_taken(
            rows,
            work_package.tenant_id,
            work_package.external_key.as_deref(),
            work_package.id.0,
        ) {
            return Err(RepositoryError::Conflict(
                "work_packages (tenant_id, external_key)".to_string(),
            ));
        }
        Ok(())
    }
}

impl ProjectRepository for InMemoryProjectRepository {
    fn location(&self, id: LocationId) -> Result<Option<Location>, RepositoryError> {
        Ok(self.lock().locations.get(&id).cloned())
    }

    fn locations(&self, tenant_id: TenantId) -> Result<Vec<Location>, RepositoryError> {
        Ok(self
            .lock()
            .locations
            .values()
            .filter(|location| location.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn insert_location(&self, location: Location) -> Result<Location, RepositoryError> {
        let mut tables = self.lock();
        if tables.locations.contains_key(&location.id) {
            return Err(RepositoryError::Conflict(format!("location {}", location.id)));
        }
        Self::check_location_key(&tables, &location)?;
        tables.locations.insert(location.id, location.clone());
        Ok(location)
    }

    fn update_location(&self, location: Location) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if !tables.locations.contains_key(&location.id) {
            return Err(RepositoryError::NotFound);
        }
        Self::check_location_key(&tables, &location)?;
        tables.locations.insert(location.id, location);
        Ok(())
    }

    fn work_package(&self, id: WorkPackageId) -> Result<Option<WorkPackage>, RepositoryError> {
        Ok(self.lock().work_packages.get(&id).cloned())
    }

    fn work_packages(&self, tenant_id: TenantId) -> Result<Vec<WorkPackage>, RepositoryError> {
        Ok(self
            .lock()
            .work_packages
            .values()
            .filter(|work_package| work_package.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn insert_work_package(
        &self,
        work_package: WorkPackage,
    ) -> Result<WorkPackage, RepositoryError> {
        let mut tables = self.lock();
        if tables.work_packages.contains_key(&work_package.id) {
            return Err(RepositoryError::Conflict(format!(
                "work package {}",
                work_package.id
            )));
        }
        Self::check_work_package_key(&tables, &work_package)?;
        tables
            .work_packages
            .insert(work_package.id, work_package.clone());
        Ok(work_package)
    }

    fn update_work_package(&self, work_package: WorkPackage) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if !tables.work_packages.contains_key(&work_package.id) {
            return Err(RepositoryError::NotFound);
        }
        Self::check_work_package_key(&tables, &work_package)?;
        tables.work_packages.insert(work_package.id, work_package);
        Ok(())
    }

    fn activity(&self, id: ActivityId) -> Result<Option<Activity>, RepositoryError> {
        Ok(self.lock().activities.get(&id).cloned())
    }

    fn activities(&self, tenant_id: TenantId) -> Result<Vec<Activity>, RepositoryError> {
        Ok(self
            .lock()
            .activities
            .values()
            .filter(|activity| activity.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn insert_activity(&self, activity: Activity) -> Result<Activity, RepositoryError> {
        let mut tables = self.lock();
        if tables.activities.contains_key(&activity.id) {
            return Err(RepositoryError::Conflict(format!("activity {}", activity.id)));
        }
        Self::check_activity_key(&tables, &activity)?;
        tables.activities.insert(activity.id, activity.clone());
        Ok(activity)
    }

    fn update_activity(&self, activity: Activity) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if !tables.activities.contains_key(&activity.id) {
            return Err(RepositoryError::NotFound);
        }
        Self::check_activity_key(&tables, &activity)?;
        tables.activities.insert(activity.id, activity);
        Ok(())
    }

    fn task(&self, id: TaskId) -> Result<Option<Task>, RepositoryError> {
        Ok(self.lock().tasks.get(&id).cloned())
    }

    fn tasks(&self, tenant_id: TenantId) -> Result<Vec<Task>, RepositoryError> {
        Ok(self
            .lock()
            .tasks
            .values()
            .filter(|task| task.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn tasks_for_activity(&self, activity_id: ActivityId) -> Result<Vec<Task>, RepositoryError> {
        Ok(self
            .lock()
            .tasks
            .values()
            .filter(|task| task.activity_id == activity_id)
            .cloned()
            .collect())
    }

    fn insert_task(&self, task: Task) -> Result<Task, RepositoryError> {
        let mut tables = self.lock();
        let duplicate = tables.tasks.values().any(|existing| {
            existing.id == task.id
                || (existing.activity_id == task.activity_id
                    && existing.library_task_id == task.library_task_id)
        });
        if duplicate {
            return Err(RepositoryError::Conflict(
                "tasks (activity_id, library_task_id)".to_string(),
            ));
        }
        tables.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    fn update_task(&self, task: Task) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        match tables.tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn users(&self, tenant_id: TenantId) -> Result<Vec<User>, RepositoryError> {
        Ok(self
            .lock()
            .users
            .values()
            .filter(|user| user.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn insert_user(&self, user: User) -> Result<User, RepositoryError> {
        let mut tables = self.lock();
        if tables.users.contains_key(&user.id) {
            return Err(RepositoryError::Conflict(format!("user {}", user.id)));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn daily_reports_for_location(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<DailyReport>, RepositoryError> {
        Ok(self
            .lock()
            .daily_reports
            .values()
            .filter(|report| report.location_id == location_id)
            .cloned()
            .collect())
    }

    fn insert_daily_report(&self, report: DailyReport) -> Result<DailyReport, RepositoryError> {
        let mut tables = self.lock();
        if tables.daily_reports.contains_key(&report.id) {
            return Err(RepositoryError::Conflict(format!("daily report {}", report.id)));
        }
        tables.daily_reports.insert(report.id, report.clone());
        Ok(report)
    }

    fn archive_location(
        &self,
        location_id: LocationId,
        at: DateTime<Utc>,
    ) -> Result<LocationArchiveSummary, RepositoryError> {
        let mut tables = self.lock();
        let location = tables
            .locations
            .get_mut(&location_id)
            .ok_or(RepositoryError::NotFound)?;
        location.archived_at.get_or_insert(at);

        let mut summary = LocationArchiveSummary::default();
        for activity in tables
            .activities
            .values_mut()
            .filter(|activity| activity.location_id == location_id)
        {
            if activity.archived_at.is_none() {
                activity.archived_at = Some(at);
                summary.activities.push(activity.id);
            }
        }
        for task in tables
            .tasks
            .values_mut()
            .filter(|task| task.location_id == location_id)
        {
            if task.archived_at.is_none() {
                task.archived_at = Some(at);
                summary.tasks.push(task.id);
            }
        }
        for report in tables
            .daily_reports
            .values_mut()
            .filter(|report| report.location_id == location_id)
        {
            if report.archived_at.is_none() {
                report.archived_at = Some(at);
                report.status = DailyReportStatus::Archived;
                summary.daily_reports += 1;
            }
        }
        Ok(summary)
    }
}
