//! Storage seam for the work-package graph (work packages, locations,
//! activities, tasks, daily reports, users).

mod memory;

use chrono::{DateTime, Utc};

use crate::domain::{
    Activity, ActivityId, DailyReport, Location, LocationId, Task, TaskId, TenantId, User,
    WorkPackage, WorkPackageId,
};
use crate::error::RepositoryError;

pub use memory::InMemoryProjectRepository;

/// Rows touched by a location archival cascade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationArchiveSummary {
    pub activities: Vec<ActivityId>,
    pub tasks: Vec<TaskId>,
    pub daily_reports: usize,
}

pub trait ProjectRepository: Send + Sync {
    fn location(&self, id: LocationId) -> Result<Option<Location>, RepositoryError>;
    fn locations(&self, tenant_id: TenantId) -> Result<Vec<Location>, RepositoryError>;
    fn insert_location(&self, location: Location) -> Result<Location, RepositoryError>;
    fn update_location(&self, location: Location) -> Result<(), RepositoryError>;

    fn work_package(&self, id: WorkPackageId) -> Result<Option<WorkPackage>, RepositoryError>;
    fn work_packages(&self, tenant_id: TenantId) -> Result<Vec<WorkPackage>, RepositoryError>;
    fn insert_work_package(&self, work_package: WorkPackage)
        -> Result<WorkPackage, RepositoryError>;
    fn update_work_package(&self, work_package: WorkPackage) -> Result<(), RepositoryError>;

    fn activity(&self, id: ActivityId) -> Result<Option<Activity>, RepositoryError>;
    fn activities(&self, tenant_id: TenantId) -> Result<Vec<Activity>, RepositoryError>;
    fn insert_activity(&self, activity: Activity) -> Result<Activity, RepositoryError>;
    fn update_activity(&self, activity: Activity) -> Result<(), RepositoryError>;

    fn task(&self, id: TaskId) -> Result<Option<Task>, RepositoryError>;
    fn tasks(&self, tenant_id: TenantId) -> Result<Vec<Task>, RepositoryError>;
    fn tasks_for_activity(&self, activity_id: ActivityId) -> Result<Vec<Task>, RepositoryError>;
    fn insert_task(&self, task: Task) -> Result<Task, RepositoryError>;
    fn update_task(&self, task: Task) -> Result<(), RepositoryError>;

    fn users(&self, tenant_id: TenantId) -> Result<Vec<User>, RepositoryError>;
    fn insert_user(&self, user: User) -> Result<User, RepositoryError>;

    fn daily_reports_for_location(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<DailyReport>, RepositoryError>;
    fn insert_daily_report(&self, report: DailyReport) -> Result<DailyReport, RepositoryError>;

    /// Archive the location with its activities, tasks and daily reports in
    /// one unit of work. Callers check report workflow states first.
    fn archive_location(
        &self,
        location_id: LocationId,
        at: DateTime<Utc>,
    ) -> Result<LocationArchiveSummary, RepositoryError>;
}
