use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::geo::GeoPoint;
use super::ids::{
    ActivityId, ContractorId, DailyReportId, DivisionId, LibraryTaskId, LocationId, RegionId,
    TaskId, TenantId, UserId, WorkPackageId, WorkTypeId,
};
use crate::ranking::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkPackageStatus {
    Pending,
    Active,
    Completed,
}

impl WorkPackageStatus {
    pub const fn ordered() -> [Self; 3] {
        [Self::Pending, Self::Active, Self::Completed]
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    NotStarted,
    InProgress,
    Complete,
    NotCompleted,
}

impl ActivityStatus {
    pub const fn ordered() -> [Self; 4] {
        [
            Self::NotStarted,
            Self::InProgress,
            Self::Complete,
            Self::NotCompleted,
        ]
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::NotCompleted => "not_completed",
        }
    }
}

/// Tasks share the activity lifecycle.
pub type TaskStatus = ActivityStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DailyReportStatus {
    InProgress,
    Complete,
    Archived,
}

impl DailyReportStatus {
    /// Reports in these states are part of a live workflow and block archival.
    pub const fn blocks_archival(self) -> bool {
        matches!(self, Self::InProgress | Self::Complete)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkTypeRef {
    pub id: WorkTypeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkPackage {
    pub id: WorkPackageId,
    pub tenant_id: TenantId,
    pub name: String,
    pub external_key: Option<String>,
    pub work_package_type: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: WorkPackageStatus,
    pub region_id: Option<RegionId>,
    pub division_id: Option<DivisionId>,
    pub contractor_id: Option<ContractorId>,
    pub work_types: Vec<WorkTypeRef>,
    pub assigned_user_ids: Vec<UserId>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl WorkPackage {
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub tenant_id: TenantId,
    pub work_package_id: Option<WorkPackageId>,
    pub name: String,
    pub address: Option<String>,
    pub geom: GeoPoint,
    pub risk: RiskLevel,
    pub supervisor_id: Option<UserId>,
    #[serde(default)]
    pub additional_supervisor_ids: Vec<UserId>,
    pub external_key: Option<String>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl Location {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ActivityStatus,
    pub crew: Option<String>,
    pub external_key: Option<String>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl Activity {
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.archived_at.is_none() && self.start_date <= date && date <= self.end_date
    }
}

/// Tasks inherit location and dates from their activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub tenant_id: TenantId,
    pub activity_id: ActivityId,
    pub location_id: LocationId,
    pub library_task_id: LibraryTaskId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: TaskStatus,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.archived_at.is_none() && self.start_date <= date && date <= self.end_date
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub id: DailyReportId,
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub date: NaiveDate,
    pub status: DailyReportStatus,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}
