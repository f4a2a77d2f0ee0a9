//! Relational domain model shared by the engines.

pub mod geo;
pub mod ids;
pub mod library;
pub mod project;
pub mod site_condition;

pub use geo::{BoundingBox, GeoError, GeoPoint};
pub use ids::{
    ActivityId, ContractorId, ControlId, DailyReportId, DivisionId, HazardId, LibraryControlId,
    LibraryHazardId, LibrarySiteConditionId, LibraryTaskId, LocationId, RegionId,
    SiteConditionId, TaskId, TenantId, UserId, WorkPackageId, WorkTypeId,
};
pub use library::{
    AuditEventDiff, LibraryControl, LibraryHazard, LibrarySiteCondition, LibraryTask,
    Recommendation, RecommendationSubject, ReportHazardControl,
};
pub use project::{
    Activity, ActivityStatus, DailyReport, DailyReportStatus, Location, Task, TaskStatus, User,
    WorkPackage, WorkPackageStatus, WorkTypeRef,
};
pub use site_condition::{SiteCondition, SiteConditionOrigin};
