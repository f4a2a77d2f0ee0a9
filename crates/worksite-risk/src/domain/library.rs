use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{
    DailyReportId, LibraryControlId, LibraryHazardId, LibrarySiteConditionId, LibraryTaskId,
};

/// Catalog entry naming a site-condition classifier through `handle_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibrarySiteCondition {
    pub id: LibrarySiteConditionId,
    pub handle_code: String,
    pub name: String,
    pub default_multiplier: f64,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl LibrarySiteCondition {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryHazard {
    pub id: LibraryHazardId,
    pub name: String,
    pub for_tasks: bool,
    pub for_site_conditions: bool,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryControl {
    pub id: LibraryControlId,
    pub name: String,
    pub for_tasks: bool,
    pub for_site_conditions: bool,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryTask {
    pub id: LibraryTaskId,
    pub name: String,
    pub category: Option<String>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

/// What a recommendation row hangs off: a library task or site condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RecommendationSubject {
    Task(LibraryTaskId),
    SiteCondition(LibrarySiteConditionId),
}

/// Unique on `(subject, library_hazard_id, library_control_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recommendation {
    pub subject: RecommendationSubject,
    pub library_hazard_id: LibraryHazardId,
    pub library_control_id: LibraryControlId,
}

/// Per-report hazard/control assignment; unique on the whole triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportHazardControl {
    pub report_id: DailyReportId,
    pub library_hazard_id: LibraryHazardId,
    pub library_control_id: LibraryControlId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEventDiff {
    pub id: uuid::Uuid,
    pub object_type: String,
    pub old_values: serde_json::Value,
    pub new_values: serde_json::Value,
}
