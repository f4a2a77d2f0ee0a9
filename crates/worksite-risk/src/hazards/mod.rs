//! Hazards and controls recorded against tasks and site conditions.

mod memory;
mod parent;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ControlId, HazardId, LibraryControlId, LibraryHazardId, SiteConditionId, TaskId, UserId,
};
use crate::error::RepositoryError;

pub use memory::InMemoryHazardStore;
pub use parent::{
    ControlEdit, EditSummary, HazardEdit, HazardError, HazardParent, HazardService,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ParentRef {
    Task(TaskId),
    SiteCondition(SiteConditionId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hazard {
    pub id: HazardId,
    pub parent: ParentRef,
    pub library_hazard_id: LibraryHazardId,
    pub is_applicable: bool,
    pub position: usize,
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub id: ControlId,
    pub hazard_id: HazardId,
    pub library_control_id: LibraryControlId,
    pub is_applicable: bool,
    pub position: usize,
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

pub trait HazardStore: Send + Sync {
    fn hazard(&self, id: HazardId) -> Result<Option<Hazard>, RepositoryError>;
    /// Live hazards of the parent ordered by position.
    fn hazards_for(&self, parent: ParentRef) -> Result<Vec<Hazard>, RepositoryError>;
    /// Live controls of the hazard ordered by position.
    fn controls_for(&self, hazard_id: HazardId) -> Result<Vec<Control>, RepositoryError>;
    fn insert_hazard(&self, hazard: Hazard) -> Result<Hazard, RepositoryError>;
    fn update_hazard(&self, hazard: Hazard) -> Result<(), RepositoryError>;
    fn insert_control(&self, control: Control) -> Result<Control, RepositoryError>;
    fn update_control(&self, control: Control) -> Result<(), RepositoryError>;
    /// Archives the parents' hazards together with their controls.
    fn archive_hazards(
        &self,
        parents: &[ParentRef],
        at: DateTime<Utc>,
    ) -> Result<Vec<HazardId>, RepositoryError>;
    fn archive_controls(
        &self,
        hazard_ids: &[HazardId],
        at: DateTime<Utc>,
    ) -> Result<Vec<ControlId>, RepositoryError>;
}
