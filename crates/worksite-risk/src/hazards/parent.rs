use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Control, Hazard, HazardStore, ParentRef};
use crate::domain::{
    ControlId, HazardId, LibraryControl, LibraryControlId, LibraryHazard, LibraryHazardId,
    Recommendation, RecommendationSubject, SiteCondition, Task, UserId,
};
use crate::error::RepositoryError;
use crate::library::LibraryRepository;

/// Something hazards and controls can be recorded against.
pub trait HazardParent {
    fn parent_ref(&self) -> ParentRef;
    fn recommendation_subject(&self) -> RecommendationSubject;
    fn accepts_hazard(hazard: &LibraryHazard) -> bool;
    fn accepts_control(control: &LibraryControl) -> bool;
}

impl HazardParent for Task {
    fn parent_ref(&self) -> ParentRef {
        ParentRef::Task(self.id)
    }

    fn recommendation_subject(&self) -> RecommendationSubject {
        RecommendationSubject::Task(self.library_task_id)
    }

    fn accepts_hazard(hazard: &LibraryHazard) -> bool {
        hazard.for_tasks
    }

    fn accepts_control(control: &LibraryControl) -> bool {
        control.for_tasks
    }
}

impl HazardParent for SiteCondition {
    fn parent_ref(&self) -> ParentRef {
        ParentRef::SiteCondition(self.id)
    }

    fn recommendation_subject(&self) -> RecommendationSubject {
        RecommendationSubject::SiteCondition(self.library_site_condition_id)
    }

    fn accepts_hazard(hazard: &LibraryHazard) -> bool {
        hazard.for_site_conditions
    }

    fn accepts_control(control: &LibraryControl) -> bool {
        control.for_site_conditions
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum HazardError {
    #[error("library hazard {0} listed more than once")]
    DuplicateHazard(LibraryHazardId),
    #[error("library control {control} listed more than once under hazard {hazard}")]
    DuplicateControl {
        hazard: LibraryHazardId,
        control: LibraryControlId,
    },
    #[error("hazard {0} does not belong to this parent")]
    ForeignHazard(HazardId),
    #[error("control {0} does not belong to the hazard it is listed under")]
    ForeignControl(ControlId),
    #[error("library hazard {0} does not exist")]
    MissingLibraryHazard(LibraryHazardId),
    #[error("library control {0} does not exist")]
    MissingLibraryControl(LibraryControlId),
    #[error("library hazard {0} cannot be used here")]
    HazardNotApplicable(LibraryHazardId),
    #[error("library control {0} cannot be used here")]
    ControlNotApplicable(LibraryControlId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl HazardError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateHazard(_)
            | Self::DuplicateControl { .. }
            | Self::ForeignHazard(_)
            | Self::ForeignControl(_) => "INTEGRITY_VIOLATION",
            Self::MissingLibraryHazard(_) | Self::MissingLibraryControl(_) => {
                "MISSING_DEPENDENCY"
            }
            Self::HazardNotApplicable(_) | Self::ControlNotApplicable(_) => "VALIDATION",
            Self::Repository(err) => err.code(),
        }
    }
}

/// Desired state of one hazard on a parent; `id` is `None` for new rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardEdit {
    pub id: Option<HazardId>,
    pub library_hazard_id: LibraryHazardId,
    pub is_applicable: bool,
    #[serde(default)]
    pub controls: Vec<ControlEdit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEdit {
    pub id: Option<ControlId>,
    pub library_control_id: LibraryControlId,
    pub is_applicable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSummary {
    pub hazards_created: usize,
    pub hazards_updated: usize,
    pub hazards_archived: usize,
    pub controls_created: usize,
    pub controls_updated: usize,
    pub controls_archived: usize,
}

/// Hazard and control operations shared by every [`HazardParent`].
pub struct HazardService<H> {
    store: Arc<H>,
    library: Arc<dyn LibraryRepository>,
}

impl<H> HazardService<H>
where
    H: HazardStore,
{
    pub fn new(store: Arc<H>, library: Arc<dyn LibraryRepository>) -> Self {
        Self { store, library }
    }

    pub fn store(&self) -> &Arc<H> {
        &self.store
    }

    pub fn recommendations<P: HazardParent>(
        &self,
        parent: &P,
    ) -> Result<Vec<Recommendation>, HazardError> {
        Ok(self
            .library
            .recommendations(parent.recommendation_subject())?)
    }

    fn library_hazard<P: HazardParent>(
        &self,
        id: LibraryHazardId,
    ) -> Result<LibraryHazard, HazardError> {
        let hazard = self
            .library
            .hazard(id)?
            .filter(|hazard| hazard.archived_at.is_none())
            .ok_or(HazardError::MissingLibraryHazard(id))?;
        if !P::accepts_hazard(&hazard) {
            return Err(HazardError::HazardNotApplicable(id));
        }
        Ok(hazard)
    }

    fn library_control<P: HazardParent>(
        &self,
        id: LibraryControlId,
    ) -> Result<LibraryControl, HazardError> {
        let control = self
            .library
            .control(id)?
            .filter(|control| control.archived_at.is_none())
            .ok_or(HazardError::MissingLibraryControl(id))?;
        if !P::accepts_control(&control) {
            return Err(HazardError::ControlNotApplicable(id));
        }
        Ok(control)
    }

    pub fn create_hazard<P: HazardParent>(
        &self,
        parent: &P,
        library_hazard_id: LibraryHazardId,
        user_id: Option<UserId>,
    ) -> Result<Hazard, HazardError> {
        self.library_hazard::<P>(library_hazard_id)?;
        let existing = self.store.hazards_for(parent.parent_ref())?;
        if existing
            .iter()
            .any(|hazard| hazard.library_hazard_id == library_hazard_id)
        {
            return Err(HazardError::DuplicateHazard(library_hazard_id));
        }
        Ok(self.store.insert_hazard(Hazard {
            id: HazardId::new(),
            parent: parent.parent_ref(),
            library_hazard_id,
            is_applicable: true,
            position: existing.len(),
            user_id,
            archived_at: None,
        })?)
    }

    pub fn create_control<P: HazardParent>(
        &self,
        parent: &P,
        hazard_id: HazardId,
        library_control_id: LibraryControlId,
        user_id: Option<UserId>,
    ) -> Result<Control, HazardError> {
        let hazard = self
            .store
            .hazard(hazard_id)?
            .filter(|hazard| hazard.parent == parent.parent_ref() && hazard.archived_at.is_none())
            .ok_or(HazardError::ForeignHazard(hazard_id))?;
        self.library_control::<P>(library_control_id)?;
        let existing = self.store.controls_for(hazard.id)?;
        if existing
            .iter()
            .any(|control| control.library_control_id == library_control_id)
        {
            return Err(HazardError::DuplicateControl {
                hazard: hazard.library_hazard_id,
                control: library_control_id,
            });
        }
        Ok(self.store.insert_control(Control {
            id: ControlId::new(),
            hazard_id: hazard.id,
            library_control_id,
            is_applicable: true,
            position: existing.len(),
            user_id,
            archived_at: None,
        })?)
    }

    pub fn archive_hazards<P: HazardParent>(
        &self,
        parents: &[P],
        at: DateTime<Utc>,
    ) -> Result<Vec<HazardId>, HazardError> {
        let refs: Vec<ParentRef> = parents.iter().map(|parent| parent.parent_ref()).collect();
        Ok(self.store.archive_hazards(&refs, at)?)
    }

    pub fn archive_controls<P: HazardParent>(
        &self,
        parent: &P,
        at: DateTime<Utc>,
    ) -> Result<Vec<ControlId>, HazardError> {
        let hazard_ids: Vec<HazardId> = self
            .store
            .hazards_for(parent.parent_ref())?
            .into_iter()
            .map(|hazard| hazard.id)
            .collect();
        Ok(self.store.archive_controls(&hazard_ids, at)?)
    }

    /// Checks a full hazard list for the parent without writing anything.
    pub fn check_edits<P: HazardParent>(
        &self,
        parent: &P,
        edits: &[HazardEdit],
    ) -> Result<(), HazardError> {
        let existing: HashMap<HazardId, Hazard> = self
            .store
            .hazards_for(parent.parent_ref())?
            .into_iter()
            .map(|hazard| (hazard.id, hazard))
            .collect();

        let mut library_hazards = HashSet::new();
        let mut hazard_ids = HashSet::new();
        for edit in edits {
            if !library_hazards.insert(edit.library_hazard_id) {
                return Err(HazardError::DuplicateHazard(edit.library_hazard_id));
            }
            let owned_controls: HashSet<ControlId> = match edit.id {
                Some(id) => {
                    if !existing.contains_key(&id) || !hazard_ids.insert(id) {
                        return Err(HazardError::ForeignHazard(id));
                    }
                    self.store
                        .controls_for(id)?
                        .into_iter()
                        .map(|control| control.id)
                        .collect()
                }
                None => HashSet::new(),
            };
            self.library_hazard::<P>(edit.library_hazard_id)?;

            let mut library_controls = HashSet::new();
            let mut control_ids = HashSet::new();
            for control in &edit.controls {
                if !library_controls.insert(control.library_control_id) {
                    return Err(HazardError::DuplicateControl {
                        hazard: edit.library_hazard_id,
                        control: control.library_control_id,
                    });
                }
                if let Some(id) = control.id {
                    if !owned_controls.contains(&id) || !control_ids.insert(id) {
                        return Err(HazardError::ForeignControl(id));
                    }
                }
                self.library_control::<P>(control.library_control_id)?;
            }
        }
        Ok(())
    }

    /// Makes the parent's live hazards and controls match `edits`; rows left
    /// out are archived.
    pub fn apply_edits<P: HazardParent>(
        &self,
        parent: &P,
        edits: &[HazardEdit],
        user_id: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<EditSummary, HazardError> {
        self.check_edits(parent, edits)?;
        let parent_ref = parent.parent_ref();
        let mut summary = EditSummary::default();

        let kept: HashSet<HazardId> = edits.iter().filter_map(|edit| edit.id).collect();
        let dropped: Vec<HazardId> = self
            .store
            .hazards_for(parent_ref)?
            .into_iter()
            .map(|hazard| hazard.id)
            .filter(|id| !kept.contains(id))
            .collect();
        for id in &dropped {
            if let Some(mut hazard) = self.store.hazard(*id)? {
                hazard.archived_at = Some(at);
                self.store.update_hazard(hazard)?;
                summary.hazards_archived += 1;
            }
        }
        summary.controls_archived += self.store.archive_controls(&dropped, at)?.len();

        for (position, edit) in edits.iter().enumerate() {
            let hazard = match edit.id.and_then(|id| self.store.hazard(id).transpose()) {
                Some(existing) => {
                    let mut hazard = existing?;
                    hazard.library_hazard_id = edit.library_hazard_id;
                    hazard.is_applicable = edit.is_applicable;
                    hazard.position = position;
                    self.store.update_hazard(hazard.clone())?;
                    summary.hazards_updated += 1;
                    hazard
                }
                None => {
                    summary.hazards_created += 1;
                    self.store.insert_hazard(Hazard {
                        id: HazardId::new(),
                        parent: parent_ref,
                        library_hazard_id: edit.library_hazard_id,
                        is_applicable: edit.is_applicable,
                        position,
                        user_id,
                        archived_at: None,
                    })?
                }
            };
            self.apply_control_edits(&hazard, &edit.controls, user_id, at, &mut summary)?;
        }

        debug!(parent = ?parent_ref, ?summary, "hazard edits applied");
        Ok(summary)
    }

    fn apply_control_edits(
        &self,
        hazard: &Hazard,
        edits: &[ControlEdit],
        user_id: Option<UserId>,
        at: DateTime<Utc>,
        summary: &mut EditSummary,
    ) -> Result<(), HazardError> {
        let mut current: HashMap<ControlId, Control> = self
            .store
            .controls_for(hazard.id)?
            .into_iter()
            .map(|control| (control.id, control))
            .collect();

        for (position, edit) in edits.iter().enumerate() {
            match edit.id.and_then(|id| current.remove(&id)) {
                Some(mut control) => {
                    control.library_control_id = edit.library_control_id;
                    control.is_applicable = edit.is_applicable;
                    control.position = position;
                    self.store.update_control(control)?;
                    summary.controls_updated += 1;
                }
                None => {
                    self.store.insert_control(Control {
                        id: ControlId::new(),
                        hazard_id: hazard.id,
                        library_control_id: edit.library_control_id,
                        is_applicable: edit.is_applicable,
                        position,
                        user_id,
                        archived_at: None,
                    })?;
                    summary.controls_created += 1;
                }
            }
        }

        for (_, mut control) in current {
            control.archived_at = Some(at);
            self.store.update_control(control)?;
            summary.controls_archived += 1;
        }
        Ok(())
    }
}
