use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Control, Hazard, HazardStore, ParentRef};
use crate::domain::{ControlId, HazardId, LibraryControlId, LibraryHazardId};
use crate::error::RepositoryError;
use crate::library::{LibraryKind, LibraryReferences, RewriteCount};

#[derive(Debug, Default)]
struct Tables {
    hazards: HashMap<HazardId, Hazard>,
    controls: HashMap<ControlId, Control>,
}

#[derive(Debug, Default)]
pub struct InMemoryHazardStore {
    tables: Mutex<Tables>,
}

impl InMemoryHazardStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("hazard mutex poisoned")
    }

    /// Every hazard row, archived ones included.
    pub fn all_hazards(&self) -> Vec<Hazard> {
        self.lock().hazards.values().cloned().collect()
    }

    pub fn all_controls(&self) -> Vec<Control> {
        self.lock().controls.values().cloned().collect()
    }
}

impl HazardStore for InMemoryHazardStore {
    fn hazard(&self, id: HazardId) -> Result<Option<Hazard>, RepositoryError> {
        Ok(self.lock().hazards.get(&id).cloned())
    }

    fn hazards_for(&self, parent: ParentRef) -> Result<Vec<Hazard>, RepositoryError> {
        let mut hazards: Vec<Hazard> = self
            .lock()
            .hazards
            .values()
            .filter(|hazard| hazard.parent == parent && hazard.archived_at.is_none())
            .cloned()
            .collect();
        hazards.sort_by_key(|hazard| hazard.position);
        Ok(hazards)
    }

    fn controls_for(&self, hazard_id: HazardId) -> Result<Vec<Control>, RepositoryError> {
        let mut controls: Vec<Control> = self
            .lock()
            .controls
            .values()
            .filter(|control| control.hazard_id == hazard_id && control.archived_at.is_none())
            .cloned()
            .collect();
        controls.sort_by_key(|control| control.position);
        Ok(controls)
    }

    fn insert_hazard(&self, hazard: Hazard) -> Result<Hazard, RepositoryError> {
        let mut tables = self.lock();
        if tables.hazards.contains_key(&hazard.id) {
            return Err(RepositoryError::Conflict(format!("hazard {}", hazard.id)));
        }
        tables.hazards.insert(hazard.id, hazard.clone());
        Ok(hazard)
    }

    fn update_hazard(&self, hazard: Hazard) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        let existing = tables
            .hazards
            .get_mut(&hazard.id)
            .ok_or(RepositoryError::NotFound)?;
        *existing = hazard;
        Ok(())
    }

    fn insert_control(&self, control: Control) -> Result<Control, RepositoryError> {
        let mut tables = self.lock();
        if !tables.hazards.contains_key(&control.hazard_id) {
            return Err(RepositoryError::NotFound);
        }
        if tables.controls.contains_key(&control.id) {
            return Err(RepositoryError::Conflict(format!("control {}", control.id)));
        }
        tables.controls.insert(control.id, control.clone());
        Ok(control)
    }

    fn update_control(&self, control: Control) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        let existing = tables
            .controls
            .get_mut(&control.id)
            .ok_or(RepositoryError::NotFound)?;
        *existing = control;
        Ok(())
    }

    fn archive_hazards(
        &self,
        parents: &[ParentRef],
        at: DateTime<Utc>,
    ) -> Result<Vec<HazardId>, RepositoryError> {
        let mut tables = self.lock();
        let mut archived = Vec::new();
        for hazard in tables.hazards.values_mut() {
            if parents.contains(&hazard.parent) && hazard.archived_at.is_none() {
                hazard.archived_at = Some(at);
                archived.push(hazard.id);
            }
        }
        for control in tables.controls.values_mut() {
            if archived.contains(&control.hazard_id) && control.archived_at.is_none() {
                control.archived_at = Some(at);
            }
        }
        Ok(archived)
    }

    fn archive_controls(
        &self,
        hazard_ids: &[HazardId],
        at: DateTime<Utc>,
    ) -> Result<Vec<ControlId>, RepositoryError> {
        let mut tables = self.lock();
        let mut archived = Vec::new();
        for control in tables.controls.values_mut() {
            if hazard_ids.contains(&control.hazard_id) && control.archived_at.is_none() {
                control.archived_at = Some(at);
                archived.push(control.id);
            }
        }
        Ok(archived)
    }
}

impl LibraryReferences for InMemoryHazardStore {
    fn rewrite_references(
        &self,
        kind: LibraryKind,
        old_id: Uuid,
        new_id: Uuid,
    ) -> Result<RewriteCount, RepositoryError> {
        let mut tables = self.lock();
        let mut count = RewriteCount::default();
        match kind {
            LibraryKind::Hazard => {
                let (old, new) = (LibraryHazardId(old_id), LibraryHazardId(new_id));
                for hazard in tables.hazards.values_mut() {
                    if hazard.library_hazard_id == old {
                        hazard.library_hazard_id = new;
                        count.rewritten += 1;
                    }
                }
            }
            LibraryKind::Control => {
                let (old, new) = (LibraryControlId(old_id), LibraryControlId(new_id));
                for control in tables.controls.values_mut() {
                    if control.library_control_id == old {
                        control.library_control_id = new;
                        count.rewritten += 1;
                    }
                }
            }
        }
        Ok(count)
    }
}
