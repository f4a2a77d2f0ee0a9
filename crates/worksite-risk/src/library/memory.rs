use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use uuid::Uuid;

use super::{
    CatalogEntry, ColumnChanges, LibraryKind, LibraryReferences, LibraryRepository,
    ReconciliationStore, RewriteCount,
};
use crate::domain::{
    AuditEventDiff, LibraryControl, LibraryControlId, LibraryHazard, LibraryHazardId,
    LibrarySiteCondition, LibrarySiteConditionId, LibraryTask, LibraryTaskId, Recommendation,
    RecommendationSubject, ReportHazardControl, TenantId,
};
use crate::error::RepositoryError;

#[derive(Debug, Default)]
struct Tables {
    site_conditions: HashMap<LibrarySiteConditionId, LibrarySiteCondition>,
    disabled: HashSet<(TenantId, LibrarySiteConditionId)>,
    hazards: HashMap<LibraryHazardId, LibraryHazard>,
    controls: HashMap<LibraryControlId, LibraryControl>,
    tasks: HashMap<LibraryTaskId, LibraryTask>,
    recommendations: Vec<Recommendation>,
    report_hazard_controls: Vec<ReportHazardControl>,
    audit_diffs: Vec<AuditEventDiff>,
}

/// In-memory library schema, including the tables that reference it.
/// `writes()` counts every mutation so idempotency is observable.
#[derive(Debug, Default)]
pub struct InMemoryLibrary {
    tables: Mutex<Tables>,
    writes: AtomicUsize,
}

impl InMemoryLibrary {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("library mutex poisoned")
    }

    fn wrote(&self, count: usize) {
        self.writes.fetch_add(count, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn insert_hazard(&self, hazard: LibraryHazard) {
        self.lock().hazards.insert(hazard.id, hazard);
    }

    pub fn insert_control(&self, control: LibraryControl) {
        self.lock().controls.insert(control.id, control);
    }

    pub fn insert_task(&self, task: LibraryTask) {
        self.lock().tasks.insert(task.id, task);
    }

    pub fn hazards(&self) -> Vec<LibraryHazard> {
        self.lock().hazards.values().cloned().collect()
    }

    pub fn controls(&self) -> Vec<LibraryControl> {
        self.lock().controls.values().cloned().collect()
    }

    pub fn insert_recommendation(
        &self,
        recommendation: Recommendation,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if tables.recommendations.contains(&recommendation) {
            return Err(RepositoryError::Conflict(
                "recommendations (subject, hazard, control)".to_string(),
            ));
        }
        tables.recommendations.push(recommendation);
        Ok(())
    }

    pub fn all_recommendations(&self) -> Vec<Recommendation> {
        self.lock().recommendations.clone()
    }

    pub fn insert_report_hazard_control(
        &self,
        row: ReportHazardControl,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if tables.report_hazard_controls.contains(&row) {
            return Err(RepositoryError::Conflict(
                "report hazard controls (report, hazard, control)".to_string(),
            ));
        }
        tables.report_hazard_controls.push(row);
        Ok(())
    }

    pub fn report_hazard_controls(&self) -> Vec<ReportHazardControl> {
        self.lock().report_hazard_controls.clone()
    }

    pub fn insert_audit_diff(&self, diff: AuditEventDiff) {
        self.lock().audit_diffs.push(diff);
    }

    pub fn audit_diffs(&self) -> Vec<AuditEventDiff> {
        self.lock().audit_diffs.clone()
    }
}

impl LibraryRepository for InMemoryLibrary {
    fn site_conditions(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<LibrarySiteCondition>, RepositoryError> {
        let tables = self.lock();
        Ok(tables
            .site_conditions
            .values()
            .filter(|entry| !tables.disabled.contains(&(tenant_id, entry.id)))
            .cloned()
            .collect())
    }

    fn site_condition(
        &self,
        id: LibrarySiteConditionId,
    ) -> Result<Option<LibrarySiteCondition>, RepositoryError> {
        Ok(self.lock().site_conditions.get(&id).cloned())
    }

    fn upsert_site_condition(&self, entry: LibrarySiteCondition) -> Result<(), RepositoryError> {
        self.lock().site_conditions.insert(entry.id, entry);
        self.wrote(1);
        Ok(())
    }

    fn set_site_condition_enabled(
        &self,
        tenant_id: TenantId,
        id: LibrarySiteConditionId,
        enabled: bool,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if !tables.site_conditions.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        let changed = if enabled {
            tables.disabled.remove(&(tenant_id, id))
        } else {
            tables.disabled.insert((tenant_id, id))
        };
        drop(tables);
        if changed {
            self.wrote(1);
        }
        Ok(())
    }

    fn hazard(&self, id: LibraryHazardId) -> Result<Option<LibraryHazard>, RepositoryError> {
        Ok(self.lock().hazards.get(&id).cloned())
    }

    fn control(&self, id: LibraryControlId) -> Result<Option<LibraryControl>, RepositoryError> {
        Ok(self.lock().controls.get(&id).cloned())
    }

    fn task(&self, id: LibraryTaskId) -> Result<Option<LibraryTask>, RepositoryError> {
        Ok(self.lock().tasks.get(&id).cloned())
    }

    fn recommendations(
        &self,
        subject: RecommendationSubject,
    ) -> Result<Vec<Recommendation>, RepositoryError> {
        Ok(self
            .lock()
            .recommendations
            .iter()
            .filter(|recommendation| recommendation.subject == subject)
            .copied()
            .collect())
    }
}

fn hazard_entry(hazard: &LibraryHazard) -> CatalogEntry {
    CatalogEntry {
        id: hazard.id.0,
        name: hazard.name.clone(),
        for_tasks: hazard.for_tasks,
        for_site_conditions: hazard.for_site_conditions,
    }
}

fn control_entry(control: &LibraryControl) -> CatalogEntry {
    CatalogEntry {
        id: control.id.0,
        name: control.name.clone(),
        for_tasks: control.for_tasks,
        for_site_conditions: control.for_site_conditions,
    }
}

/// Rewrite `key: old` to `key: new` anywhere inside a JSON document.
fn rewrite_json_ids(value: &mut Value, key: &str, old: &str, new: &str) -> bool {
    match value {
        Value::Object(map) => {
            let mut changed = false;
            for (field, nested) in map.iter_mut() {
                if field == key && nested.as_str() == Some(old) {
                    *nested = Value::String(new.to_string());
                    changed = true;
                } else {
                    changed |= rewrite_json_ids(nested, key, old, new);
                }
            }
            changed
        }
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, item| rewrite_json_ids(item, key, old, new) || changed),
        _ => false,
    }
}

/// Rewrite matching rows; a rewrite that would duplicate an existing row
/// removes the row instead.
fn rewrite_unique<T, F>(rows: &mut Vec<T>, rewrite: F) -> RewriteCount
where
    T: Copy + PartialEq,
    F: Fn(&T) -> Option<T>,
{
    let mut count = RewriteCount::default();
    let mut index = 0;
    while index < rows.len() {
        match rewrite(&rows[index]) {
            None => index += 1,
            Some(candidate) => {
                if rows.contains(&candidate) {
                    rows.remove(index);
                    count.duplicates_deleted += 1;
                } else {
                    rows[index] = candidate;
                    count.rewritten += 1;
                    index += 1;
                }
            }
        }
    }
    count
}

impl ReconciliationStore for InMemoryLibrary {
    fn load_entries(&self, kind: LibraryKind) -> Result<Vec<CatalogEntry>, RepositoryError> {
        let tables = self.lock();
        Ok(match kind {
            LibraryKind::Hazard => tables.hazards.values().map(hazard_entry).collect(),
            LibraryKind::Control => tables.controls.values().map(control_entry).collect(),
        })
    }

    fn insert_entry(&self, kind: LibraryKind, entry: CatalogEntry) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        let exists = match kind {
            LibraryKind::Hazard => tables.hazards.contains_key(&LibraryHazardId(entry.id)),
            LibraryKind::Control => tables.controls.contains_key(&LibraryControlId(entry.id)),
        };
        if exists {
            return Err(RepositoryError::Conflict(format!(
                "library {} {}",
                kind.label(),
                entry.id
            )));
        }
        match kind {
            LibraryKind::Hazard => {
                tables.hazards.insert(
                    LibraryHazardId(entry.id),
                    LibraryHazard {
                        id: LibraryHazardId(entry.id),
                        name: entry.name,
                        for_tasks: entry.for_tasks,
                        for_site_conditions: entry.for_site_conditions,
                        archived_at: None,
                    },
                );
            }
            LibraryKind::Control => {
                tables.controls.insert(
                    LibraryControlId(entry.id),
                    LibraryControl {
                        id: LibraryControlId(entry.id),
                        name: entry.name,
                        for_tasks: entry.for_tasks,
                        for_site_conditions: entry.for_site_conditions,
                        archived_at: None,
                    },
                );
            }
        }
        drop(tables);
        self.wrote(1);
        Ok(())
    }

    fn update_entry(
        &self,
        kind: LibraryKind,
        id: Uuid,
        changes: &ColumnChanges,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        match kind {
            LibraryKind::Hazard => {
                let hazard = tables
                    .hazards
                    .get_mut(&LibraryHazardId(id))
                    .ok_or(RepositoryError::NotFound)?;
                let mut entry = hazard_entry(hazard);
                changes.apply(&mut entry);
                hazard.name = entry.name;
                hazard.for_tasks = entry.for_tasks;
                hazard.for_site_conditions = entry.for_site_conditions;
            }
            LibraryKind::Control => {
                let control = tables
                    .controls
                    .get_mut(&LibraryControlId(id))
                    .ok_or(RepositoryError::NotFound)?;
                let mut entry = control_entry(control);
                changes.apply(&mut entry);
                control.name = entry.name;
                control.for_tasks = entry.for_tasks;
                control.for_site_conditions = entry.for_site_conditions;
            }
        }
        drop(tables);
        self.wrote(1);
        Ok(())
    }

    fn rewrite_audit_diffs(
        &self,
        kind: LibraryKind,
        old_id: Uuid,
        new_id: Uuid,
    ) -> Result<usize, RepositoryError> {
        let old = old_id.to_string();
        let new = new_id.to_string();
        let object_types = kind.audit_object_types();
        let mut tables = self.lock();
        let mut rewritten = 0;
        for diff in tables
            .audit_diffs
            .iter_mut()
            .filter(|diff| object_types.contains(&diff.object_type.as_str()))
        {
            let old_changed = rewrite_json_ids(&mut diff.old_values, kind.id_key(), &old, &new);
            let new_changed = rewrite_json_ids(&mut diff.new_values, kind.id_key(), &old, &new);
            if old_changed || new_changed {
                rewritten += 1;
            }
        }
        drop(tables);
        self.wrote(rewritten);
        Ok(rewritten)
    }

    fn delete_entries(&self, kind: LibraryKind, ids: &[Uuid]) -> Result<usize, RepositoryError> {
        let mut tables = self.lock();
        let deleted = ids
            .iter()
            .filter(|id| match kind {
                LibraryKind::Hazard => tables.hazards.remove(&LibraryHazardId(**id)).is_some(),
                LibraryKind::Control => tables.controls.remove(&LibraryControlId(**id)).is_some(),
            })
            .count();
        drop(tables);
        self.wrote(deleted);
        Ok(deleted)
    }
}

impl LibraryReferences for InMemoryLibrary {
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
                count += rewrite_unique(&mut tables.recommendations, |row| {
                    (row.library_hazard_id == old).then_some(Recommendation {
                        library_hazard_id: new,
                        ..*row
                    })
                });
                count += rewrite_unique(&mut tables.report_hazard_controls, |row| {
                    (row.library_hazard_id == old).then_some(ReportHazardControl {
                        library_hazard_id: new,
                        ..*row
                    })
                });
            }
            LibraryKind::Control => {
                let (old, new) = (LibraryControlId(old_id), LibraryControlId(new_id));
                count += rewrite_unique(&mut tables.recommendations, |row| {
                    (row.library_control_id == old).then_some(Recommendation {
                        library_control_id: new,
                        ..*row
                    })
                });
                count += rewrite_unique(&mut tables.report_hazard_controls, |row| {
                    (row.library_control_id == old).then_some(ReportHazardControl {
                        library_control_id: new,
                        ..*row
                    })
                });
            }
        }
        drop(tables);
        self.wrote(count.rewritten + count.duplicates_deleted);
        Ok(count)
    }
}
