use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryKind {
    Hazard,
    Control,
}

impl LibraryKind {
    pub const fn ordered() -> [Self; 2] {
        [Self::Hazard, Self::Control]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Hazard => "hazard",
            Self::Control => "control",
        }
    }

    /// Column name used by dependent rows and inside audit JSON.
    pub const fn id_key(self) -> &'static str {
        match self {
            Self::Hazard => "library_hazard_id",
            Self::Control => "library_control_id",
        }
    }

    /// Audit object types whose diffs may carry [`Self::id_key`].
    pub const fn audit_object_types(self) -> &'static [&'static str] {
        match self {
            Self::Hazard => &["task_hazard", "site_condition_hazard"],
            Self::Control => &["task_control", "site_condition_control"],
        }
    }
}

/// Column view shared by library hazards and controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub name: String,
    pub for_tasks: bool,
    pub for_site_conditions: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedEntry {
    pub id: Uuid,
    pub name: String,
    pub for_tasks: bool,
    pub for_site_conditions: bool,
    /// `old_id -> old_name` rows folded into this one.
    #[serde(default)]
    pub merge: BTreeMap<Uuid, String>,
}

impl ExpectedEntry {
    fn as_entry(&self) -> CatalogEntry {
        CatalogEntry {
            id: self.id,
            name: self.name.clone(),
            for_tasks: self.for_tasks,
            for_site_conditions: self.for_site_conditions,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileManifest {
    #[serde(default)]
    pub hazards: Vec<ExpectedEntry>,
    #[serde(default)]
    pub controls: Vec<ExpectedEntry>,
}

impl ReconcileManifest {
    pub fn entries(&self, kind: LibraryKind) -> &[ExpectedEntry] {
        match kind {
            LibraryKind::Hazard => &self.hazards,
            LibraryKind::Control => &self.controls,
        }
    }
}

/// Only the columns that differ; an empty value means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnChanges {
    pub name: Option<String>,
    pub for_tasks: Option<bool>,
    pub for_site_conditions: Option<bool>,
}

impl ColumnChanges {
    pub fn between(current: &CatalogEntry, expected: &CatalogEntry) -> Self {
        Self {
            name: (current.name != expected.name).then(|| expected.name.clone()),
            for_tasks: (current.for_tasks != expected.for_tasks).then_some(expected.for_tasks),
            for_site_conditions: (current.for_site_conditions != expected.for_site_conditions)
                .then_some(expected.for_site_conditions),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.for_tasks.is_none() && self.for_site_conditions.is_none()
    }

    pub fn apply(&self, entry: &mut CatalogEntry) {
        if let Some(name) = &self.name {
            entry.name = name.clone();
        }
        if let Some(for_tasks) = self.for_tasks {
            entry.for_tasks = for_tasks;
        }
        if let Some(for_site_conditions) = self.for_site_conditions {
            entry.for_site_conditions = for_site_conditions;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteCount {
    pub rewritten: usize,
    pub duplicates_deleted: usize,
}

impl std::ops::AddAssign for RewriteCount {
    fn add_assign(&mut self, other: Self) {
        self.rewritten += other.rewritten;
        self.duplicates_deleted += other.duplicates_deleted;
    }
}

/// The catalog table plus the audit log for one library kind.
pub trait ReconciliationStore: Send + Sync {
    fn load_entries(&self, kind: LibraryKind) -> Result<Vec<CatalogEntry>, RepositoryError>;
    fn insert_entry(&self, kind: LibraryKind, entry: CatalogEntry)
        -> Result<(), RepositoryError>;
    fn update_entry(
        &self,
        kind: LibraryKind,
        id: Uuid,
        changes: &ColumnChanges,
    ) -> Result<(), RepositoryError>;
    fn rewrite_audit_diffs(
        &self,
        kind: LibraryKind,
        old_id: Uuid,
        new_id: Uuid,
    ) -> Result<usize, RepositoryError>;
    fn delete_entries(&self, kind: LibraryKind, ids: &[Uuid]) -> Result<usize, RepositoryError>;
}

/// A table holding `library_*_id` foreign keys. Rewrites that would collide
/// with an existing unique row delete the duplicate instead.
pub trait LibraryReferences: Send + Sync {
    fn rewrite_references(
        &self,
        kind: LibraryKind,
        old_id: Uuid,
        new_id: Uuid,
    ) -> Result<RewriteCount, RepositoryError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub kind: Option<LibraryKind>,
    pub inserted: usize,
    pub updated: usize,
    pub merged: usize,
    pub references: RewriteCount,
    pub audit_diffs_rewritten: usize,
    pub marked_inapplicable: usize,
    pub deleted: usize,
}

impl ReconcileReport {
    pub fn writes(&self) -> usize {
        self.inserted
            + self.updated
            + self.references.rewritten
            + self.references.duplicates_deleted
            + self.audit_diffs_rewritten
            + self.marked_inapplicable
            + self.deleted
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("{kind} {id} is declared more than once")]
    DuplicateExpected { kind: &'static str, id: Uuid },
    #[error("{kind} {id} cannot be merged into itself or another expected entry")]
    InvalidMerge { kind: &'static str, id: Uuid },
    #[error("{kind} {id} is merged into more than one entry")]
    AmbiguousMerge { kind: &'static str, id: Uuid },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ReconcileError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateExpected { .. }
            | Self::InvalidMerge { .. }
            | Self::AmbiguousMerge { .. } => "VALIDATION",
            Self::Repository(err) => err.code(),
        }
    }
}

pub struct LibraryReconciler {
    store: Arc<dyn ReconciliationStore>,
    references: Vec<Arc<dyn LibraryReferences>>,
}

impl LibraryReconciler {
    pub fn new(
        store: Arc<dyn ReconciliationStore>,
        references: Vec<Arc<dyn LibraryReferences>>,
    ) -> Self {
        Self { store, references }
    }

    fn validate(kind: LibraryKind, expected: &[ExpectedEntry]) -> Result<(), ReconcileError> {
        let label = kind.label();
        let mut ids = HashSet::new();
        for entry in expected {
            if !ids.insert(entry.id) {
                return Err(ReconcileError::DuplicateExpected {
                    kind: label,
                    id: entry.id,
                });
            }
        }
        let mut merged = HashSet::new();
        for entry in expected {
            for old_id in entry.merge.keys() {
                if ids.contains(old_id) {
                    return Err(ReconcileError::InvalidMerge {
                        kind: label,
                        id: *old_id,
                    });
                }
                if !merged.insert(*old_id) {
                    return Err(ReconcileError::AmbiguousMerge {
                        kind: label,
                        id: *old_id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Bring one catalog in line with `expected`. Re-running with the same
    /// input performs no writes.
    pub fn reconcile(
        &self,
        kind: LibraryKind,
        expected: &[ExpectedEntry],
    ) -> Result<ReconcileReport, ReconcileError> {
        Self::validate(kind, expected)?;
        let label = kind.label();
        let mut report = ReconcileReport {
            kind: Some(kind),
            ..ReconcileReport::default()
        };

        let mut existing: HashMap<Uuid, CatalogEntry> = self
            .store
            .load_entries(kind)?
            .into_iter()
            .map(|entry| (entry.id, entry))
            .collect();
        info!(
            kind = label,
            existing = existing.len(),
            expected = expected.len(),
            "loaded library catalog"
        );

        let mut remap: Vec<(Uuid, Uuid)> = Vec::new();
        for entry in expected {
            let wanted = entry.as_entry();
            match existing.remove(&entry.id) {
                None => {
                    self.store.insert_entry(kind, wanted)?;
                    report.inserted += 1;
                }
                Some(current) => {
                    let changes = ColumnChanges::between(&current, &wanted);
                    if !changes.is_empty() {
                        self.store.update_entry(kind, entry.id, &changes)?;
                        report.updated += 1;
                    }
                }
            }

            for old_id in entry.merge.keys() {
                if existing.remove(old_id).is_none() {
                    continue;
                }
                report.merged += 1;
                remap.push((*old_id, entry.id));
                for table in &self.references {
                    report.references += table.rewrite_references(kind, *old_id, entry.id)?;
                }
            }
        }
        info!(
            kind = label,
            inserted = report.inserted,
            updated = report.updated,
            merged = report.merged,
            rewritten = report.references.rewritten,
            duplicates_deleted = report.references.duplicates_deleted,
            "applied expected entries"
        );

        for (old_id, new_id) in &remap {
            report.audit_diffs_rewritten += self.store.rewrite_audit_diffs(kind, *old_id, *new_id)?;
        }
        info!(kind = label, rewritten = report.audit_diffs_rewritten, "rewrote audit diffs");

        let inapplicable = ColumnChanges {
            name: None,
            for_tasks: Some(false),
            for_site_conditions: Some(false),
        };
        let mut leftovers: Vec<&CatalogEntry> = existing.values().collect();
        leftovers.sort_by_key(|entry| entry.id);
        for entry in leftovers {
            if entry.for_tasks || entry.for_site_conditions {
                self.store.update_entry(kind, entry.id, &inapplicable)?;
                report.marked_inapplicable += 1;
            }
        }
        info!(
            kind = label,
            marked = report.marked_inapplicable,
            "marked unlisted entries inapplicable"
        );

        if !remap.is_empty() {
            let old_ids: Vec<Uuid> = remap.iter().map(|(old_id, _)| *old_id).collect();
            report.deleted = self.store.delete_entries(kind, &old_ids)?;
        }
        info!(
            kind = label,
            deleted = report.deleted,
            writes = report.writes(),
            "library reconcile finished"
        );

        Ok(report)
    }

    pub fn reconcile_manifest(
        &self,
        manifest: &ReconcileManifest,
    ) -> Result<Vec<ReconcileReport>, ReconcileError> {
        LibraryKind::ordered()
            .into_iter()
            .map(|kind| self.reconcile(kind, manifest.entries(kind)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: Uuid, name: &str) -> CatalogEntry {
        CatalogEntry {
            id,
            name: name.to_string(),
            for_tasks: true,
            for_site_conditions: false,
        }
    }

    #[test]
    fn column_changes_only_carry_differences() {
        let id = Uuid::new_v4();
        let current = entry(id, "Struck by");
        let mut wanted = entry(id, "Struck by");
        assert!(ColumnChanges::between(&current, &wanted).is_empty());

        wanted.name = "Struck-by".to_string();
        wanted.for_site_conditions = true;
        let changes = ColumnChanges::between(&current, &wanted);
        assert_eq!(changes.name.as_deref(), Some("Struck-by"));
        assert_eq!(changes.for_tasks, None);
        assert_eq!(changes.for_site_conditions, Some(true));

        let mut applied = current.clone();
        changes.apply(&mut applied);
        assert_eq!(applied, wanted);
    }

    #[test]
    fn merge_targets_are_validated() {
        let keep = Uuid::new_v4();
        let other = Uuid::new_v4();
        let old = Uuid::new_v4();
        let mut first = ExpectedEntry {
            id: keep,
            name: "Keep".to_string(),
            for_tasks: true,
            for_site_conditions: true,
            merge: BTreeMap::new(),
        };
        first.merge.insert(old, "Old".to_string());
        let mut second = first.clone();
        second.id = other;

        let err = LibraryReconciler::validate(LibraryKind::Hazard, &[first.clone(), second])
            .expect_err("old id merged twice");
        assert!(matches!(err, ReconcileError::AmbiguousMerge { .. }));

        let mut self_merge = first.clone();
        self_merge.merge.insert(keep, "Keep".to_string());
        let err = LibraryReconciler::validate(LibraryKind::Hazard, &[self_merge])
            .expect_err("merge into self");
        assert_eq!(err.code(), "VALIDATION");
    }
}
