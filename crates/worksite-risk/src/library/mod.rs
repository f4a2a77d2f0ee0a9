//! Shared library catalog: site conditions, hazards, controls, tasks and the
//! recommendation graph between them, plus the reconciler that keeps the
//! hazard/control catalogs in line with a declared manifest.

mod catalog;
mod memory;
mod reconciler;

use crate::domain::{
    LibraryControl, LibraryControlId, LibraryHazard, LibraryHazardId, LibrarySiteCondition,
    LibrarySiteConditionId, LibraryTask, LibraryTaskId, Recommendation, RecommendationSubject,
    TenantId,
};
use crate::error::RepositoryError;

pub use catalog::{CatalogStats, LibraryCatalog};
pub use memory::InMemoryLibrary;
pub use reconciler::{
    CatalogEntry, ColumnChanges, ExpectedEntry, LibraryKind, LibraryReconciler,
    LibraryReferences, ReconcileError, ReconcileManifest, ReconcileReport, ReconciliationStore,
    RewriteCount,
};

pub trait LibraryRepository: Send + Sync {
    /// Site conditions visible to the tenant, archived rows included.
    fn site_conditions(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<LibrarySiteCondition>, RepositoryError>;
    fn site_condition(
        &self,
        id: LibrarySiteConditionId,
    ) -> Result<Option<LibrarySiteCondition>, RepositoryError>;
    fn upsert_site_condition(&self, entry: LibrarySiteCondition) -> Result<(), RepositoryError>;
    fn set_site_condition_enabled(
        &self,
        tenant_id: TenantId,
        id: LibrarySiteConditionId,
        enabled: bool,
    ) -> Result<(), RepositoryError>;

    fn hazard(&self, id: LibraryHazardId) -> Result<Option<LibraryHazard>, RepositoryError>;
    fn control(&self, id: LibraryControlId) -> Result<Option<LibraryControl>, RepositoryError>;
    fn task(&self, id: LibraryTaskId) -> Result<Option<LibraryTask>, RepositoryError>;
    fn recommendations(
        &self,
        subject: RecommendationSubject,
    ) -> Result<Vec<Recommendation>, RepositoryError>;
}
