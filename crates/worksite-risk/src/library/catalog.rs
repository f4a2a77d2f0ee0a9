use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::debug;

use super::LibraryRepository;
use crate::domain::{LibrarySiteCondition, TenantId};
use crate::error::RepositoryError;

struct CachedCatalog {
    site_conditions: Arc<[LibrarySiteCondition]>,
    expires_at: Instant,
}

/// Per-tenant cache of the site-condition catalog. Owned by whoever wires the
/// engine; library writes must call [`LibraryCatalog::invalidate`].
pub struct LibraryCatalog {
    repository: Arc<dyn LibraryRepository>,
    ttl: Duration,
    cache: RwLock<HashMap<TenantId, CachedCatalog>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStats {
    pub total_entries: usize,
    pub valid_entries: usize,
}

impl LibraryCatalog {
    pub fn new(repository: Arc<dyn LibraryRepository>, ttl: Duration) -> Self {
        Self {
            repository,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &Arc<dyn LibraryRepository> {
        &self.repository
    }

    /// Non-archived site conditions enabled for the tenant.
    pub fn site_conditions(
        &self,
        tenant_id: TenantId,
    ) -> Result<Arc<[LibrarySiteCondition]>, RepositoryError> {
        {
            let cache = self.cache.read().expect("catalog lock poisoned");
            if let Some(cached) = cache.get(&tenant_id) {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.site_conditions.clone());
                }
            }
        }

        let loaded: Arc<[LibrarySiteCondition]> = self
            .repository
            .site_conditions(tenant_id)?
            .into_iter()
            .filter(|entry| !entry.is_archived())
            .collect();
        debug!(%tenant_id, entries = loaded.len(), "loaded library site conditions");

        let mut cache = self.cache.write().expect("catalog lock poisoned");
        let now = Instant::now();
        cache.retain(|_, cached| cached.expires_at > now);
        cache.insert(
            tenant_id,
            CachedCatalog {
                site_conditions: loaded.clone(),
                expires_at: now + self.ttl,
            },
        );
        Ok(loaded)
    }

    pub fn invalidate(&self, tenant_id: TenantId) {
        self.cache
            .write()
            .expect("catalog lock poisoned")
            .remove(&tenant_id);
    }

    pub fn invalidate_all(&self) {
        self.cache.write().expect("catalog lock poisoned").clear();
    }

    pub fn stats(&self) -> CatalogStats {
        let cache = self.cache.read().expect("catalog lock poisoned");
        let now = Instant::now();
        CatalogStats {
            total_entries: cache.len(),
            valid_entries: cache.values().filter(|cached| cached.expires_at > now).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LibrarySiteConditionId;
    use crate::library::InMemoryLibrary;

    fn entry(handle: &str) -> LibrarySiteCondition {
        LibrarySiteCondition {
            id: LibrarySiteConditionId::new(),
            handle_code: handle.to_string(),
            name: handle.to_string(),
            default_multiplier: 0.1,
            archived_at: None,
        }
    }

    #[test]
    fn cached_until_invalidated() {
        let library = Arc::new(InMemoryLibrary::default());
        library.upsert_site_condition(entry("heat_index")).unwrap();
        let catalog = LibraryCatalog::new(library.clone(), Duration::from_secs(60));
        let tenant = TenantId::new();

        assert_eq!(catalog.site_conditions(tenant).unwrap().len(), 1);
        library.upsert_site_condition(entry("slip")).unwrap();
        assert_eq!(catalog.site_conditions(tenant).unwrap().len(), 1);

        catalog.invalidate(tenant);
        assert_eq!(catalog.site_conditions(tenant).unwrap().len(), 2);
        assert_eq!(catalog.stats().valid_entries, 1);
    }

    #[test]
    fn zero_ttl_always_reloads() {
        let library = Arc::new(InMemoryLibrary::default());
        let catalog = LibraryCatalog::new(library.clone(), Duration::ZERO);
        let tenant = TenantId::new();

        assert!(catalog.site_conditions(tenant).unwrap().is_empty());
        library.upsert_site_condition(entry("crime")).unwrap();
        assert_eq!(catalog.site_conditions(tenant).unwrap().len(), 1);
    }

    #[test]
    fn tenant_disabled_entries_are_hidden() {
        let library = Arc::new(InMemoryLibrary::default());
        let heat = entry("heat_index");
        library.upsert_site_condition(heat.clone()).unwrap();
        library.upsert_site_condition(entry("slip")).unwrap();
        let tenant = TenantId::new();
        library
            .set_site_condition_enabled(tenant, heat.id, false)
            .unwrap();

        let catalog = LibraryCatalog::new(library, Duration::from_secs(60));
        let visible = catalog.site_conditions(tenant).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].handle_code, "slip");
        assert_eq!(catalog.site_conditions(TenantId::new()).unwrap().len(), 2);
    }
}
