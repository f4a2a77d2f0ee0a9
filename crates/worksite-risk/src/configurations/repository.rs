use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::TenantId;
use crate::error::RepositoryError;

/// `(name, tenant)`; `None` addresses the default row.
pub type ConfigurationKey = (String, Option<TenantId>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationRow {
    pub name: String,
    pub tenant_id: Option<TenantId>,
    pub value: String,
}

/// Raw key/value rows. Reads are strict: no tenant to default fallback.
pub trait ConfigurationRepository: Send + Sync {
    fn get(
        &self,
        name: &str,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<String>, RepositoryError>;
    /// Every stored row among `keys`, in one round trip.
    fn get_many(
        &self,
        keys: &[ConfigurationKey],
    ) -> Result<HashMap<ConfigurationKey, String>, RepositoryError>;
    /// Writes all rows or none.
    fn put_all(&self, rows: Vec<ConfigurationRow>) -> Result<(), RepositoryError>;
    fn delete(&self, name: &str, tenant_id: Option<TenantId>) -> Result<bool, RepositoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryConfigurationRepository {
    rows: Mutex<HashMap<ConfigurationKey, String>>,
    round_trips: Mutex<usize>,
}

impl InMemoryConfigurationRepository {
    pub fn round_trips(&self) -> usize {
        *self.round_trips.lock().expect("configuration mutex poisoned")
    }

    fn count_round_trip(&self) {
        *self.round_trips.lock().expect("configuration mutex poisoned") += 1;
    }
}

impl ConfigurationRepository for InMemoryConfigurationRepository {
    fn get(
        &self,
        name: &str,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<String>, RepositoryError> {
        self.count_round_trip();
        let guard = self.rows.lock().expect("configuration mutex poisoned");
        Ok(guard.get(&(name.to_string(), tenant_id)).cloned())
    }

    fn get_many(
        &self,
        keys: &[ConfigurationKey],
    ) -> Result<HashMap<ConfigurationKey, String>, RepositoryError> {
        self.count_round_trip();
        let guard = self.rows.lock().expect("configuration mutex poisoned");
        Ok(keys
            .iter()
            .filter_map(|key| guard.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    fn put_all(&self, rows: Vec<ConfigurationRow>) -> Result<(), RepositoryError> {
        self.count_round_trip();
        let mut guard = self.rows.lock().expect("configuration mutex poisoned");
        for row in rows {
            guard.insert((row.name, row.tenant_id), row.value);
        }
        Ok(())
    }

    fn delete(&self, name: &str, tenant_id: Option<TenantId>) -> Result<bool, RepositoryError> {
        self.count_round_trip();
        let mut guard = self.rows.lock().expect("configuration mutex poisoned");
        Ok(guard.remove(&(name.to_string(), tenant_id)).is_some())
    }
}
