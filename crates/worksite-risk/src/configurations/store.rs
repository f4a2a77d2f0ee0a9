use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use super::model::{default_labels, AttributeConfiguration, EntityConfiguration, EntityLabels};
use super::repository::{ConfigurationKey, ConfigurationRepository, ConfigurationRow};
use super::schema::EntityKey;
use super::validation::{attribute_problems, repair_mandatory, validate, ValidationError};
use crate::domain::TenantId;
use crate::error::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to encode configuration '{name}': {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ConfigurationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(err) => err.code(),
            Self::Encode { .. } => "INTERNAL",
            Self::Repository(err) => err.code(),
        }
    }
}

struct CachedValue {
    value: Option<String>,
    expires_at: Instant,
}

/// Layered tenant/default configuration with a TTL cache over resolved
/// values. Writes go through the store so the cache stays coherent.
pub struct ConfigurationStore {
    repository: Arc<dyn ConfigurationRepository>,
    ttl: Duration,
    cache: RwLock<HashMap<ConfigurationKey, CachedValue>>,
    /// Bumped under the cache write lock by every invalidation; a read that
    /// straddles one must not cache what it saw.
    generation: AtomicU64,
}

impl ConfigurationStore {
    pub fn new(repository: Arc<dyn ConfigurationRepository>, ttl: Duration) -> Self {
        Self {
            repository,
            ttl,
            cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    fn cached(&self, key: &ConfigurationKey) -> Option<Option<String>> {
        let cache = self.cache.read().expect("configuration cache poisoned");
        cache
            .get(key)
            .filter(|cached| cached.expires_at > Instant::now())
            .map(|cached| cached.value.clone())
    }

    fn remember(&self, resolved: &HashMap<ConfigurationKey, Option<String>>, generation: u64) {
        let mut cache = self.cache.write().expect("configuration cache poisoned");
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(keys = resolved.len(), "configuration changed during read; not cached");
            return;
        }
        let now = Instant::now();
        cache.retain(|_, cached| cached.expires_at > now);
        for (key, value) in resolved {
            cache.insert(
                key.clone(),
                CachedValue {
                    value: value.clone(),
                    expires_at: now + self.ttl,
                },
            );
        }
    }

    /// A default row shadows every tenant that has no row of its own, so
    /// writing it drops all cached entries with that name.
    fn invalidate(&self, name: &str, tenant_id: Option<TenantId>) {
        let mut cache = self.cache.write().expect("configuration cache poisoned");
        self.generation.fetch_add(1, Ordering::SeqCst);
        match tenant_id {
            Some(_) => {
                cache.remove(&(name.to_string(), tenant_id));
            }
            None => cache.retain(|(cached_name, _), _| cached_name != name),
        }
    }

    pub fn invalidate_all(&self) {
        let mut cache = self.cache.write().expect("configuration cache poisoned");
        self.generation.fetch_add(1, Ordering::SeqCst);
        cache.clear();
    }

    /// Tenant row if present, otherwise the default row.
    pub fn get(
        &self,
        name: &str,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<String>, ConfigurationError> {
        let key = (name.to_string(), tenant_id);
        if let Some(value) = self.cached(&key) {
            return Ok(value);
        }
        let mut resolved = self.bulk_load(&[key.clone()], true)?;
        Ok(resolved.remove(&key).flatten())
    }

    /// Exact row only; admin paths use this to tell overrides from defaults.
    pub fn get_strict(
        &self,
        name: &str,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<String>, ConfigurationError> {
        Ok(self.repository.get(name, tenant_id)?)
    }

    /// Resolves every key in one repository round trip.
    pub fn bulk_load(
        &self,
        keys: &[ConfigurationKey],
        fallback_to_default: bool,
    ) -> Result<HashMap<ConfigurationKey, Option<String>>, ConfigurationError> {
        let mut lookups: Vec<ConfigurationKey> = keys.to_vec();
        if fallback_to_default {
            for (name, tenant_id) in keys {
                if tenant_id.is_some() {
                    lookups.push((name.clone(), None));
                }
            }
        }
        lookups.sort();
        lookups.dedup();

        let generation = self.generation.load(Ordering::SeqCst);
        let rows = self.repository.get_many(&lookups)?;
        let resolved: HashMap<ConfigurationKey, Option<String>> = keys
            .iter()
            .map(|key| {
                let value = rows.get(key).cloned().or_else(|| {
                    fallback_to_default
                        .then(|| rows.get(&(key.0.clone(), None)).cloned())
                        .flatten()
                });
                (key.clone(), value)
            })
            .collect();
        debug!(keys = keys.len(), found = rows.len(), "bulk loaded configuration");

        if fallback_to_default {
            self.remember(&resolved, generation);
        }
        Ok(resolved)
    }

    /// Labels and attributes for the entity as the tenant sees them. Broken
    /// stored attributes fall back to defaults; mandatory flags are repaired.
    pub fn load_entity_configuration(
        &self,
        entity: EntityKey,
        tenant_id: Option<TenantId>,
    ) -> Result<EntityConfiguration, ConfigurationError> {
        let labels = self.load_labels(entity, tenant_id)?;
        let attributes = match self.load_attributes(entity, tenant_id)? {
            Some(attributes) => attributes,
            None if tenant_id.is_some() => self
                .load_attributes(entity, None)?
                .unwrap_or_else(|| EntityConfiguration::defaults(entity).attributes),
            None => EntityConfiguration::defaults(entity).attributes,
        };
        Ok(EntityConfiguration {
            key: entity.key().to_string(),
            labels,
            attributes,
        })
    }

    fn load_labels(
        &self,
        entity: EntityKey,
        tenant_id: Option<TenantId>,
    ) -> Result<EntityLabels, ConfigurationError> {
        let name = entity.labels_name();
        let Some(raw) = self.get(&name, tenant_id)? else {
            return Ok(default_labels(entity));
        };
        match serde_json::from_str::<EntityLabels>(&raw) {
            Ok(labels) => Ok(labels),
            Err(err) => {
                warn!(
                    %name,
                    tenant_id = ?tenant_id,
                    error = %err,
                    "stored labels unreadable; using defaults"
                );
                Ok(default_labels(entity))
            }
        }
    }

    /// `None` when the resolved row is unreadable or invalid.
    fn load_attributes(
        &self,
        entity: EntityKey,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<Vec<AttributeConfiguration>>, ConfigurationError> {
        let name = entity.attributes_name();
        let Some(raw) = self.get(&name, tenant_id)? else {
            return Ok(tenant_id
                .is_none()
                .then(|| EntityConfiguration::defaults(entity).attributes));
        };
        let mut attributes = match serde_json::from_str::<Vec<AttributeConfiguration>>(&raw) {
            Ok(attributes) => attributes,
            Err(err) => {
                warn!(
                    %name,
                    tenant_id = ?tenant_id,
                    error = %err,
                    "stored attributes unreadable; using defaults"
                );
                return Ok(None);
            }
        };

        let repaired = repair_mandatory(entity, &mut attributes);
        if !repaired.is_empty() {
            warn!(
                %name,
                tenant_id = ?tenant_id,
                attributes = ?repaired,
                "repaired mandatory attributes"
            );
        }
        let problems = attribute_problems(entity, &attributes);
        if !problems.is_empty() {
            warn!(
                %name,
                tenant_id = ?tenant_id,
                problems = ?problems,
                "stored attributes invalid; using defaults"
            );
            return Ok(None);
        }
        Ok(Some(attributes))
    }

    /// Validates the combined configuration, then replaces both sections.
    pub fn update_section(
        &self,
        config: &EntityConfiguration,
        tenant_id: Option<TenantId>,
    ) -> Result<EntityKey, ConfigurationError> {
        let entity = validate(config)?;
        let labels_name = entity.labels_name();
        let attributes_name = entity.attributes_name();

        let labels = serde_json::to_string(&config.labels).map_err(|source| {
            ConfigurationError::Encode {
                name: labels_name.clone(),
                source,
            }
        })?;
        let attributes = serde_json::to_string(&config.attributes).map_err(|source| {
            ConfigurationError::Encode {
                name: attributes_name.clone(),
                source,
            }
        })?;

        self.repository.put_all(vec![
            ConfigurationRow {
                name: labels_name.clone(),
                tenant_id,
                value: labels,
            },
            ConfigurationRow {
                name: attributes_name.clone(),
                tenant_id,
                value: attributes,
            },
        ])?;
        self.invalidate(&labels_name, tenant_id);
        self.invalidate(&attributes_name, tenant_id);
        debug!(%entity, tenant_id = ?tenant_id, "entity configuration updated");
        Ok(entity)
    }

    /// Drops the tenant's rows so reads fall back to the defaults.
    pub fn reset(
        &self,
        entity: EntityKey,
        tenant_id: Option<TenantId>,
    ) -> Result<bool, ConfigurationError> {
        let mut removed = false;
        for name in [entity.labels_name(), entity.attributes_name()] {
            removed |= self.repository.delete(&name, tenant_id)?;
            self.invalidate(&name, tenant_id);
        }
        Ok(removed)
    }

    pub fn required_attribute_keys(
        &self,
        entity: EntityKey,
        tenant_id: Option<TenantId>,
    ) -> Result<Vec<String>, ConfigurationError> {
        Ok(self
            .load_entity_configuration(entity, tenant_id)?
            .attributes
            .into_iter()
            .filter(|attribute| attribute.required)
            .map(|attribute| attribute.key)
            .collect())
    }

    /// Rejects a write payload that misses a required attribute or carries
    /// one the entity does not define.
    pub fn check_payload(
        &self,
        entity: EntityKey,
        tenant_id: Option<TenantId>,
        payload: &Value,
    ) -> Result<(), ConfigurationError> {
        let Some(fields) = payload.as_object() else {
            return Err(ValidationError::new(entity.key(), "payload must be an object").into());
        };
        let config = self.load_entity_configuration(entity, tenant_id)?;
        let schema = entity.schema();

        let mut problems: Vec<String> = fields
            .keys()
            .filter(|key| schema.attribute(key).is_none())
            .map(|key| format!("unknown attribute '{key}'"))
            .collect();
        problems.extend(
            config
                .attributes
                .iter()
                .filter(|attribute| attribute.required)
                .filter(|attribute| fields.get(&attribute.key).map_or(true, Value::is_null))
                .map(|attribute| format!("required attribute '{}' is missing", attribute.key)),
        );

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                entity: entity.key().to_string(),
                problems,
            }
            .into())
        }
    }
}
