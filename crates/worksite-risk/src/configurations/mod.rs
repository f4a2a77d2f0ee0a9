//! Per-tenant entity configuration: labels and attribute schemas layered over
//! built-in defaults, validated on write and repaired on read.

mod model;
mod repository;
mod schema;
mod store;
mod validation;

pub use model::{
    default_labels, AttributeConfiguration, AttributeKind, EntityConfiguration, EntityLabels,
};
pub use repository::{
    ConfigurationKey, ConfigurationRepository, ConfigurationRow, InMemoryConfigurationRepository,
};
pub use schema::{AttributeSchema, EntityKey, EntitySchema, SchemaKind, UnknownEntity};
pub use store::{ConfigurationError, ConfigurationStore};
pub use validation::{repair_mandatory, validate, ValidationError};
