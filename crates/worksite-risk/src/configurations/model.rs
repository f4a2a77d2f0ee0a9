use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::schema::{AttributeSchema, EntityKey, SchemaKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityLabels {
    pub label: String,
    pub label_plural: String,
}

/// Attribute shape. Mapped attributes carry display values per enum key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AttributeKind {
    Simple,
    Mapped {
        mappings: BTreeMap<String, Vec<String>>,
    },
}

impl AttributeKind {
    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeConfiguration {
    pub key: String,
    pub label: String,
    pub label_plural: String,
    pub visible: bool,
    pub required: bool,
    pub filterable: bool,
    #[serde(flatten)]
    pub kind: AttributeKind,
}

impl AttributeConfiguration {
    pub fn from_schema(schema: &AttributeSchema) -> Self {
        let kind = match schema.kind {
            SchemaKind::Simple => AttributeKind::Simple,
            SchemaKind::Mapped { allowed } => AttributeKind::Mapped {
                mappings: allowed
                    .iter()
                    .map(|key| (key.to_string(), vec![display_value(key)]))
                    .collect(),
            },
        };
        Self {
            key: schema.key.to_string(),
            label: schema.label.to_string(),
            label_plural: schema.label_plural.to_string(),
            visible: true,
            required: schema.mandatory,
            filterable: schema.filterable,
            kind,
        }
    }
}

/// Labels plus attribute list for one entity, as stored per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityConfiguration {
    pub key: String,
    #[serde(flatten)]
    pub labels: EntityLabels,
    pub attributes: Vec<AttributeConfiguration>,
}

impl EntityConfiguration {
    pub fn defaults(entity: EntityKey) -> Self {
        let schema = entity.schema();
        Self {
            key: entity.key().to_string(),
            labels: default_labels(entity),
            attributes: schema
                .attributes
                .iter()
                .map(AttributeConfiguration::from_schema)
                .collect(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeConfiguration> {
        self.attributes.iter().find(|attribute| attribute.key == key)
    }
}

pub fn default_labels(entity: EntityKey) -> EntityLabels {
    let schema = entity.schema();
    EntityLabels {
        label: schema.label.to_string(),
        label_plural: schema.label_plural.to_string(),
    }
}

/// `not_started` -> `Not Started`
fn display_value(key: &str) -> String {
    key.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
