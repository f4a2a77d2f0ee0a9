use std::collections::HashSet;

use super::model::{AttributeConfiguration, AttributeKind, EntityConfiguration};
use super::schema::{AttributeSchema, EntityKey, SchemaKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration for '{entity}': {}", problems.join("; "))]
pub struct ValidationError {
    pub entity: String,
    pub problems: Vec<String>,
}

impl ValidationError {
    pub fn new(entity: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            problems: vec![problem.into()],
        }
    }

    pub fn code(&self) -> &'static str {
        "VALIDATION"
    }
}

/// Checks a full entity configuration against the built-in schema and
/// returns the entity it describes.
pub fn validate(config: &EntityConfiguration) -> Result<EntityKey, ValidationError> {
    let entity: EntityKey = config
        .key
        .parse()
        .map_err(|_| ValidationError::new(&config.key, "entity is not defined"))?;
    let problems = attribute_problems(entity, &config.attributes);
    if problems.is_empty() {
        Ok(entity)
    } else {
        Err(ValidationError {
            entity: config.key.clone(),
            problems,
        })
    }
}

pub(crate) fn attribute_problems(
    entity: EntityKey,
    attributes: &[AttributeConfiguration],
) -> Vec<String> {
    let schema = entity.schema();
    let mut problems = Vec::new();
    let mut seen = HashSet::new();

    for attribute in attributes {
        if !seen.insert(attribute.key.as_str()) {
            problems.push(format!("attribute '{}' listed twice", attribute.key));
            continue;
        }
        match schema.attribute(&attribute.key) {
            Some(definition) => check_attribute(definition, attribute, &mut problems),
            None => problems.push(format!(
                "attribute '{}' is not defined for {entity}",
                attribute.key
            )),
        }
    }

    for definition in schema.mandatory() {
        if !seen.contains(definition.key) {
            problems.push(format!("mandatory attribute '{}' is missing", definition.key));
        }
    }
    problems
}

fn check_attribute(
    definition: &AttributeSchema,
    attribute: &AttributeConfiguration,
    problems: &mut Vec<String>,
) {
    let key = &attribute.key;
    if attribute.label.trim().is_empty() || attribute.label_plural.trim().is_empty() {
        problems.push(format!("attribute '{key}' needs both labels"));
    }
    if definition.mandatory && !(attribute.visible && attribute.required) {
        problems.push(format!(
            "mandatory attribute '{key}' must be visible and required"
        ));
    }
    if !attribute.visible && (attribute.required || attribute.filterable) {
        problems.push(format!(
            "hidden attribute '{key}' cannot be required or filterable"
        ));
    }
    if attribute.filterable && !definition.filterable {
        problems.push(format!("attribute '{key}' is not filterable"));
    }

    match (definition.kind, &attribute.kind) {
        (SchemaKind::Simple, AttributeKind::Simple) => {}
        (SchemaKind::Mapped { allowed }, AttributeKind::Mapped { mappings }) => {
            for expected in allowed {
                match mappings.get(*expected) {
                    Some(values) if values.iter().any(|value| !value.trim().is_empty()) => {}
                    _ => problems.push(format!(
                        "attribute '{key}' needs a value for mapping '{expected}'"
                    )),
                }
            }
            for provided in mappings.keys() {
                if !allowed.contains(&provided.as_str()) {
                    problems.push(format!(
                        "attribute '{key}' maps unknown value '{provided}'"
                    ));
                }
            }
        }
        (SchemaKind::Simple, AttributeKind::Mapped { .. }) => {
            problems.push(format!("attribute '{key}' does not take mappings"));
        }
        (SchemaKind::Mapped { .. }, AttributeKind::Simple) => {
            problems.push(format!("attribute '{key}' requires mappings"));
        }
    }
}

/// Forces mandatory attributes back to visible and required. Returns the
/// keys that needed repair.
pub fn repair_mandatory(
    entity: EntityKey,
    attributes: &mut [AttributeConfiguration],
) -> Vec<String> {
    let schema = entity.schema();
    let mut repaired = Vec::new();
    for attribute in attributes.iter_mut() {
        let mandatory = schema
            .attribute(&attribute.key)
            .is_some_and(|definition| definition.mandatory);
        if mandatory && !(attribute.visible && attribute.required) {
            attribute.visible = true;
            attribute.required = true;
            repaired.push(attribute.key.clone());
        }
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults(entity: EntityKey) -> EntityConfiguration {
        EntityConfiguration::defaults(entity)
    }

    #[test]
    fn defaults_validate_for_every_entity() {
        for entity in EntityKey::ordered() {
            assert_eq!(validate(&defaults(entity)), Ok(entity));
        }
    }

    #[test]
    fn unknown_entity_is_rejected() {
        let mut config = defaults(EntityKey::Task);
        config.key = "jobSafetyBriefing".to_string();
        let err = validate(&config).unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
        assert_eq!(err.problems, vec!["entity is not defined".to_string()]);
    }

    #[test]
    fn unknown_and_missing_attributes_are_reported() {
        let mut config = defaults(EntityKey::Location);
        config.attributes.retain(|attribute| attribute.key != "name");
        config.attributes.push(AttributeConfiguration {
            key: "color".to_string(),
            label: "Color".to_string(),
            label_plural: "Colors".to_string(),
            visible: true,
            required: false,
            filterable: false,
            kind: AttributeKind::Simple,
        });

        let err = validate(&config).unwrap_err();
        assert!(err.problems.iter().any(|p| p.contains("'color' is not defined")));
        assert!(err.problems.iter().any(|p| p.contains("'name' is missing")));
    }

    #[test]
    fn hidden_attribute_cannot_be_required() {
        let mut config = defaults(EntityKey::Activity);
        let crew = config
            .attributes
            .iter_mut()
            .find(|attribute| attribute.key == "crew")
            .unwrap();
        crew.visible = false;
        crew.required = true;
        crew.filterable = false;

        let err = validate(&config).unwrap_err();
        assert_eq!(err.problems.len(), 1);
        assert!(err.problems[0].contains("hidden attribute 'crew'"));
    }

    #[test]
    fn filterable_only_where_the_schema_allows() {
        let mut config = defaults(EntityKey::WorkPackage);
        let description = config
            .attributes
            .iter_mut()
            .find(|attribute| attribute.key == "description")
            .unwrap();
        description.filterable = true;

        let err = validate(&config).unwrap_err();
        assert!(err.problems[0].contains("'description' is not filterable"));
    }

    #[test]
    fn mapped_attribute_needs_every_status() {
        let mut config = defaults(EntityKey::WorkPackage);
        let status = config
            .attributes
            .iter_mut()
            .find(|attribute| attribute.key == "status")
            .unwrap();
        if let AttributeKind::Mapped { mappings } = &mut status.kind {
            mappings.insert("active".to_string(), Vec::new());
            mappings.insert("archived".to_string(), vec!["Archived".to_string()]);
        }

        let err = validate(&config).unwrap_err();
        assert!(err.problems.iter().any(|p| p.contains("mapping 'active'")));
        assert!(err.problems.iter().any(|p| p.contains("unknown value 'archived'")));
    }

    #[test]
    fn schema_kind_must_match() {
        let mut config = defaults(EntityKey::Activity);
        let status = config
            .attributes
            .iter_mut()
            .find(|attribute| attribute.key == "status")
            .unwrap();
        status.kind = AttributeKind::Simple;

        let err = validate(&config).unwrap_err();
        assert!(err.problems[0].contains("requires mappings"));
    }

    #[test]
    fn repair_restores_mandatory_flags() {
        let mut config = defaults(EntityKey::Task);
        config.attributes[0].visible = false;
        config.attributes[0].required = false;

        let repaired = repair_mandatory(EntityKey::Task, &mut config.attributes);
        assert_eq!(repaired, vec!["libraryTask".to_string()]);
        assert_eq!(validate(&config), Ok(EntityKey::Task));
    }
}
