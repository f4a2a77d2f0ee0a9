use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{ActivityStatus, WorkPackageStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKey {
    WorkPackage,
    Activity,
    Location,
    Task,
    Hazard,
    Control,
    SiteCondition,
}

impl EntityKey {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::WorkPackage,
            Self::Activity,
            Self::Location,
            Self::Task,
            Self::Hazard,
            Self::Control,
            Self::SiteCondition,
        ]
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::WorkPackage => "workPackage",
            Self::Activity => "activity",
            Self::Location => "location",
            Self::Task => "task",
            Self::Hazard => "hazard",
            Self::Control => "control",
            Self::SiteCondition => "siteCondition",
        }
    }

    const fn storage_key(self) -> &'static str {
        match self {
            Self::WorkPackage => "WORK_PACKAGE",
            Self::Activity => "ACTIVITY",
            Self::Location => "LOCATION",
            Self::Task => "TASK",
            Self::Hazard => "HAZARD",
            Self::Control => "CONTROL",
            Self::SiteCondition => "SITE_CONDITION",
        }
    }

    pub fn labels_name(self) -> String {
        format!("APP.{}.LABELS", self.storage_key())
    }

    pub fn attributes_name(self) -> String {
        format!("APP.{}.ATTRIBUTES", self.storage_key())
    }

    pub fn schema(self) -> &'static EntitySchema {
        match self {
            Self::WorkPackage => &WORK_PACKAGE,
            Self::Activity => &ACTIVITY,
            Self::Location => &LOCATION,
            Self::Task => &TASK,
            Self::Hazard => &HAZARD,
            Self::Control => &CONTROL,
            Self::SiteCondition => &SITE_CONDITION,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity '{0}'")]
pub struct UnknownEntity(pub String);

impl FromStr for EntityKey {
    type Err = UnknownEntity;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ordered()
            .into_iter()
            .find(|entity| entity.key() == raw.trim())
            .ok_or_else(|| UnknownEntity(raw.to_string()))
    }
}

/// Whether an attribute takes a plain value or maps enum keys to labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Simple,
    Mapped { allowed: &'static [&'static str] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSchema {
    pub key: &'static str,
    pub label: &'static str,
    pub label_plural: &'static str,
    pub mandatory: bool,
    pub filterable: bool,
    pub kind: SchemaKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySchema {
    pub entity: EntityKey,
    pub label: &'static str,
    pub label_plural: &'static str,
    pub attributes: &'static [AttributeSchema],
}

impl EntitySchema {
    pub fn attribute(&self, key: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|attribute| attribute.key == key)
    }

    pub fn mandatory(&self) -> impl Iterator<Item = &AttributeSchema> {
        self.attributes.iter().filter(|attribute| attribute.mandatory)
    }
}

const fn simple(
    key: &'static str,
    label: &'static str,
    label_plural: &'static str,
    mandatory: bool,
    filterable: bool,
) -> AttributeSchema {
    AttributeSchema {
        key,
        label,
        label_plural,
        mandatory,
        filterable,
        kind: SchemaKind::Simple,
    }
}

const fn mapped(
    key: &'static str,
    label: &'static str,
    label_plural: &'static str,
    allowed: &'static [&'static str],
) -> AttributeSchema {
    AttributeSchema {
        key,
        label,
        label_plural,
        mandatory: true,
        filterable: true,
        kind: SchemaKind::Mapped { allowed },
    }
}

const WORK_PACKAGE_STATUSES: [&str; 3] = [
    WorkPackageStatus::Pending.key(),
    WorkPackageStatus::Active.key(),
    WorkPackageStatus::Completed.key(),
];

const ACTIVITY_STATUSES: [&str; 4] = [
    ActivityStatus::NotStarted.key(),
    ActivityStatus::InProgress.key(),
    ActivityStatus::Complete.key(),
    ActivityStatus::NotCompleted.key(),
];

static WORK_PACKAGE: EntitySchema = EntitySchema {
    entity: EntityKey::WorkPackage,
    label: "Work Package",
    label_plural: "Work Packages",
    attributes: &[
        simple("name", "Name", "Names", true, false),
        simple("externalKey", "External Key", "External Keys", false, false),
        simple("workPackageType", "Project Type", "Project Types", false, true),
        mapped("status", "Status", "Statuses", &WORK_PACKAGE_STATUSES),
        simple("startDate", "Start Date", "Start Dates", true, false),
        simple("endDate", "End Date", "End Dates", true, false),
        simple("region", "Region", "Regions", false, true),
        simple("division", "Division", "Divisions", false, true),
        simple("contractor", "Contractor", "Contractors", false, true),
        simple("workTypes", "Work Type", "Work Types", false, true),
        simple("assignedUsers", "Assigned Person", "Assigned People", false, true),
        simple("description", "Description", "Descriptions", false, false),
    ],
};

static ACTIVITY: EntitySchema = EntitySchema {
    entity: EntityKey::Activity,
    label: "Activity",
    label_plural: "Activities",
    attributes: &[
        simple("name", "Name", "Names", true, false),
        simple("startDate", "Start Date", "Start Dates", true, false),
        simple("endDate", "End Date", "End Dates", true, false),
        mapped("status", "Status", "Statuses", &ACTIVITY_STATUSES),
        simple("crew", "Crew", "Crews", false, true),
        simple("externalKey", "External Key", "External Keys", false, false),
    ],
};

static LOCATION: EntitySchema = EntitySchema {
    entity: EntityKey::Location,
    label: "Location",
    label_plural: "Locations",
    attributes: &[
        simple("name", "Name", "Names", true, false),
        simple("geom", "Coordinates", "Coordinates", true, false),
        simple("address", "Address", "Addresses", false, false),
        simple("supervisor", "Supervisor", "Supervisors", false, true),
        simple(
            "additionalSupervisors",
            "Additional Supervisor",
            "Additional Supervisors",
            false,
            true,
        ),
        simple("riskLevel", "Risk Level", "Risk Levels", false, true),
        simple("externalKey", "External Key", "External Keys", false, false),
    ],
};

static TASK: EntitySchema = EntitySchema {
    entity: EntityKey::Task,
    label: "Task",
    label_plural: "Tasks",
    attributes: &[
        simple("libraryTask", "Task", "Tasks", true, true),
        simple("startDate", "Start Date", "Start Dates", false, false),
        simple("endDate", "End Date", "End Dates", false, false),
        mapped("status", "Status", "Statuses", &ACTIVITY_STATUSES),
        simple("riskLevel", "Risk Level", "Risk Levels", false, true),
    ],
};

static HAZARD: EntitySchema = EntitySchema {
    entity: EntityKey::Hazard,
    label: "Hazard",
    label_plural: "Hazards",
    attributes: &[
        simple("libraryHazard", "Hazard", "Hazards", true, false),
        simple("isApplicable", "Applicable", "Applicable", false, false),
    ],
};

static CONTROL: EntitySchema = EntitySchema {
    entity: EntityKey::Control,
    label: "Control",
    label_plural: "Controls",
    attributes: &[
        simple("libraryControl", "Control", "Controls", true, false),
        simple("isApplicable", "Implemented", "Implemented", false, false),
    ],
};

static SITE_CONDITION: EntitySchema = EntitySchema {
    entity: EntityKey::SiteCondition,
    label: "Site Condition",
    label_plural: "Site Conditions",
    attributes: &[
        simple(
            "librarySiteCondition",
            "Site Condition",
            "Site Conditions",
            true,
            false,
        ),
        simple("date", "Date", "Dates", false, false),
    ],
};
