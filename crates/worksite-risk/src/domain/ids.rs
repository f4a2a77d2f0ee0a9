use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(
    /// Isolation boundary for every tenant-scoped row.
    TenantId
);
entity_id!(UserId);
entity_id!(WorkPackageId);
entity_id!(LocationId);
entity_id!(ActivityId);
entity_id!(TaskId);
entity_id!(SiteConditionId);
entity_id!(HazardId);
entity_id!(ControlId);
entity_id!(DailyReportId);
entity_id!(LibrarySiteConditionId);
entity_id!(LibraryHazardId);
entity_id!(LibraryControlId);
entity_id!(LibraryTaskId);
entity_id!(RegionId);
entity_id!(DivisionId);
entity_id!(WorkTypeId);
entity_id!(ContractorId);
