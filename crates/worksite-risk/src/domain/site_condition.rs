use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{LibrarySiteConditionId, LocationId, SiteConditionId, UserId};

/// The two row shapes sharing the `site_conditions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SiteConditionOrigin {
    Manual {
        user_id: UserId,
    },
    Evaluated {
        date: NaiveDate,
        alert: bool,
        multiplier: f64,
        details: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteCondition {
    pub id: SiteConditionId,
    pub location_id: LocationId,
    pub library_site_condition_id: LibrarySiteConditionId,
    pub origin: SiteConditionOrigin,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl SiteCondition {
    pub fn manual(
        location_id: LocationId,
        library_site_condition_id: LibrarySiteConditionId,
        user_id: UserId,
    ) -> Self {
        Self {
            id: SiteConditionId::new(),
            location_id,
            library_site_condition_id,
            origin: SiteConditionOrigin::Manual { user_id },
            archived_at: None,
        }
    }

    pub fn is_manually_added(&self) -> bool {
        matches!(self.origin, SiteConditionOrigin::Manual { .. })
    }

    pub fn evaluated_on(&self) -> Option<NaiveDate> {
        match &self.origin {
            SiteConditionOrigin::Evaluated { date, .. } => Some(*date),
            SiteConditionOrigin::Manual { .. } => None,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}
