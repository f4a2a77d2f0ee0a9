use std::sync::Mutex;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{LocationId, TaskId, TenantId};

/// Typed notifications for the external reactor that recomputes metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
pub enum RiskEvent {
    LocationChanged {
        tenant_id: TenantId,
        location_id: LocationId,
    },
    TaskChanged {
        tenant_id: TenantId,
        task_id: TaskId,
    },
    TaskDeleted {
        tenant_id: TenantId,
        task_id: TaskId,
    },
    ProjectLocationSiteConditionsChanged {
        tenant_id: TenantId,
        location_id: LocationId,
        date: NaiveDate,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
}

pub trait RiskEventSink: Send + Sync {
    fn emit(&self, event: RiskEvent) -> Result<(), EventError>;
}

#[derive(Debug, Default)]
pub struct InMemoryRiskEvents {
    events: Mutex<Vec<RiskEvent>>,
}

impl InMemoryRiskEvents {
    pub fn events(&self) -> Vec<RiskEvent> {
        self.events.lock().expect("event mutex poisoned").clone()
    }
}

impl RiskEventSink for InMemoryRiskEvents {
    fn emit(&self, event: RiskEvent) -> Result<(), EventError> {
        self.events
            .lock()
            .expect("event mutex poisoned")
            .push(event);
        Ok(())
    }
}
