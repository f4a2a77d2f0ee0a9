use std::collections::HashMap;
use std::sync::RwLock;

use super::RiskThresholds;
use crate::domain::TenantId;
use crate::metrics::MetricKind;

/// Tenant overrides per metric kind over a process-wide default.
#[derive(Debug)]
pub struct ThresholdRegistry {
    default: RiskThresholds,
    overrides: RwLock<HashMap<(TenantId, MetricKind), RiskThresholds>>,
}

impl ThresholdRegistry {
    pub fn new(default: RiskThresholds) -> Self {
        Self {
            default,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_thresholds(&self) -> RiskThresholds {
        self.default
    }

    pub fn set(&self, tenant_id: TenantId, kind: MetricKind, thresholds: RiskThresholds) {
        self.overrides
            .write()
            .expect("threshold lock poisoned")
            .insert((tenant_id, kind), thresholds);
    }

    pub fn clear(&self, tenant_id: TenantId, kind: MetricKind) {
        self.overrides
            .write()
            .expect("threshold lock poisoned")
            .remove(&(tenant_id, kind));
    }

    pub fn resolve(&self, tenant_id: TenantId, kind: MetricKind) -> RiskThresholds {
        self.overrides
            .read()
            .expect("threshold lock poisoned")
            .get(&(tenant_id, kind))
            .copied()
            .unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_override_wins_per_kind() {
        let registry = ThresholdRegistry::new(RiskThresholds::new(100.0, 250.0).unwrap());
        let tenant = TenantId::new();
        let tight = RiskThresholds::new(10.0, 20.0).unwrap();
        registry.set(tenant, MetricKind::LocationTotal, tight);

        assert_eq!(registry.resolve(tenant, MetricKind::LocationTotal), tight);
        assert_eq!(
            registry.resolve(tenant, MetricKind::TaskSpecific),
            registry.default_thresholds()
        );
        assert_eq!(
            registry.resolve(TenantId::new(), MetricKind::LocationTotal),
            registry.default_thresholds()
        );

        registry.clear(tenant, MetricKind::LocationTotal);
        assert_eq!(
            registry.resolve(tenant, MetricKind::LocationTotal),
            registry.default_thresholds()
        );
    }
}
