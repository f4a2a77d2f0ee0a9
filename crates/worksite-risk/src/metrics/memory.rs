use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::NaiveDate;
use uuid::Uuid;

use super::{
    AggregateKind, AggregateMetric, AggregateStats, MetricKind, RiskMetric, RiskMetricRepository,
};
use crate::domain::TenantId;
use crate::error::RepositoryError;

#[derive(Debug, Default)]
pub struct InMemoryRiskMetricRepository {
    metrics: Mutex<Vec<RiskMetric>>,
    aggregates: Mutex<Vec<AggregateMetric>>,
    bulk_calls: AtomicUsize,
}

impl InMemoryRiskMetricRepository {
    /// Number of bulk loads served, so callers can assert one call per query.
    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }
}

fn newer(candidate: &RiskMetric, current: Option<&RiskMetric>) -> bool {
    current.map_or(true, |current| candidate.calculated_at > current.calculated_at)
}

impl RiskMetricRepository for InMemoryRiskMetricRepository {
    fn append(&self, metric: RiskMetric) -> Result<(), RepositoryError> {
        let mut guard = self.metrics.lock().expect("metric mutex poisoned");
        let duplicate = guard.iter().any(|existing| {
            existing.kind == metric.kind
                && existing.entity_id == metric.entity_id
                && existing.date == metric.date
                && existing.calculated_at == metric.calculated_at
        });
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "{} metric for {} on {} at {}",
                metric.kind, metric.entity_id, metric.date, metric.calculated_at
            )));
        }
        guard.push(metric);
        Ok(())
    }

    fn last_known(
        &self,
        kind: MetricKind,
        entity_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<RiskMetric>, RepositoryError> {
        let guard = self.metrics.lock().expect("metric mutex poisoned");
        Ok(guard
            .iter()
            .filter(|metric| {
                metric.kind == kind && metric.entity_id == entity_id && metric.date == date
            })
            .max_by_key(|metric| metric.calculated_at)
            .cloned())
    }

    fn latest_bulk(
        &self,
        kind: MetricKind,
        entity_ids: &[Uuid],
        date: NaiveDate,
    ) -> Result<HashMap<Uuid, RiskMetric>, RepositoryError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        let guard = self.metrics.lock().expect("metric mutex poisoned");
        let mut latest: HashMap<Uuid, RiskMetric> = HashMap::new();
        for metric in guard
            .iter()
            .filter(|metric| metric.kind == kind && metric.date == date)
            .filter(|metric| entity_ids.contains(&metric.entity_id))
        {
            if newer(metric, latest.get(&metric.entity_id)) {
                latest.insert(metric.entity_id, metric.clone());
            }
        }
        Ok(latest)
    }

    fn append_aggregate(&self, metric: AggregateMetric) -> Result<(), RepositoryError> {
        self.aggregates
            .lock()
            .expect("metric mutex poisoned")
            .push(metric);
        Ok(())
    }

    fn aggregate_stats(
        &self,
        kind: AggregateKind,
        tenant_id: TenantId,
    ) -> Result<Option<AggregateStats>, RepositoryError> {
        let guard = self.aggregates.lock().expect("metric mutex poisoned");
        let mut latest: HashMap<Uuid, &AggregateMetric> = HashMap::new();
        for metric in guard
            .iter()
            .filter(|metric| metric.kind == kind && metric.tenant_id == tenant_id)
        {
            let replace = latest
                .get(&metric.entity_id)
                .map_or(true, |current| metric.calculated_at > current.calculated_at);
            if replace {
                latest.insert(metric.entity_id, metric);
            }
        }
        let values: Vec<f64> = latest.values().map(|metric| metric.value).collect();
        Ok(AggregateStats::from_values(&values))
    }
}
