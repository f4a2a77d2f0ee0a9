//! Append-only risk metric store.
//!
//! Scores are produced elsewhere and only ever appended here. For every
//! `(entity, date)` the row with the greatest `calculated_at` is authoritative.

mod memory;

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::TenantId;
use crate::error::RepositoryError;
use crate::ranking::{MetricReading, RecalculationWindow};

pub use memory::InMemoryRiskMetricRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    LocationTotal,
    WorkPackageTotal,
    TaskSpecific,
}

impl MetricKind {
    pub const fn ordered() -> [Self; 3] {
        [Self::LocationTotal, Self::WorkPackageTotal, Self::TaskSpecific]
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::LocationTotal => "location_total",
            Self::WorkPackageTotal => "work_package_total",
            Self::TaskSpecific => "task_specific",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Per-tenant scores aggregated across contractors, supervisors and crews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    ContractorSafety,
    SupervisorEngagement,
    CrewRisk,
}

impl AggregateKind {
    pub const fn ordered() -> [Self; 3] {
        [
            Self::ContractorSafety,
            Self::SupervisorEngagement,
            Self::CrewRisk,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetric {
    pub kind: MetricKind,
    pub entity_id: Uuid,
    pub date: NaiveDate,
    pub value: f64,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetric {
    pub kind: AggregateKind,
    pub tenant_id: TenantId,
    pub entity_id: Uuid,
    pub value: f64,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub average: f64,
    pub stddev: f64,
    pub samples: usize,
}

impl AggregateStats {
    /// Population statistics; `None` when there is nothing to aggregate.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let samples = values.len();
        let average = values.iter().sum::<f64>() / samples as f64;
        let variance = values
            .iter()
            .map(|value| (value - average).powi(2))
            .sum::<f64>()
            / samples as f64;
        Some(Self {
            average,
            stddev: variance.sqrt(),
            samples,
        })
    }
}

pub trait RiskMetricRepository: Send + Sync {
    /// Rows are unique on `(kind, entity, date, calculated_at)`.
    fn append(&self, metric: RiskMetric) -> Result<(), RepositoryError>;
    fn last_known(
        &self,
        kind: MetricKind,
        entity_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<RiskMetric>, RepositoryError>;
    /// Latest row per entity for `date`, resolved in a single call.
    fn latest_bulk(
        &self,
        kind: MetricKind,
        entity_ids: &[Uuid],
        date: NaiveDate,
    ) -> Result<HashMap<Uuid, RiskMetric>, RepositoryError>;
    fn append_aggregate(&self, metric: AggregateMetric) -> Result<(), RepositoryError>;
    /// Latest value per entity, then average/stddev across the tenant.
    fn aggregate_stats(
        &self,
        kind: AggregateKind,
        tenant_id: TenantId,
    ) -> Result<Option<AggregateStats>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    #[error("no {kind} metric stored for {entity_id} on {date}")]
    MissingMetric {
        kind: MetricKind,
        entity_id: Uuid,
        date: NaiveDate,
    },
    #[error("{kind} metric for {entity_id} is not published for {date}")]
    NotAvailableForDate {
        kind: MetricKind,
        entity_id: Uuid,
        date: NaiveDate,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl MetricError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingMetric { .. } => "MISSING_METRIC",
            Self::NotAvailableForDate { .. } => "METRIC_NOT_AVAILABLE_FOR_DATE",
            Self::Repository(err) => err.code(),
        }
    }
}

/// Read-side facade over a [`RiskMetricRepository`] used by the projector.
#[derive(Debug)]
pub struct RiskMetricStore<R> {
    repository: std::sync::Arc<R>,
}

impl<R> Clone for RiskMetricStore<R> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<R: RiskMetricRepository> RiskMetricStore<R> {
    pub fn new(repository: std::sync::Arc<R>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn require(
        &self,
        kind: MetricKind,
        entity_id: Uuid,
        date: NaiveDate,
        window: &RecalculationWindow,
    ) -> Result<RiskMetric, MetricError> {
        let metric = self
            .repository
            .last_known(kind, entity_id, date)?
            .ok_or(MetricError::MissingMetric {
                kind,
                entity_id,
                date,
            })?;
        if window.is_beyond_horizon(date) {
            return Err(MetricError::NotAvailableForDate {
                kind,
                entity_id,
                date,
            });
        }
        Ok(metric)
    }

    /// Readings for every entity in one repository round trip.
    pub fn readings(
        &self,
        kind: MetricKind,
        entity_ids: &[Uuid],
        date: NaiveDate,
        window: &RecalculationWindow,
    ) -> Result<HashMap<Uuid, MetricReading>, MetricError> {
        let latest = self.repository.latest_bulk(kind, entity_ids, date)?;
        Ok(entity_ids
            .iter()
            .map(|id| {
                let reading = match latest.get(id) {
                    None => MetricReading::Missing,
                    Some(_) if window.is_beyond_horizon(date) => MetricReading::NotAvailableForDate,
                    Some(metric) => MetricReading::Value(metric.value),
                };
                (*id, reading)
            })
            .collect())
    }

    pub fn aggregate(
        &self,
        kind: AggregateKind,
        tenant_id: TenantId,
    ) -> Result<Option<AggregateStats>, MetricError> {
        Ok(self.repository.aggregate_stats(kind, tenant_id)?)
    }
}
