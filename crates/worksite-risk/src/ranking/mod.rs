//! Risk-ranking projection: numeric scores to bounded levels with freshness
//! and validity guards, plus the filtered, paginated list queries built on it.

mod events;
mod level;
mod projector;
mod query;
mod thresholds;

pub use events::{EventError, InMemoryRiskEvents, RiskEvent, RiskEventSink};
pub use level::{
    derive_level, LevelInputs, MetricReading, RecalculationWindow, RiskLevel, RiskThresholds,
    UnknownRiskLevel,
};
pub use projector::{RankingError, RiskProjection, RiskRankingProjector};
pub use query::{
    LocationRanking, Pagination, RankingFilters, RankingOrder, RankingPage, RankingQuery,
    TaskRanking, WorkPackageRanking,
};
pub use thresholds::ThresholdRegistry;
