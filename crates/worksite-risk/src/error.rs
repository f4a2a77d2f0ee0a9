use crate::clustering::TileError;
use crate::config::ConfigError;
use crate::configurations::ConfigurationError;
use crate::domain::GeoError;
use crate::hazards::HazardError;
use crate::ingest::IngestError;
use crate::integrity::IntegrityError;
use crate::library::ReconcileError;
use crate::metrics::MetricError;
use crate::orchestrator::OrchestratorError;
use crate::ranking::RankingError;
use crate::site_conditions::SiteConditionError;
use crate::telemetry::TelemetryError;
use crate::world_data::WorldDataError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

/// Storage failures shared by every repository trait in the crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record conflicts with an existing row: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Conflict(_) => "CONFLICT",
            Self::NotFound => "NOT_FOUND",
            Self::Unavailable(_) => "STORAGE_UNAVAILABLE",
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    /// Malformed input rejected before it reaches an engine.
    BadRequest(String),
    Geo(GeoError),
    Tile(TileError),
    WorldData(WorldDataError),
    Repository(RepositoryError),
    Configuration(ConfigurationError),
    Metric(MetricError),
    SiteConditions(SiteConditionError),
    Ranking(RankingError),
    Reconcile(ReconcileError),
    Hazards(HazardError),
    Integrity(IntegrityError),
    Orchestrator(OrchestratorError),
    Ingest(IngestError),
}

impl AppError {
    /// Stable machine-readable kind, shared with the module errors.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => "INTERNAL",
            AppError::BadRequest(_) | AppError::Geo(_) => "VALIDATION",
            AppError::Tile(_) => "INVALID_TILE",
            AppError::WorldData(_) => WorldDataError::CODE,
            AppError::Repository(err) => err.code(),
            AppError::Configuration(err) => err.code(),
            AppError::Metric(err) => err.code(),
            AppError::SiteConditions(err) => err.code(),
            AppError::Ranking(err) => err.code(),
            AppError::Reconcile(err) => err.code(),
            AppError::Hazards(err) => err.code(),
            AppError::Integrity(err) => err.code(),
            AppError::Orchestrator(err) => err.code(),
            AppError::Ingest(err) => err.code(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            "VALIDATION" | "INVALID_TILE" => StatusCode::BAD_REQUEST,
            "NOT_FOUND" | "MISSING_METRIC" => StatusCode::NOT_FOUND,
            "CONFLICT" | "INTEGRITY_VIOLATION" | "DUPLICATE_EXTERNAL_KEY" => StatusCode::CONFLICT,
            "MISSING_DEPENDENCY" | "METRIC_NOT_AVAILABLE_FOR_DATE" => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            "UPSTREAM_UNAVAILABLE" | "STORAGE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::BadRequest(message) => write!(f, "bad request: {}", message),
            AppError::Geo(err) => write!(f, "invalid coordinates: {}", err),
            AppError::Tile(err) => write!(f, "invalid tile: {}", err),
            AppError::WorldData(err) => write!(f, "world data error: {}", err),
            AppError::Repository(err) => write!(f, "storage error: {}", err),
            AppError::Configuration(err) => write!(f, "tenant configuration error: {}", err),
            AppError::Metric(err) => write!(f, "risk metric error: {}", err),
            AppError::SiteConditions(err) => write!(f, "site condition error: {}", err),
            AppError::Ranking(err) => write!(f, "ranking error: {}", err),
            AppError::Reconcile(err) => write!(f, "library reconcile error: {}", err),
            AppError::Hazards(err) => write!(f, "hazard error: {}", err),
            AppError::Integrity(err) => write!(f, "integrity error: {}", err),
            AppError::Orchestrator(err) => write!(f, "evaluation error: {}", err),
            AppError::Ingest(err) => write!(f, "ingest error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::BadRequest(_) => None,
            AppError::Geo(err) => Some(err),
            AppError::Tile(err) => Some(err),
            AppError::WorldData(err) => Some(err),
            AppError::Repository(err) => Some(err),
            AppError::Configuration(err) => Some(err),
            AppError::Metric(err) => Some(err),
            AppError::SiteConditions(err) => Some(err),
            AppError::Ranking(err) => Some(err),
            AppError::Reconcile(err) => Some(err),
            AppError::Hazards(err) => Some(err),
            AppError::Integrity(err) => Some(err),
            AppError::Orchestrator(err) => Some(err),
            AppError::Ingest(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string(), "code": self.code() }));
        (status, body).into_response()
    }
}

macro_rules! impl_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for AppError {
                fn from(value: $source) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from! {
    ConfigError => Config,
    TelemetryError => Telemetry,
    std::io::Error => Io,
    axum::Error => Server,
    GeoError => Geo,
    TileError => Tile,
    WorldDataError => WorldData,
    RepositoryError => Repository,
    ConfigurationError => Configuration,
    MetricError => Metric,
    SiteConditionError => SiteConditions,
    RankingError => Ranking,
    ReconcileError => Reconcile,
    HazardError => Hazards,
    IntegrityError => Integrity,
    OrchestratorError => Orchestrator,
    IngestError => Ingest,
}
