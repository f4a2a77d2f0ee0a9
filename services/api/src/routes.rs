use crate::infra::{deserialize_optional_date, AppState, Services};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;
use worksite_risk::clustering::TileFeature;
use worksite_risk::configurations::{EntityConfiguration, EntityKey};
use worksite_risk::domain::{LibrarySiteConditionId, LocationId, TenantId};
use worksite_risk::error::AppError;
use worksite_risk::library::LibraryRepository;
use worksite_risk::metrics::{RiskMetric, RiskMetricRepository};
use worksite_risk::orchestrator::{EvaluationRun, LibraryChangeReport};
use worksite_risk::ranking::{
    LocationRanking, RankingPage, RankingQuery, TaskRanking, WorkPackageRanking,
};

type SharedServices = Arc<Services>;

pub(crate) fn router(services: SharedServices) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route(
            "/api/v1/locations/:location_id/evaluate",
            post(evaluate_location),
        )
        .route(
            "/api/v1/locations/:location_id/tasks/ranking",
            get(rank_location_tasks),
        )
        .route("/api/v1/rankings/locations", post(rank_locations))
        .route("/api/v1/rankings/work-packages", post(rank_work_packages))
        .route("/api/v1/risk-metrics", post(record_risk_metric))
        .route(
            "/api/v1/configurations/:entity",
            get(read_configuration)
                .put(write_configuration)
                .delete(reset_configuration),
        )
        .route(
            "/api/v1/library/site-conditions/:library_id/tenants/:tenant_id",
            put(toggle_site_condition),
        )
        .route("/api/v1/tiles/:tenant_id/:z/:x/:y", get(tile))
        .with_state(services)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EvaluateRequest {
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub(crate) date: Option<NaiveDate>,
}

async fn evaluate_location(
    State(services): State<SharedServices>,
    Path(location_id): Path<LocationId>,
    payload: Option<Json<EvaluateRequest>>,
) -> Result<Json<EvaluationRun>, AppError> {
    let Json(request) = payload.unwrap_or_default();
    let date = request.date.unwrap_or_else(today);
    let run = services.orchestrator.reevaluate(location_id, date).await?;
    Ok(Json(run))
}

/// Ranking query plus an optional reference "today" for the level window.
#[derive(Debug, Deserialize)]
pub(crate) struct RankingRequest {
    #[serde(flatten)]
    pub(crate) query: RankingQuery,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub(crate) today: Option<NaiveDate>,
}

async fn rank_locations(
    State(services): State<SharedServices>,
    Json(request): Json<RankingRequest>,
) -> Result<Json<RankingPage<LocationRanking>>, AppError> {
    let today = request.today.unwrap_or_else(today);
    Ok(Json(services.projector.rank_locations(&request.query, today)?))
}

async fn rank_work_packages(
    State(services): State<SharedServices>,
    Json(request): Json<RankingRequest>,
) -> Result<Json<RankingPage<WorkPackageRanking>>, AppError> {
    let today = request.today.unwrap_or_else(today);
    Ok(Json(
        services.projector.rank_work_packages(&request.query, today)?,
    ))
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaskRankingParams {
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub(crate) date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub(crate) today: Option<NaiveDate>,
}

async fn rank_location_tasks(
    State(services): State<SharedServices>,
    Path(location_id): Path<LocationId>,
    Query(params): Query<TaskRankingParams>,
) -> Result<Json<Vec<TaskRanking>>, AppError> {
    let today = params.today.unwrap_or_else(today);
    let date = params.date.unwrap_or(today);
    Ok(Json(services.projector.rank_tasks_for_location(
        location_id,
        date,
        today,
    )?))
}

async fn record_risk_metric(
    State(services): State<SharedServices>,
    Json(metric): Json<RiskMetric>,
) -> Result<StatusCode, AppError> {
    services.metrics.append(metric)?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TenantParams {
    pub(crate) tenant_id: Option<TenantId>,
}

fn entity_key(raw: &str) -> Result<EntityKey, AppError> {
    EntityKey::from_str(raw).map_err(|err| AppError::BadRequest(err.to_string()))
}

async fn read_configuration(
    State(services): State<SharedServices>,
    Path(entity): Path<String>,
    Query(params): Query<TenantParams>,
) -> Result<Json<EntityConfiguration>, AppError> {
    let entity = entity_key(&entity)?;
    Ok(Json(
        services
            .configurations
            .load_entity_configuration(entity, params.tenant_id)?,
    ))
}

async fn write_configuration(
    State(services): State<SharedServices>,
    Path(entity): Path<String>,
    Query(params): Query<TenantParams>,
    Json(config): Json<EntityConfiguration>,
) -> Result<Json<EntityConfiguration>, AppError> {
    let entity = entity_key(&entity)?;
    if config.key != entity.key() {
        return Err(AppError::BadRequest(format!(
            "payload key '{}' does not match path entity '{}'",
            config.key, entity
        )));
    }
    services
        .configurations
        .update_section(&config, params.tenant_id)?;
    Ok(Json(
        services
            .configurations
            .load_entity_configuration(entity, params.tenant_id)?,
    ))
}

async fn reset_configuration(
    State(services): State<SharedServices>,
    Path(entity): Path<String>,
    Query(params): Query<TenantParams>,
) -> Result<StatusCode, AppError> {
    let entity = entity_key(&entity)?;
    if services.configurations.reset(entity, params.tenant_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToggleRequest {
    pub(crate) enabled: bool,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub(crate) date: Option<NaiveDate>,
}

/// Enables or disables a library site condition for one tenant, then
/// re-evaluates that tenant's locations.
async fn toggle_site_condition(
    State(services): State<SharedServices>,
    Path((library_id, tenant_id)): Path<(Uuid, TenantId)>,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<LibraryChangeReport>, AppError> {
    services.library.set_site_condition_enabled(
        tenant_id,
        LibrarySiteConditionId(library_id),
        request.enabled,
    )?;
    let date = request.date.unwrap_or_else(today);
    let report = services
        .orchestrator
        .library_changed(tenant_id, date)
        .await?;
    Ok(Json(report))
}

async fn tile(
    State(services): State<SharedServices>,
    Path((tenant_id, z, x, y)): Path<(TenantId, u8, u32, u32)>,
) -> Result<Json<Vec<TileFeature>>, AppError> {
    Ok(Json(
        services.orchestrator.clusters().tile_query(tenant_id, z, x, y)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;
    use worksite_risk::config::{
        AppConfig, AppEnvironment, CacheConfig, ClusterConfig, RiskConfig, ServerConfig,
        TelemetryConfig, WorldDataConfig,
    };
    use worksite_risk::domain::{GeoPoint, Location};
    use worksite_risk::projects::ProjectRepository;
    use worksite_risk::ranking::RiskLevel;
    use worksite_risk::world_data::{
        FixtureWorldDataClient, TemperatureRange, WeatherDay, WeatherSection, WorldDataResponse,
    };

    fn config() -> AppConfig {
        AppConfig {
            environment: AppEnvironment::Test,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
            },
            world_data: WorldDataConfig {
                endpoint: WorldDataConfig::DEFAULT_ENDPOINT.to_string(),
                timeout: std::time::Duration::from_secs(1),
            },
            risk: RiskConfig::default(),
            caches: CacheConfig::default(),
            clustering: ClusterConfig::default(),
        }
    }

    fn heat_wave() -> WorldDataResponse {
        WorldDataResponse {
            weather: Some(WeatherSection {
                day: WeatherDay {
                    apparent_temperature: Some(TemperatureRange::new(110.0, 85.0)),
                    ..WeatherDay::default()
                },
                previous_day: None,
            }),
            ..WorldDataResponse::default()
        }
    }

    fn app() -> (Router, Arc<Services>) {
        let services = Arc::new(
            Services::in_memory(
                &config(),
                Arc::new(FixtureWorldDataClient::new(heat_wave())),
            )
            .expect("services wire up"),
        );
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(true)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        let router = router(services.clone()).layer(Extension(state));
        (router, services)
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    fn stored_location(services: &Services, tenant_id: TenantId) -> Location {
        services
            .projects
            .insert_location(Location {
                id: LocationId::new(),
                tenant_id,
                work_package_id: None,
                name: "Lift station".to_string(),
                address: None,
                geom: GeoPoint::new(32.8, -96.8).expect("valid point"),
                risk: RiskLevel::Unknown,
                supervisor_id: None,
                additional_supervisor_ids: Vec::new(),
                external_key: None,
                archived_at: None,
            })
            .expect("location stored")
    }

    #[tokio::test]
    async fn health_and_readiness_respond() {
        let (router, _) = app();
        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "ready");
    }

    #[tokio::test]
    async fn evaluate_route_runs_the_engine() {
        let (router, services) = app();
        let site = stored_location(&services, TenantId::new());

        let response = router
            .oneshot(
                Request::post(format!("/api/v1/locations/{}/evaluate", site.id))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"date":"2024-07-15"}"#))
                    .unwrap(),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["runs"], 1);
        assert_eq!(body["outcome"]["persisted"], true);
    }

    #[tokio::test]
    async fn unknown_location_maps_to_not_found() {
        let (router, _) = app();
        let response = router
            .oneshot(
                Request::post(format!("/api/v1/locations/{}/evaluate", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(read_json(response).await["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn ranking_route_returns_a_page() {
        let (router, services) = app();
        let tenant_id = TenantId::new();
        stored_location(&services, tenant_id);

        let request = json!({
            "tenant_id": tenant_id,
            "date": "2024-07-02",
            "today": "2024-07-01",
        });
        let response = router
            .oneshot(
                Request::post("/api/v1/rankings/locations")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&request).unwrap()))
                    .unwrap(),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["items"][0]["risk_level"], "UNKNOWN");
    }

    #[tokio::test]
    async fn configuration_routes_read_and_reject_bad_writes() {
        let (router, _) = app();
        let response = router
            .clone()
            .oneshot(
                Request::get("/api/v1/configurations/location")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        let mut config = read_json(response).await;
        assert_eq!(config["key"], "location");

        let response = router
            .clone()
            .oneshot(
                Request::get("/api/v1/configurations/spaceship")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        config["key"] = json!("activity");
        let response = router
            .oneshot(
                Request::put("/api/v1/configurations/location")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&config).unwrap()))
                    .unwrap(),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tiles_validate_coordinates() {
        let (router, _) = app();
        let tenant_id = TenantId::new();
        let response = router
            .clone()
            .oneshot(
                Request::get(format!("/api/v1/tiles/{tenant_id}/0/0/0"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!([]));

        let response = router
            .oneshot(
                Request::get(format!("/api/v1/tiles/{tenant_id}/2/9/0"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["code"], "INVALID_TILE");
    }
}
