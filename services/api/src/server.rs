use crate::cli::ServeArgs;
use crate::infra::{AppState, Services};
use crate::routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use worksite_risk::config::AppConfig;
use worksite_risk::error::AppError;
use worksite_risk::telemetry;
use worksite_risk::world_data::HttpWorldDataClient;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let world_data = Arc::new(HttpWorldDataClient::new(&config.world_data)?);
    let services = Services::in_memory(&config, world_data)?;

    let app = routes::router(Arc::new(services))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        world_data = %config.world_data.endpoint,
        "worksite risk service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
