use crate::infra::Services;
use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use worksite_risk::config::AppConfig;
use worksite_risk::domain::{GeoPoint, Location, LocationId, TenantId};
use worksite_risk::error::AppError;
use worksite_risk::ingest::{DirectorySource, InMemoryIngestStore, Ingestor};
use worksite_risk::library::{
    InMemoryLibrary, LibraryReconciler, LibraryReferences, ReconcileManifest,
};
use worksite_risk::projects::ProjectRepository;
use worksite_risk::ranking::RiskLevel;
use worksite_risk::telemetry;
use worksite_risk::world_data::{
    FixtureWorldDataClient, HttpWorldDataClient, WorldDataClient, WorldDataResponse,
};

#[derive(Args, Debug)]
pub(crate) struct IngestArgs {
    /// Tenant that owns the imported rows
    #[arg(long)]
    pub(crate) tenant: Uuid,
    /// Path prefix shared by the four export files
    #[arg(long)]
    pub(crate) prefix: String,
    /// Directory the prefix is resolved against
    #[arg(long, default_value = ".")]
    pub(crate) root: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct ReconcileArgs {
    /// JSON manifest listing the expected hazards and controls
    #[arg(long)]
    pub(crate) manifest: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    #[arg(long, allow_hyphen_values = true)]
    pub(crate) lat: f64,
    #[arg(long, allow_hyphen_values = true)]
    pub(crate) lon: f64,
    /// Evaluation date (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) date: NaiveDate,
    /// Serve world data from this JSON payload instead of the configured endpoint
    #[arg(long)]
    pub(crate) fixture: Option<PathBuf>,
}

pub(crate) fn run_ingest(args: IngestArgs) -> Result<(), AppError> {
    init_telemetry()?;
    let ingestor = Ingestor::new(
        Arc::new(DirectorySource::new(args.root)),
        Arc::new(InMemoryIngestStore::default()),
    );
    let report = ingestor.run(TenantId(args.tenant), &args.prefix)?;
    info!(prefix = %args.prefix, "ingest finished");
    print_json(&report)
}

pub(crate) fn run_reconcile(args: ReconcileArgs) -> Result<(), AppError> {
    init_telemetry()?;
    let raw = std::fs::read_to_string(&args.manifest)?;
    let manifest: ReconcileManifest = serde_json::from_str(&raw)
        .map_err(|err| AppError::BadRequest(format!("invalid manifest: {err}")))?;

    let library = Arc::new(InMemoryLibrary::default());
    let references: Vec<Arc<dyn LibraryReferences>> = vec![library.clone()];
    let reconciler = LibraryReconciler::new(library, references);
    let reports = reconciler.reconcile_manifest(&manifest)?;
    print_json(&reports)
}

pub(crate) async fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;

    let world_data: Arc<dyn WorldDataClient> = match &args.fixture {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let response: WorldDataResponse = serde_json::from_str(&raw)
                .map_err(|err| AppError::BadRequest(format!("invalid fixture: {err}")))?;
            Arc::new(FixtureWorldDataClient::new(response))
        }
        None => Arc::new(HttpWorldDataClient::new(&config.world_data)?),
    };
    let services = Services::in_memory(&config, world_data)?;

    let location = services.projects.insert_location(Location {
        id: LocationId::new(),
        tenant_id: TenantId::new(),
        work_package_id: None,
        name: "Ad hoc evaluation".to_string(),
        address: None,
        geom: GeoPoint::new(args.lat, args.lon)?,
        risk: RiskLevel::Unknown,
        supervisor_id: None,
        additional_supervisor_ids: Vec::new(),
        external_key: None,
        archived_at: None,
    })?;
    let run = services
        .orchestrator
        .location_created(&location, args.date)
        .await?;
    print_json(&run)
}

fn init_telemetry() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{rendered}");
    Ok(())
}
