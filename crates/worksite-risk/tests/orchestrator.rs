use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;
use worksite_risk::clustering::{ClusterIndex, TileFeature};
use worksite_risk::config::ClusterConfig;
use worksite_risk::domain::{
    GeoPoint, LibrarySiteCondition, LibrarySiteConditionId, Location, LocationId, TenantId,
};
use worksite_risk::library::{InMemoryLibrary, LibraryCatalog, LibraryRepository};
use worksite_risk::orchestrator::{EvaluationOrchestrator, EvaluationRun, Trigger};
use worksite_risk::projects::{InMemoryProjectRepository, ProjectRepository};
use worksite_risk::ranking::{InMemoryRiskEvents, RiskEvent, RiskLevel};
use worksite_risk::site_conditions::{InMemorySiteConditionRepository, SiteConditionsEngine};
use worksite_risk::world_data::{
    TemperatureRange, WeatherDay, WeatherSection, WorldDataClient, WorldDataError, WorldDataQuery,
    WorldDataResponse,
};

/// Blocks the first call until released so a second trigger can overlap it.
struct GatedClient {
    response: WorldDataResponse,
    calls: AtomicUsize,
    entered: Notify,
    release: Notify,
}

impl GatedClient {
    fn new(response: WorldDataResponse) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl WorldDataClient for GatedClient {
    async fn location_bulk(
        &self,
        queries: &[WorldDataQuery],
    ) -> Result<BTreeMap<usize, WorldDataResponse>, WorldDataError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok((0..queries.len())
            .map(|ordinal| (ordinal, self.response.clone()))
            .collect())
    }
}

type Orchestrator =
    EvaluationOrchestrator<InMemorySiteConditionRepository, InMemoryProjectRepository>;

struct Setup {
    tenant_id: TenantId,
    projects: Arc<InMemoryProjectRepository>,
    client: Arc<GatedClient>,
    events: Arc<InMemoryRiskEvents>,
    orchestrator: Orchestrator,
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 8, 2).expect("valid date")
}

fn hot_day() -> WorldDataResponse {
    WorldDataResponse {
        weather: Some(WeatherSection {
            day: WeatherDay {
                apparent_temperature: Some(TemperatureRange::new(108.0, 80.0)),
                ..WeatherDay::default()
            },
            previous_day: None,
        }),
        ..WorldDataResponse::default()
    }
}

fn setup() -> Setup {
    let library = Arc::new(InMemoryLibrary::default());
    library
        .upsert_site_condition(LibrarySiteCondition {
            id: LibrarySiteConditionId::new(),
            handle_code: "heat_index".to_string(),
            name: "Heat index".to_string(),
            default_multiplier: 0.1,
            archived_at: None,
        })
        .expect("library entry stored");
    let catalog = Arc::new(LibraryCatalog::new(library, Duration::from_secs(60)));
    let client = Arc::new(GatedClient::new(hot_day()));
    let engine = Arc::new(SiteConditionsEngine::new(
        Arc::new(InMemorySiteConditionRepository::default()),
        client.clone(),
        catalog,
    ));
    let projects = Arc::new(InMemoryProjectRepository::default());
    let clusters = Arc::new(ClusterIndex::new(ClusterConfig {
        max_zoom: 16,
        cell_bits: 2,
    }));
    let events = Arc::new(InMemoryRiskEvents::default());
    let orchestrator =
        EvaluationOrchestrator::new(engine, projects.clone(), clusters, events.clone());
    Setup {
        tenant_id: TenantId::new(),
        projects,
        client,
        events,
        orchestrator,
    }
}

impl Setup {
    fn location(&self, lat: f64, lon: f64) -> Location {
        self.projects
            .insert_location(Location {
                id: LocationId::new(),
                tenant_id: self.tenant_id,
                work_package_id: None,
                name: "Compressor yard".to_string(),
                address: None,
                geom: GeoPoint::new(lat, lon).expect("valid point"),
                risk: RiskLevel::Unknown,
                supervisor_id: None,
                additional_supervisor_ids: Vec::new(),
                external_key: None,
                archived_at: None,
            })
            .expect("location stored")
    }

    fn site_condition_events(&self) -> usize {
        self.events
            .events()
            .iter()
            .filter(|event| matches!(event, RiskEvent::ProjectLocationSiteConditionsChanged { .. }))
            .count()
    }
}

#[tokio::test]
async fn overlapping_triggers_coalesce_into_one_rerun() {
    let s = setup();
    let site = s.location(35.2, -101.8);

    let holder = s.orchestrator.evaluate(site.id, date(), Trigger::Explicit);
    let latecomer = async {
        s.client.entered.notified().await;
        let run = s
            .orchestrator
            .evaluate(site.id, date(), Trigger::GeometryChanged)
            .await;
        s.client.release.notify_one();
        run
    };
    let (held, late) = tokio::join!(holder, latecomer);

    assert_eq!(late.expect("coalesced run"), EvaluationRun::Coalesced);
    match held.expect("holder completes") {
        EvaluationRun::Completed { outcome, runs } => {
            assert_eq!(runs, 2);
            assert!(outcome.persisted);
            assert!(outcome.find("heat_index").is_some());
        }
        other => panic!("unexpected run: {other:?}"),
    }
    assert_eq!(s.client.calls.load(Ordering::SeqCst), 2);
    assert_eq!(s.site_condition_events(), 1);

    let again = s
        .orchestrator
        .reevaluate(site.id, date())
        .await
        .expect("slot released");
    assert!(matches!(again, EvaluationRun::Completed { runs: 1, .. }));
}

#[tokio::test]
async fn created_locations_are_indexed_and_evaluated() {
    let s = setup();
    s.client.release.notify_one();
    let site = s.location(47.6, -122.3);

    let run = s
        .orchestrator
        .location_created(&site, date())
        .await
        .expect("evaluation runs");
    assert!(matches!(run, EvaluationRun::Completed { .. }));
    assert!(s.events.events().contains(&RiskEvent::LocationChanged {
        tenant_id: s.tenant_id,
        location_id: site.id,
    }));
    assert_eq!(s.site_condition_events(), 1);

    let features = s
        .orchestrator
        .clusters()
        .tile_query(s.tenant_id, 0, 0, 0)
        .expect("valid tile");
    assert_eq!(
        features,
        vec![TileFeature::Point {
            location_id: site.id,
            point: site.geom,
        }]
    );

    s.orchestrator.location_archived(s.tenant_id, site.id);
    assert!(s
        .orchestrator
        .clusters()
        .tile_query(s.tenant_id, 0, 0, 0)
        .expect("valid tile")
        .is_empty());
}

#[tokio::test]
async fn only_geometry_changes_trigger_reevaluation() {
    let s = setup();
    s.client.release.notify_one();
    let before = s.location(40.7, -74.0);

    let mut renamed = before.clone();
    renamed.name = "Renamed yard".to_string();
    let run = s
        .orchestrator
        .location_updated(&before, &renamed, date())
        .await
        .expect("update handled");
    assert!(run.is_none());
    assert_eq!(s.client.calls.load(Ordering::SeqCst), 0);

    let mut moved = before.clone();
    moved.geom = GeoPoint::new(40.8, -74.1).expect("valid point");
    s.projects.update_location(moved.clone()).expect("stored");
    let run = s
        .orchestrator
        .location_updated(&before, &moved, date())
        .await
        .expect("update handled");
    assert!(matches!(run, Some(EvaluationRun::Completed { .. })));
}

#[tokio::test]
async fn library_change_reevaluates_live_locations_and_collects_failures() {
    let s = setup();
    s.client.release.notify_one();
    s.location(33.4, -112.0);
    s.location(33.5, -112.1);
    let mut archived = s.location(33.6, -112.2);
    archived.archived_at = Some(chrono::Utc::now());
    s.projects.update_location(archived).expect("stored");

    let report = s
        .orchestrator
        .library_changed(s.tenant_id, date())
        .await
        .expect("batch runs");
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.coalesced, 0);
    assert!(report.failed.is_empty());

    let missing = s
        .orchestrator
        .reevaluate(LocationId::new(), date())
        .await
        .expect_err("unknown location");
    assert_eq!(missing.code(), "NOT_FOUND");
}
