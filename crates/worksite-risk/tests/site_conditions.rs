use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use worksite_risk::domain::{
    GeoPoint, LibrarySiteCondition, LibrarySiteConditionId, Location, LocationId, SiteCondition,
    SiteConditionId, SiteConditionOrigin, TenantId, UserId,
};
use worksite_risk::error::RepositoryError;
use worksite_risk::library::{InMemoryLibrary, LibraryCatalog, LibraryRepository};
use worksite_risk::ranking::RiskLevel;
use worksite_risk::site_conditions::{
    Classifier, EvaluatedRow, InMemorySiteConditionRepository, ReplaceSummary,
    SiteConditionError, SiteConditionRepository, SiteConditionsEngine,
};
use worksite_risk::world_data::{
    FixtureWorldDataClient, Precipitation, TemperatureRange, WeatherDay, WeatherSection,
    WorldDataResponse,
};

struct Harness {
    tenant_id: TenantId,
    location: Location,
    library: Arc<InMemoryLibrary>,
    repository: Arc<InMemorySiteConditionRepository>,
    world_data: Arc<FixtureWorldDataClient>,
    engine: SiteConditionsEngine<InMemorySiteConditionRepository>,
}

fn evaluation_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 15).expect("valid date")
}

fn library_entry(handle: &str, default_multiplier: f64) -> LibrarySiteCondition {
    LibrarySiteCondition {
        id: LibrarySiteConditionId::new(),
        handle_code: handle.to_string(),
        name: handle.replace('_', " "),
        default_multiplier,
        archived_at: None,
    }
}

fn weather(apparent_max: f64, precipitation_pct: f64) -> WorldDataResponse {
    WorldDataResponse {
        weather: Some(WeatherSection {
            day: WeatherDay {
                apparent_temperature: Some(TemperatureRange::new(apparent_max, 70.0)),
                precipitation: Some(Precipitation::new(precipitation_pct)),
                ..WeatherDay::default()
            },
            previous_day: Some(WeatherDay {
                precipitation: Some(Precipitation::new(0.0)),
                ..WeatherDay::default()
            }),
        }),
        ..WorldDataResponse::default()
    }
}

fn harness(entries: &[LibrarySiteCondition], response: WorldDataResponse) -> Harness {
    let tenant_id = TenantId::new();
    let library = Arc::new(InMemoryLibrary::default());
    for entry in entries {
        library
            .upsert_site_condition(entry.clone())
            .expect("library entry stored");
    }
    let catalog = Arc::new(LibraryCatalog::new(library.clone(), Duration::from_secs(60)));
    let repository = Arc::new(InMemorySiteConditionRepository::default());
    let world_data = Arc::new(FixtureWorldDataClient::new(response));
    let engine = SiteConditionsEngine::new(repository.clone(), world_data.clone(), catalog);
    let location = Location {
        id: LocationId::new(),
        tenant_id,
        work_package_id: None,
        name: "Trench 4".to_string(),
        address: None,
        geom: GeoPoint::new(40.0, -74.0).expect("valid point"),
        risk: RiskLevel::Unknown,
        supervisor_id: None,
        additional_supervisor_ids: Vec::new(),
        external_key: None,
        archived_at: None,
    };
    Harness {
        tenant_id,
        location,
        library,
        repository,
        world_data,
        engine,
    }
}

fn evaluated_multiplier(condition: &SiteCondition) -> Option<(f64, bool)> {
    match &condition.origin {
        SiteConditionOrigin::Evaluated {
            multiplier, alert, ..
        } => Some((*multiplier, *alert)),
        SiteConditionOrigin::Manual { .. } => None,
    }
}

#[tokio::test]
async fn heat_index_high_applies_with_default_multiplier() {
    let heat = library_entry("heat_index", 0.1);
    let h = harness(&[heat.clone()], weather(110.0, 0.0));

    let outcome = h
        .engine
        .evaluate_location(&h.location, evaluation_date())
        .await
        .expect("evaluation succeeds");

    let condition = outcome.find("heat_index").expect("heat index applies");
    assert!(condition.result.condition_applies);
    assert_eq!(condition.result.multiplier, 0.1);
    assert!(condition.result.alert);
    assert!(outcome.persisted);

    let rows = h
        .repository
        .evaluated_for(h.location.id, evaluation_date())
        .expect("rows readable");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].library_site_condition_id, heat.id);
    assert_eq!(evaluated_multiplier(&rows[0]), Some((0.1, true)));
    assert_eq!(
        rows[0].origin,
        SiteConditionOrigin::Evaluated {
            date: evaluation_date(),
            alert: true,
            multiplier: 0.1,
            details: serde_json::json!({
                "handle_code": "heat_index",
                "value": { "apparentTemperatureMax": 110.0 },
            }),
        }
    );
}

#[tokio::test]
async fn heat_index_borderline_uses_reduced_multiplier() {
    let h = harness(&[library_entry("heat_index", 0.1)], weather(95.0, 0.0));

    let outcome = h
        .engine
        .evaluate_location(&h.location, evaluation_date())
        .await
        .expect("evaluation succeeds");

    let condition = outcome.find("heat_index").expect("heat index applies");
    assert_eq!(condition.result.multiplier, 0.05);
    assert!(condition.result.alert);
}

#[tokio::test]
async fn heat_index_below_threshold_removes_prior_row() {
    let heat = library_entry("heat_index", 0.1);
    let h = harness(&[heat.clone()], weather(110.0, 0.0));
    h.engine
        .evaluate_location(&h.location, evaluation_date())
        .await
        .expect("first evaluation succeeds");
    assert_eq!(
        h.repository
            .evaluated_for(h.location.id, evaluation_date())
            .expect("rows readable")
            .len(),
        1
    );

    let cooler = weather(85.0, 0.0);
    let direct = Classifier::HeatIndex
        .classify(&heat, &cooler)
        .expect("classifies");
    assert!(!direct.condition_applies);
    assert_eq!(direct.multiplier, 0.0);
    assert!(!direct.alert);

    h.world_data.set_fallback(cooler);
    let outcome = h
        .engine
        .evaluate_location(&h.location, evaluation_date())
        .await
        .expect("second evaluation succeeds");

    assert!(outcome.find("heat_index").is_none());
    assert_eq!(outcome.changes.removed, 1);
    assert!(h
        .repository
        .evaluated_for(h.location.id, evaluation_date())
        .expect("rows readable")
        .is_empty());
}

#[tokio::test]
async fn manual_condition_suppresses_evaluated_twin() {
    let slip = library_entry("slip", 0.2);
    let heat = library_entry("heat_index", 0.1);
    let h = harness(&[slip.clone(), heat], weather(80.0, 90.0));
    h.repository
        .insert_manual(SiteCondition::manual(h.location.id, slip.id, UserId::new()))
        .expect("manual row stored");

    let outcome = h
        .engine
        .evaluate_location(&h.location, evaluation_date())
        .await
        .expect("evaluation succeeds");

    let slips: Vec<_> = outcome
        .conditions
        .iter()
        .filter(|condition| condition.library.handle_code == "slip")
        .collect();
    assert_eq!(slips.len(), 1);
    assert!(slips[0].manual);
    assert_eq!(slips[0].result.multiplier, 0.2);
    assert!(slips[0].result.alert);

    let evaluated = h
        .repository
        .evaluated_for(h.location.id, evaluation_date())
        .expect("rows readable");
    assert!(evaluated
        .iter()
        .all(|row| row.library_site_condition_id != slip.id));
}

#[tokio::test]
async fn one_evaluated_row_per_condition_and_repeat_runs_are_idempotent() {
    let entries = [library_entry("heat_index", 0.1), library_entry("slip", 0.2)];
    let h = harness(&entries, weather(105.0, 85.0));

    let first = h
        .engine
        .evaluate_location(&h.location, evaluation_date())
        .await
        .expect("first evaluation succeeds");
    let rows_after_first = h
        .repository
        .evaluated_for(h.location.id, evaluation_date())
        .expect("rows readable");

    let second = h
        .engine
        .evaluate_location(&h.location, evaluation_date())
        .await
        .expect("second evaluation succeeds");
    let mut rows_after_second = h
        .repository
        .evaluated_for(h.location.id, evaluation_date())
        .expect("rows readable");

    assert_eq!(first.conditions, second.conditions);
    assert_eq!(second.changes.changed(), 0);
    assert_eq!(second.changes.unchanged, 2);

    let mut rows_after_first = rows_after_first;
    rows_after_first.sort_by_key(|row| row.id);
    rows_after_second.sort_by_key(|row| row.id);
    assert_eq!(rows_after_first, rows_after_second);

    for entry in &entries {
        let matching = rows_after_second
            .iter()
            .filter(|row| row.library_site_condition_id == entry.id)
            .count();
        assert_eq!(matching, 1, "{} stored once", entry.handle_code);
    }
}

#[tokio::test]
async fn second_manual_row_is_rejected_until_the_first_is_archived() {
    let slip = library_entry("slip", 0.2);
    let h = harness(&[slip.clone()], weather(80.0, 0.0));

    let first = h
        .repository
        .insert_manual(SiteCondition::manual(h.location.id, slip.id, UserId::new()))
        .expect("first manual row stored");
    let duplicate =
        h.repository
            .insert_manual(SiteCondition::manual(h.location.id, slip.id, UserId::new()));
    assert!(duplicate.is_err());

    h.repository
        .archive(first.id, chrono::Utc::now())
        .expect("archived");
    h.repository
        .insert_manual(SiteCondition::manual(h.location.id, slip.id, UserId::new()))
        .expect("replacement manual row stored");
}

#[tokio::test]
async fn outage_returns_manual_set_without_writes() {
    let slip = library_entry("slip", 0.2);
    let heat = library_entry("heat_index", 0.1);
    let h = harness(&[slip.clone(), heat], weather(110.0, 0.0));
    h.engine
        .evaluate_location(&h.location, evaluation_date())
        .await
        .expect("baseline evaluation succeeds");
    h.repository
        .insert_manual(SiteCondition::manual(h.location.id, slip.id, UserId::new()))
        .expect("manual row stored");
    let before = h.repository.all();

    h.world_data.fail_with("connection refused");
    let outcome = h
        .engine
        .evaluate_location(&h.location, evaluation_date())
        .await
        .expect("outage is not an error");

    assert!(!outcome.persisted);
    assert!(outcome.upstream_error.is_some());
    assert_eq!(outcome.conditions.len(), 1);
    assert!(outcome.conditions[0].manual);
    assert_eq!(outcome.conditions[0].library.id, slip.id);

    let mut after = h.repository.all();
    let mut before = before;
    before.sort_by_key(|row| row.id);
    after.sort_by_key(|row| row.id);
    assert_eq!(before, after);
}

#[tokio::test]
async fn tenant_disabled_conditions_are_not_evaluated() {
    let heat = library_entry("heat_index", 0.1);
    let h = harness(&[heat.clone()], weather(110.0, 0.0));
    h.library
        .set_site_condition_enabled(h.tenant_id, heat.id, false)
        .expect("toggle stored");

    let outcome = h
        .engine
        .evaluate_location(&h.location, evaluation_date())
        .await
        .expect("evaluation succeeds");

    assert!(outcome.conditions.is_empty());
    assert_eq!(h.world_data.calls(), 0);
}

#[test]
fn classifiers_are_pure_functions_of_their_inputs() {
    let heat = library_entry("heat_index", 0.3);
    let data = weather(104.0, 0.0);
    let first = Classifier::HeatIndex.classify(&heat, &data).expect("classifies");
    for _ in 0..5 {
        assert_eq!(
            Classifier::HeatIndex.classify(&heat, &data).expect("classifies"),
            first
        );
    }
    assert_eq!(first.multiplier, 0.3);
}

/// Fails the first `conflicts` evaluated replaces, then defers to memory.
struct ConflictingRepository {
    inner: InMemorySiteConditionRepository,
    conflicts: AtomicUsize,
    replaces: AtomicUsize,
}

impl ConflictingRepository {
    fn new(conflicts: usize) -> Self {
        Self {
            inner: InMemorySiteConditionRepository::default(),
            conflicts: AtomicUsize::new(conflicts),
            replaces: AtomicUsize::new(0),
        }
    }
}

impl SiteConditionRepository for ConflictingRepository {
    fn site_condition(
        &self,
        id: SiteConditionId,
    ) -> Result<Option<SiteCondition>, RepositoryError> {
        self.inner.site_condition(id)
    }

    fn manual_for_location(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<SiteCondition>, RepositoryError> {
        self.inner.manual_for_location(location_id)
    }

    fn evaluated_for(
        &self,
        location_id: LocationId,
        date: NaiveDate,
    ) -> Result<Vec<SiteCondition>, RepositoryError> {
        self.inner.evaluated_for(location_id, date)
    }

    fn insert_manual(&self, condition: SiteCondition) -> Result<SiteCondition, RepositoryError> {
        self.inner.insert_manual(condition)
    }

    fn replace_evaluated(
        &self,
        location_id: LocationId,
        date: NaiveDate,
        rows: &[EvaluatedRow],
    ) -> Result<ReplaceSummary, RepositoryError> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Conflict(
                "concurrent evaluated write".to_string(),
            ));
        }
        self.inner.replace_evaluated(location_id, date, rows)
    }

    fn archive(&self, id: SiteConditionId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.inner.archive(id, at)
    }

    fn archive_for_location(
        &self,
        location_id: LocationId,
        at: DateTime<Utc>,
    ) -> Result<Vec<SiteConditionId>, RepositoryError> {
        self.inner.archive_for_location(location_id, at)
    }
}

fn conflicting_engine(
    conflicts: usize,
) -> (
    Harness,
    Arc<ConflictingRepository>,
    SiteConditionsEngine<ConflictingRepository>,
) {
    let h = harness(&[library_entry("heat_index", 0.1)], weather(110.0, 0.0));
    let repository = Arc::new(ConflictingRepository::new(conflicts));
    let catalog = Arc::new(LibraryCatalog::new(h.library.clone(), Duration::from_secs(60)));
    let engine = SiteConditionsEngine::new(repository.clone(), h.world_data.clone(), catalog);
    (h, repository, engine)
}

#[tokio::test]
async fn a_single_write_conflict_is_retried() {
    let (h, repository, engine) = conflicting_engine(1);

    let outcome = engine
        .evaluate_location(&h.location, evaluation_date())
        .await
        .expect("retry succeeds");
    assert!(outcome.persisted);
    assert!(outcome.find("heat_index").is_some());
    assert_eq!(repository.replaces.load(Ordering::SeqCst), 2);
    assert_eq!(
        repository
            .evaluated_for(h.location.id, evaluation_date())
            .expect("readable")
            .len(),
        1
    );
}

#[tokio::test]
async fn repeated_write_conflicts_surface_as_conflict() {
    let (h, repository, engine) = conflicting_engine(usize::MAX);

    let err = engine
        .evaluate_location(&h.location, evaluation_date())
        .await
        .expect_err("second conflict surfaces");
    assert!(matches!(
        err,
        SiteConditionError::Conflict { location_id, .. } if location_id == h.location.id
    ));
    assert_eq!(err.code(), "CONFLICT");
    assert_eq!(repository.replaces.load(Ordering::SeqCst), 2);
    assert!(repository
        .evaluated_for(h.location.id, evaluation_date())
        .expect("readable")
        .is_empty());
}
