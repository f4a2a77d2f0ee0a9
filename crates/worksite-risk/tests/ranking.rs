use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use worksite_risk::domain::{
    Activity, ActivityId, ActivityStatus, GeoPoint, Location, LocationId, TenantId, WorkPackage,
    WorkPackageId, WorkPackageStatus,
};
use worksite_risk::metrics::{
    InMemoryRiskMetricRepository, MetricKind, RiskMetric, RiskMetricRepository, RiskMetricStore,
};
use worksite_risk::projects::{InMemoryProjectRepository, ProjectRepository};
use worksite_risk::ranking::{
    Pagination, RankingFilters, RankingOrder, RankingQuery, RiskLevel, RiskRankingProjector,
    RiskThresholds, ThresholdRegistry,
};

type Projector = RiskRankingProjector<InMemoryProjectRepository, InMemoryRiskMetricRepository>;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 1).expect("valid date")
}

struct World {
    tenant_id: TenantId,
    projects: Arc<InMemoryProjectRepository>,
    metrics: Arc<InMemoryRiskMetricRepository>,
    thresholds: Arc<ThresholdRegistry>,
    projector: Projector,
}

fn world() -> World {
    let projects = Arc::new(InMemoryProjectRepository::default());
    let metrics = Arc::new(InMemoryRiskMetricRepository::default());
    let thresholds = Arc::new(ThresholdRegistry::new(
        RiskThresholds::new(100.0, 250.0).expect("ordered thresholds"),
    ));
    let projector = RiskRankingProjector::new(
        projects.clone(),
        RiskMetricStore::new(metrics.clone()),
        thresholds.clone(),
        14,
    );
    World {
        tenant_id: TenantId::new(),
        projects,
        metrics,
        thresholds,
        projector,
    }
}

impl World {
    fn work_package(&self, name: &str, start: NaiveDate, end: NaiveDate) -> WorkPackage {
        self.projects
            .insert_work_package(WorkPackage {
                id: WorkPackageId::new(),
                tenant_id: self.tenant_id,
                name: name.to_string(),
                external_key: None,
                work_package_type: None,
                start_date: start,
                end_date: end,
                status: WorkPackageStatus::Active,
                region_id: None,
                division_id: None,
                contractor_id: None,
                work_types: Vec::new(),
                assigned_user_ids: Vec::new(),
                archived_at: None,
            })
            .expect("work package stored")
    }

    fn location(&self, name: &str, work_package_id: Option<WorkPackageId>) -> Location {
        self.projects
            .insert_location(Location {
                id: LocationId::new(),
                tenant_id: self.tenant_id,
                work_package_id,
                name: name.to_string(),
                address: None,
                geom: GeoPoint::new(40.0, -74.0).expect("valid point"),
                risk: RiskLevel::Unknown,
                supervisor_id: None,
                additional_supervisor_ids: Vec::new(),
                external_key: None,
                archived_at: None,
            })
            .expect("location stored")
    }

    fn activity(&self, location_id: LocationId, start: NaiveDate, end: NaiveDate) -> Activity {
        self.projects
            .insert_activity(Activity {
                id: ActivityId::new(),
                tenant_id: self.tenant_id,
                location_id,
                name: "Excavation".to_string(),
                start_date: start,
                end_date: end,
                status: ActivityStatus::InProgress,
                crew: None,
                external_key: None,
                archived_at: None,
            })
            .expect("activity stored")
    }

    fn score(
        &self,
        kind: MetricKind,
        entity_id: uuid::Uuid,
        date: NaiveDate,
        value: f64,
        hour: u32,
    ) {
        self.metrics
            .append(RiskMetric {
                kind,
                entity_id,
                date,
                value,
                calculated_at: Utc
                    .with_ymd_and_hms(2024, 6, 30, hour, 0, 0)
                    .single()
                    .expect("valid timestamp"),
            })
            .expect("metric appended");
    }

    fn query(&self, date: NaiveDate) -> RankingQuery {
        RankingQuery {
            tenant_id: self.tenant_id,
            date,
            filters: RankingFilters::default(),
            order: RankingOrder::RiskLevelDesc,
            pagination: Pagination::default(),
        }
    }
}

#[test]
fn missing_metric_is_recalculating_only_inside_the_horizon() {
    let w = world();
    let package = w.work_package("North Corridor", today(), today() + Duration::days(60));
    let site = w.location("Pump station", Some(package.id));
    w.activity(site.id, today(), today() + Duration::days(60));

    for (offset, expected) in [
        (5, RiskLevel::Recalculating),
        (13, RiskLevel::Recalculating),
        (14, RiskLevel::Unknown),
        (30, RiskLevel::Unknown),
        (40, RiskLevel::Unknown),
    ] {
        let date = today() + Duration::days(offset);
        let level = w
            .projector
            .work_package_level(package.id, date, today())
            .expect("level derived")
            .level;
        assert_eq!(level, expected, "offset {offset}");
    }
}

#[test]
fn work_package_without_active_tasks_is_unknown() {
    let w = world();
    let package = w.work_package("Idle", today(), today() + Duration::days(60));
    w.location("Empty lot", Some(package.id));

    let level = w
        .projector
        .work_package_level(package.id, today() + Duration::days(3), today())
        .expect("level derived")
        .level;
    assert_eq!(level, RiskLevel::Unknown);
}

#[test]
fn latest_calculation_wins_and_bands_apply() {
    let w = world();
    let package = w.work_package("South", today(), today() + Duration::days(30));
    let site = w.location("Substation", Some(package.id));
    w.activity(site.id, today(), today() + Duration::days(30));
    let date = today() + Duration::days(2);

    w.score(MetricKind::LocationTotal, site.id.0, date, 300.0, 8);
    w.score(MetricKind::LocationTotal, site.id.0, date, 120.0, 9);

    let projection = w
        .projector
        .location_level(site.id, date, today())
        .expect("level derived");
    assert_eq!(projection.level, RiskLevel::Medium);
    assert_eq!(projection.ordinal, 3);
    assert_eq!(projection.value, Some(120.0));

    w.thresholds.set(
        w.tenant_id,
        MetricKind::LocationTotal,
        RiskThresholds::new(50.0, 110.0).expect("ordered thresholds"),
    );
    let projection = w
        .projector
        .location_level(site.id, date, today())
        .expect("level derived");
    assert_eq!(projection.level, RiskLevel::High);
}

#[test]
fn levels_do_not_depend_on_filters_or_pagination() {
    let w = world();
    let package = w.work_package("Grid", today(), today() + Duration::days(30));
    let date = today() + Duration::days(1);
    let mut sites = Vec::new();
    for (index, value) in [40.0, 180.0, 400.0, 90.0, 260.0].into_iter().enumerate() {
        let site = w.location(&format!("Site {index}"), Some(package.id));
        w.activity(site.id, today(), today() + Duration::days(30));
        w.score(MetricKind::LocationTotal, site.id.0, date, value, 10);
        sites.push(site);
    }
    let idle = w.location("Site idle", Some(package.id));
    sites.push(idle);

    let full = w
        .projector
        .rank_locations(&w.query(date), today())
        .expect("ranking succeeds");
    assert_eq!(full.total, 6);
    let levels: Vec<RiskLevel> = full.items.iter().map(|row| row.risk_level).collect();
    assert_eq!(
        levels,
        vec![
            RiskLevel::High,
            RiskLevel::High,
            RiskLevel::Medium,
            RiskLevel::Low,
            RiskLevel::Low,
            RiskLevel::Unknown,
        ]
    );

    let mut paged = Vec::new();
    let mut cursor = None;
    loop {
        let mut query = w.query(date);
        query.pagination = Pagination::Seek {
            after: cursor,
            limit: 2,
        };
        let page = w
            .projector
            .rank_locations(&query, today())
            .expect("page loads");
        paged.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(paged.len(), 6);
    for row in &paged {
        let same = full
            .items
            .iter()
            .find(|candidate| candidate.location_id == row.location_id)
            .expect("row present in full listing");
        assert_eq!(same.risk_level, row.risk_level);
    }
    assert!(paged
        .windows(2)
        .all(|pair| pair[0].location_id < pair[1].location_id));

    let mut filtered = w.query(date);
    filtered.filters.risk_levels = Some(vec![RiskLevel::High]);
    filtered.filters.search = Some("site".to_string());
    let high = w
        .projector
        .rank_locations(&filtered, today())
        .expect("filtered ranking succeeds");
    assert_eq!(high.total, 2);
    assert!(high.items.iter().all(|row| row.risk_level == RiskLevel::High));
}

#[test]
fn rankings_use_one_bulk_metric_load_per_query() {
    let w = world();
    let package = w.work_package("Bulk", today(), today() + Duration::days(30));
    for index in 0..4 {
        w.location(&format!("Bulk {index}"), Some(package.id));
    }
    let before = w.metrics.bulk_calls();
    w.projector
        .rank_locations(&w.query(today()), today())
        .expect("ranking succeeds");
    assert_eq!(w.metrics.bulk_calls(), before + 1);
}
