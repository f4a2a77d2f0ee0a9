use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use worksite_risk::clustering::ClusterIndex;
use worksite_risk::config::AppConfig;
use worksite_risk::configurations::{ConfigurationStore, InMemoryConfigurationRepository};
use worksite_risk::domain::{LibrarySiteCondition, LibrarySiteConditionId};
use worksite_risk::error::RepositoryError;
use worksite_risk::library::{InMemoryLibrary, LibraryCatalog, LibraryRepository};
use worksite_risk::metrics::{InMemoryRiskMetricRepository, RiskMetricStore};
use worksite_risk::orchestrator::EvaluationOrchestrator;
use worksite_risk::projects::InMemoryProjectRepository;
use worksite_risk::ranking::{InMemoryRiskEvents, RiskRankingProjector, ThresholdRegistry};
use worksite_risk::site_conditions::{
    Classifier, InMemorySiteConditionRepository, SiteConditionsEngine,
};
use worksite_risk::world_data::WorldDataClient;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Orchestrator =
    EvaluationOrchestrator<InMemorySiteConditionRepository, InMemoryProjectRepository>;
pub(crate) type Projector =
    RiskRankingProjector<InMemoryProjectRepository, InMemoryRiskMetricRepository>;

/// Engines wired over the in-memory repositories.
pub(crate) struct Services {
    pub(crate) projects: Arc<InMemoryProjectRepository>,
    pub(crate) metrics: Arc<InMemoryRiskMetricRepository>,
    pub(crate) library: Arc<InMemoryLibrary>,
    pub(crate) configurations: Arc<ConfigurationStore>,
    pub(crate) orchestrator: Arc<Orchestrator>,
    pub(crate) projector: Arc<Projector>,
}

impl Services {
    pub(crate) fn in_memory(
        config: &AppConfig,
        world_data: Arc<dyn WorldDataClient>,
    ) -> Result<Self, RepositoryError> {
        let projects = Arc::new(InMemoryProjectRepository::default());
        let metrics = Arc::new(InMemoryRiskMetricRepository::default());
        let library = Arc::new(InMemoryLibrary::default());
        seed_site_condition_library(&library)?;

        let configurations = Arc::new(ConfigurationStore::new(
            Arc::new(InMemoryConfigurationRepository::default()),
            config.caches.configuration_ttl,
        ));
        let catalog = Arc::new(LibraryCatalog::new(library.clone(), config.caches.library_ttl));
        let engine = Arc::new(SiteConditionsEngine::new(
            Arc::new(InMemorySiteConditionRepository::default()),
            world_data,
            catalog,
        ));
        let orchestrator = Arc::new(EvaluationOrchestrator::new(
            engine,
            projects.clone(),
            Arc::new(ClusterIndex::new(config.clustering)),
            Arc::new(InMemoryRiskEvents::default()),
        ));
        let projector = Arc::new(RiskRankingProjector::new(
            projects.clone(),
            RiskMetricStore::new(metrics.clone()),
            Arc::new(ThresholdRegistry::new(config.risk.default_thresholds)),
            config.risk.recalculation_horizon_days,
        ));

        Ok(Self {
            projects,
            metrics,
            library,
            configurations,
            orchestrator,
            projector,
        })
    }
}

/// One library row per known classifier, at the standard multiplier.
pub(crate) fn seed_site_condition_library(
    library: &InMemoryLibrary,
) -> Result<(), RepositoryError> {
    for classifier in Classifier::ordered() {
        let handle_code = classifier.handle_code();
        library.upsert_site_condition(LibrarySiteCondition {
            id: LibrarySiteConditionId::new(),
            handle_code: handle_code.to_string(),
            name: display_name(handle_code),
            default_multiplier: 0.1,
            archived_at: None,
        })?;
    }
    Ok(())
}

fn display_name(handle_code: &str) -> String {
    handle_code
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn deserialize_optional_date<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.map(|value| parse_date(&value).map_err(serde::de::Error::custom))
        .transpose()
}
