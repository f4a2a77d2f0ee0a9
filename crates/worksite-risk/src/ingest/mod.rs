//! One-shot CSV ingestion of contractors, supervisors, incidents and
//! observations from a storage prefix, upserted by `(tenant, external_key)`.

mod parser;
mod source;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::TenantId;
use crate::error::RepositoryError;

pub use parser::{
    parse_contractors, parse_incidents, parse_observations, parse_supervisors, ParseError,
};
pub use source::{CsvSource, DirectorySource, InMemorySource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractorRecord {
    pub external_key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorRecord {
    pub external_key: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub external_key: String,
    pub occurred_on: NaiveDate,
    pub contractor_key: Option<String>,
    pub supervisor_key: Option<String>,
    pub severity: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub external_key: String,
    pub observed_on: NaiveDate,
    pub contractor_key: Option<String>,
    pub supervisor_key: Option<String>,
    pub outcome: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Contractor,
    Supervisor,
    Incident,
    Observation,
}

impl RecordKind {
    /// Load order: referenced rows first.
    pub const fn ordered() -> [Self; 4] {
        [
            Self::Contractor,
            Self::Supervisor,
            Self::Incident,
            Self::Observation,
        ]
    }

    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Contractor => "contractors.csv",
            Self::Supervisor => "supervisors.csv",
            Self::Incident => "incidents.csv",
            Self::Observation => "observations.csv",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestRecord {
    Contractor(ContractorRecord),
    Supervisor(SupervisorRecord),
    Incident(IncidentRecord),
    Observation(ObservationRecord),
}

impl IngestRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Contractor(_) => RecordKind::Contractor,
            Self::Supervisor(_) => RecordKind::Supervisor,
            Self::Incident(_) => RecordKind::Incident,
            Self::Observation(_) => RecordKind::Observation,
        }
    }

    pub fn external_key(&self) -> &str {
        match self {
            Self::Contractor(record) => &record.external_key,
            Self::Supervisor(record) => &record.external_key,
            Self::Incident(record) => &record.external_key,
            Self::Observation(record) => &record.external_key,
        }
    }

    fn references(&self) -> (Option<&str>, Option<&str>) {
        match self {
            Self::Incident(record) => (
                record.contractor_key.as_deref(),
                record.supervisor_key.as_deref(),
            ),
            Self::Observation(record) => (
                record.contractor_key.as_deref(),
                record.supervisor_key.as_deref(),
            ),
            _ => (None, None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

pub trait IngestStore: Send + Sync {
    fn upsert(&self, tenant_id: TenantId, record: IngestRecord)
        -> Result<UpsertOutcome, RepositoryError>;
    fn external_keys(
        &self,
        tenant_id: TenantId,
        kind: RecordKind,
    ) -> Result<HashSet<String>, RepositoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryIngestStore {
    rows: Mutex<HashMap<(TenantId, RecordKind, String), IngestRecord>>,
}

impl InMemoryIngestStore {
    pub fn records(&self, tenant_id: TenantId, kind: RecordKind) -> Vec<IngestRecord> {
        self.rows
            .lock()
            .expect("ingest mutex poisoned")
            .iter()
            .filter(|((tenant, row_kind, _), _)| *tenant == tenant_id && *row_kind == kind)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

impl IngestStore for InMemoryIngestStore {
    fn upsert(
        &self,
        tenant_id: TenantId,
        record: IngestRecord,
    ) -> Result<UpsertOutcome, RepositoryError> {
        let key = (tenant_id, record.kind(), record.external_key().to_string());
        let mut rows = self.rows.lock().expect("ingest mutex poisoned");
        let outcome = match rows.get(&key) {
            Some(existing) if *existing == record => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };
        rows.insert(key, record);
        Ok(outcome)
    }

    fn external_keys(
        &self,
        tenant_id: TenantId,
        kind: RecordKind,
    ) -> Result<HashSet<String>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .expect("ingest mutex poisoned")
            .keys()
            .filter(|(tenant, row_kind, _)| *tenant == tenant_id && *row_kind == kind)
            .map(|(_, _, key)| key.clone())
            .collect())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub counts: BTreeMap<RecordKind, KindCounts>,
    pub missing_files: Vec<String>,
    /// `"<record key> -> <referenced key>"` for references to unknown rows.
    pub unresolved_references: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },
    #[error("{path} repeats external key '{external_key}'")]
    DuplicateExternalKey { path: String, external_key: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "INGEST_IO",
            Self::Parse { .. } => "VALIDATION",
            Self::DuplicateExternalKey { .. } => "DUPLICATE_EXTERNAL_KEY",
            Self::Repository(err) => err.code(),
        }
    }
}

pub struct Ingestor {
    source: Arc<dyn CsvSource>,
    store: Arc<dyn IngestStore>,
}

impl Ingestor {
    pub fn new(source: Arc<dyn CsvSource>, store: Arc<dyn IngestStore>) -> Self {
        Self { source, store }
    }

    fn load(
        &self,
        prefix: &str,
        kind: RecordKind,
    ) -> Result<Option<Vec<IngestRecord>>, IngestError> {
        let path = format!("{}/{}", prefix.trim_end_matches('/'), kind.file_name());
        let Some(reader) = self.source.open(&path).map_err(|source| IngestError::Io {
            path: path.clone(),
            source,
        })?
        else {
            return Ok(None);
        };

        let parsed = match kind {
            RecordKind::Contractor => parse_contractors(reader)
                .map(|rows| rows.into_iter().map(IngestRecord::Contractor).collect()),
            RecordKind::Supervisor => parse_supervisors(reader)
                .map(|rows| rows.into_iter().map(IngestRecord::Supervisor).collect()),
            RecordKind::Incident => parse_incidents(reader)
                .map(|rows| rows.into_iter().map(IngestRecord::Incident).collect()),
            RecordKind::Observation => parse_observations(reader)
                .map(|rows| rows.into_iter().map(IngestRecord::Observation).collect()),
        };
        let records: Vec<IngestRecord> = parsed.map_err(|source| IngestError::Parse {
            path: path.clone(),
            source,
        })?;

        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(record.external_key()) {
                return Err(IngestError::DuplicateExternalKey {
                    path,
                    external_key: record.external_key().to_string(),
                });
            }
        }
        Ok(Some(records))
    }

    /// Parses every file before writing anything, then upserts in reference
    /// order. Missing files are skipped and reported.
    pub fn run(&self, tenant_id: TenantId, prefix: &str) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();
        let mut batches = Vec::new();
        for kind in RecordKind::ordered() {
            match self.load(prefix, kind)? {
                Some(records) => batches.push((kind, records)),
                None => {
                    warn!(
                        %tenant_id,
                        prefix,
                        file = kind.file_name(),
                        "ingest file missing; skipping"
                    );
                    report.missing_files.push(kind.file_name().to_string());
                }
            }
        }

        for (kind, records) in batches {
            let counts = report.counts.entry(kind).or_default();
            for record in records {
                let (contractor, supervisor) = record.references();
                let dangling: Vec<String> = [
                    (RecordKind::Contractor, contractor),
                    (RecordKind::Supervisor, supervisor),
                ]
                .into_iter()
                .filter_map(|(referenced, key)| key.map(|key| (referenced, key)))
                .filter_map(|(referenced, key)| {
                    match self.store.external_keys(tenant_id, referenced) {
                        Ok(known) if known.contains(key) => None,
                        Ok(_) => Some(Ok(format!("{} -> {key}", record.external_key()))),
                        Err(err) => Some(Err(err)),
                    }
                })
                .collect::<Result<_, _>>()?;
                report.unresolved_references.extend(dangling);

                match self.store.upsert(tenant_id, record)? {
                    UpsertOutcome::Inserted => counts.inserted += 1,
                    UpsertOutcome::Updated => counts.updated += 1,
                    UpsertOutcome::Unchanged => counts.unchanged += 1,
                }
            }
        }

        info!(
            %tenant_id,
            prefix,
            missing = report.missing_files.len(),
            unresolved = report.unresolved_references.len(),
            "ingest finished"
        );
        Ok(report)
    }
}
