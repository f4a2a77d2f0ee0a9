use std::io::Read;

use chrono::{DateTime, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use super::{ContractorRecord, IncidentRecord, ObservationRecord, SupervisorRecord};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("row {row}: {source}")]
    Csv {
        row: usize,
        #[source]
        source: csv::Error,
    },
    #[error("row {row}: invalid {field} '{value}'")]
    Field {
        row: usize,
        field: &'static str,
        value: String,
    },
}

fn read_rows<T, R>(reader: R) -> Result<Vec<(usize, T)>, ParseError>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();
    for (index, record) in csv_reader.deserialize::<T>().enumerate() {
        // Header is line 1.
        let row = index + 2;
        rows.push((row, record.map_err(|source| ParseError::Csv { row, source })?));
    }
    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct ContractorRow {
    #[serde(rename = "External ID")]
    external_key: String,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct SupervisorRow {
    #[serde(rename = "External ID")]
    external_key: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Email", default, deserialize_with = "empty_string_as_none")]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncidentRow {
    #[serde(rename = "External ID")]
    external_key: String,
    #[serde(rename = "Incident Date")]
    occurred_on: String,
    #[serde(rename = "Contractor ID", default, deserialize_with = "empty_string_as_none")]
    contractor_key: Option<String>,
    #[serde(rename = "Supervisor ID", default, deserialize_with = "empty_string_as_none")]
    supervisor_key: Option<String>,
    #[serde(rename = "Severity", default, deserialize_with = "empty_string_as_none")]
    severity: Option<String>,
    #[serde(rename = "Description", default, deserialize_with = "empty_string_as_none")]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObservationRow {
    #[serde(rename = "External ID")]
    external_key: String,
    #[serde(rename = "Observation Date")]
    observed_on: String,
    #[serde(rename = "Contractor ID", default, deserialize_with = "empty_string_as_none")]
    contractor_key: Option<String>,
    #[serde(rename = "Supervisor ID", default, deserialize_with = "empty_string_as_none")]
    supervisor_key: Option<String>,
    #[serde(rename = "Outcome", default, deserialize_with = "empty_string_as_none")]
    outcome: Option<String>,
}

pub fn parse_contractors<R: Read>(reader: R) -> Result<Vec<ContractorRecord>, ParseError> {
    Ok(read_rows::<ContractorRow, _>(reader)?
        .into_iter()
        .map(|(_, row)| ContractorRecord {
            external_key: row.external_key,
            name: normalize_name(&row.name),
        })
        .collect())
}

pub fn parse_supervisors<R: Read>(reader: R) -> Result<Vec<SupervisorRecord>, ParseError> {
    Ok(read_rows::<SupervisorRow, _>(reader)?
        .into_iter()
        .map(|(_, row)| SupervisorRecord {
            external_key: row.external_key,
            name: normalize_name(&row.name),
            email: row.email.map(|email| email.to_ascii_lowercase()),
        })
        .collect())
}

pub fn parse_incidents<R: Read>(reader: R) -> Result<Vec<IncidentRecord>, ParseError> {
    read_rows::<IncidentRow, _>(reader)?
        .into_iter()
        .map(|(row_number, row)| {
            Ok(IncidentRecord {
                occurred_on: parse_date(&row.occurred_on).ok_or_else(|| ParseError::Field {
                    row: row_number,
                    field: "Incident Date",
                    value: row.occurred_on.clone(),
                })?,
                external_key: row.external_key,
                contractor_key: row.contractor_key,
                supervisor_key: row.supervisor_key,
                severity: row.severity.map(|severity| normalize_name(&severity)),
                description: row.description,
            })
        })
        .collect()
}

pub fn parse_observations<R: Read>(reader: R) -> Result<Vec<ObservationRecord>, ParseError> {
    read_rows::<ObservationRow, _>(reader)?
        .into_iter()
        .map(|(row_number, row)| {
            Ok(ObservationRecord {
                observed_on: parse_date(&row.observed_on).ok_or_else(|| ParseError::Field {
                    row: row_number,
                    field: "Observation Date",
                    value: row.observed_on.clone(),
                })?,
                external_key: row.external_key,
                contractor_key: row.contractor_key,
                supervisor_key: row.supervisor_key,
                outcome: row.outcome.map(|outcome| normalize_name(&outcome)),
            })
        })
        .collect()
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

/// Strips zero-width characters and collapses whitespace.
pub(crate) fn normalize_name(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y"))
        .ok()
}
