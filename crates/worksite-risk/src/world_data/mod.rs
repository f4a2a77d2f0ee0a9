//! Typed client for the external location-intelligence ("world data") service.
//!
//! One bulk call carries any number of `(point, date, sources)` queries; the
//! response is keyed by the ordinal of each query. Sections the service could
//! not produce are omitted from the payload and surface as [`SectionNotFound`]
//! when a consumer asks for them.

mod client;
mod fixture;
mod sections;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::GeoPoint;

pub use client::HttpWorldDataClient;
pub use fixture::FixtureWorldDataClient;
pub use sections::{
    AirQualitySection, BuildingSection, CellCoverageSection, CrimeSection, PopulationSection,
    Precipitation, RoadwaySection, SlopeSection, TemperatureRange, WeatherAlert,
    WeatherAlertsSection, WeatherDay, WeatherSection, Wind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorldDataSource {
    Weather,
    AirQuality,
    Crime,
    Roadway,
    CellCoverage,
    Population,
    Building,
    WeatherAlerts,
    Slope,
}

impl WorldDataSource {
    pub const fn ordered() -> [Self; 9] {
        [
            Self::Weather,
            Self::AirQuality,
            Self::Crime,
            Self::Roadway,
            Self::CellCoverage,
            Self::Population,
            Self::Building,
            Self::WeatherAlerts,
            Self::Slope,
        ]
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::Weather => "weather",
            Self::AirQuality => "airQuality",
            Self::Crime => "crime",
            Self::Roadway => "roadway",
            Self::CellCoverage => "cellCoverage",
            Self::Population => "population",
            Self::Building => "building",
            Self::WeatherAlerts => "weatherAlerts",
            Self::Slope => "slope",
        }
    }
}

impl fmt::Display for WorldDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldDataQuery {
    pub point: GeoPoint,
    pub date: NaiveDate,
    pub sources: Vec<WorldDataSource>,
}

impl WorldDataQuery {
    pub fn all_sources(point: GeoPoint, date: NaiveDate) -> Self {
        Self {
            point,
            date,
            sources: WorldDataSource::ordered().to_vec(),
        }
    }
}

/// One response object per query. Absent sections are omitted, never null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldDataResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_quality: Option<AirQualitySection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crime: Option<CrimeSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roadway: Option<RoadwaySection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_coverage: Option<CellCoverageSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<PopulationSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<BuildingSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_alerts: Option<WeatherAlertsSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slope: Option<SlopeSection>,
}

fn section<T>(value: &Option<T>, source: WorldDataSource) -> Result<&T, SectionNotFound> {
    value
        .as_ref()
        .ok_or_else(|| SectionNotFound(source.key().to_string()))
}

impl WorldDataResponse {
    pub fn weather(&self) -> Result<&WeatherSection, SectionNotFound> {
        section(&self.weather, WorldDataSource::Weather)
    }

    pub fn air_quality(&self) -> Result<&AirQualitySection, SectionNotFound> {
        section(&self.air_quality, WorldDataSource::AirQuality)
    }

    pub fn crime(&self) -> Result<&CrimeSection, SectionNotFound> {
        section(&self.crime, WorldDataSource::Crime)
    }

    pub fn roadway(&self) -> Result<&RoadwaySection, SectionNotFound> {
        section(&self.roadway, WorldDataSource::Roadway)
    }

    pub fn cell_coverage(&self) -> Result<&CellCoverageSection, SectionNotFound> {
        section(&self.cell_coverage, WorldDataSource::CellCoverage)
    }

    pub fn population(&self) -> Result<&PopulationSection, SectionNotFound> {
        section(&self.population, WorldDataSource::Population)
    }

    pub fn building(&self) -> Result<&BuildingSection, SectionNotFound> {
        section(&self.building, WorldDataSource::Building)
    }

    pub fn weather_alerts(&self) -> Result<&WeatherAlertsSection, SectionNotFound> {
        section(&self.weather_alerts, WorldDataSource::WeatherAlerts)
    }

    pub fn slope(&self) -> Result<&SlopeSection, SectionNotFound> {
        section(&self.slope, WorldDataSource::Slope)
    }
}

/// In-band signal that a section (or a field inside one) was not returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("world data section '{0}' not found")]
pub struct SectionNotFound(pub String);

impl SectionNotFound {
    pub const CODE: &'static str = "SECTION_NOT_FOUND";
}

/// Transport-level failures. Every variant means the whole batch is unusable.
#[derive(Debug, thiserror::Error)]
pub enum WorldDataError {
    #[error("world data service unavailable: {0}")]
    Unavailable(String),
    #[error("world data request timed out")]
    Timeout,
    #[error("world data payload could not be decoded: {0}")]
    Decode(String),
    #[error("world data returned {found} responses for {expected} queries")]
    ResponseMismatch { expected: usize, found: usize },
}

impl WorldDataError {
    pub const CODE: &'static str = "UPSTREAM_UNAVAILABLE";
}

#[async_trait]
pub trait WorldDataClient: Send + Sync {
    /// Resolve every query in one round trip; the map is keyed by query ordinal.
    async fn location_bulk(
        &self,
        queries: &[WorldDataQuery],
    ) -> Result<BTreeMap<usize, WorldDataResponse>, WorldDataError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn omitted_sections_signal_not_found() {
        let response: WorldDataResponse = serde_json::from_value(json!({
            "crime": { "totalIndex": 250.0 }
        }))
        .expect("decodes");

        assert_eq!(response.crime().expect("crime present").total_index(), Ok(250.0));
        let missing = response.weather().expect_err("weather omitted");
        assert_eq!(missing, SectionNotFound("weather".to_string()));
    }

    #[test]
    fn sources_use_wire_names() {
        let encoded = serde_json::to_value(WorldDataSource::ordered()).expect("encodes");
        assert_eq!(
            encoded,
            json!([
                "weather",
                "airQuality",
                "crime",
                "roadway",
                "cellCoverage",
                "population",
                "building",
                "weatherAlerts",
                "slope"
            ])
        );
    }
}
