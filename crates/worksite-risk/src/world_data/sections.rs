//! Response sections. Every scalar is optional on the wire: a field the
//! service leaves out (or sends as `null`) surfaces as [`SectionNotFound`]
//! for the classifiers that read it, and never fails the whole payload.

use serde::{Deserialize, Serialize};

use super::SectionNotFound;

fn field<T: Copy>(value: Option<T>, path: &str) -> Result<T, SectionNotFound> {
    value.ok_or_else(|| SectionNotFound(path.to_string()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
}

impl TemperatureRange {
    pub fn new(max: f64, min: f64) -> Self {
        Self {
            max: Some(max),
            min: Some(min),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Precipitation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_pct: Option<f64>,
}

impl Precipitation {
    pub fn new(probability_pct: f64) -> Self {
        Self {
            probability_pct: Some(probability_pct),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gust: Option<f64>,
}

impl Wind {
    pub fn new(speed: f64, gust: f64) -> Self {
        Self {
            speed: Some(speed),
            gust: Some(gust),
        }
    }
}

/// Daily forecast/observation for the queried point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherDay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apparent_temperature: Option<TemperatureRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<TemperatureRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precipitation: Option<Precipitation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind: Option<Wind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_pct: Option<f64>,
}

/// Scalar accessors; `path` names the day (`weather.day`, `weather.previousDay`).
impl WeatherDay {
    pub fn apparent_max(&self, path: &str) -> Result<f64, SectionNotFound> {
        let range = field(self.apparent_temperature, &format!("{path}.apparentTemperature"))?;
        field(range.max, &format!("{path}.apparentTemperature.max"))
    }

    pub fn temperature_min(&self, path: &str) -> Result<f64, SectionNotFound> {
        let range = field(self.temperature, &format!("{path}.temperature"))?;
        field(range.min, &format!("{path}.temperature.min"))
    }

    pub fn precipitation_pct(&self, path: &str) -> Result<f64, SectionNotFound> {
        let precipitation = field(self.precipitation, &format!("{path}.precipitation"))?;
        field(
            precipitation.probability_pct,
            &format!("{path}.precipitation.probabilityPct"),
        )
    }

    pub fn wind_gust(&self, path: &str) -> Result<f64, SectionNotFound> {
        let wind = field(self.wind, &format!("{path}.wind"))?;
        field(wind.gust, &format!("{path}.wind.gust"))
    }

    pub fn wind_speed(&self, path: &str) -> Result<f64, SectionNotFound> {
        let wind = field(self.wind, &format!("{path}.wind"))?;
        field(wind.speed, &format!("{path}.wind.speed"))
    }

    pub fn humidity_pct(&self, path: &str) -> Result<f64, SectionNotFound> {
        field(self.humidity_pct, &format!("{path}.humidityPct"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSection {
    /// An absent day reads as a day with every field missing.
    #[serde(default)]
    pub day: WeatherDay,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_day: Option<WeatherDay>,
}

impl WeatherSection {
    pub fn previous_day(&self) -> Result<&WeatherDay, SectionNotFound> {
        self.previous_day
            .as_ref()
            .ok_or_else(|| SectionNotFound("weather.previousDay".to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirQualitySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aqi_value: Option<f64>,
}

impl AirQualitySection {
    pub fn new(aqi_value: f64) -> Self {
        Self {
            aqi_value: Some(aqi_value),
        }
    }

    pub fn aqi_value(&self) -> Result<f64, SectionNotFound> {
        field(self.aqi_value, "airQuality.aqiValue")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrimeSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_index: Option<f64>,
}

impl CrimeSection {
    pub fn new(total_index: f64) -> Self {
        Self {
            total_index: Some(total_index),
        }
    }

    pub fn total_index(&self) -> Result<f64, SectionNotFound> {
        field(self.total_index, "crime.totalIndex")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadwaySection {
    #[serde(default)]
    pub classifications: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellCoverageSection {
    #[serde(default)]
    pub carriers: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<f64>,
}

impl PopulationSection {
    pub fn new(density: f64) -> Self {
        Self {
            density: Some(density),
        }
    }

    pub fn density(&self) -> Result<f64, SectionNotFound> {
        field(self.density, "population.density")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density_pct: Option<f64>,
}

impl BuildingSection {
    pub fn new(density_pct: f64) -> Self {
        Self {
            density_pct: Some(density_pct),
        }
    }

    pub fn density_pct(&self) -> Result<f64, SectionNotFound> {
        field(self.density_pct, "building.densityPct")
    }
}

/// Alerts missing `event` or `eventType` read as empty strings and match
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherAlert {
    #[serde(default)]
    pub event: String,
    #[serde(default, alias = "event_type")]
    pub event_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherAlertsSection {
    #[serde(default)]
    pub alerts: Vec<WeatherAlert>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SlopeSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
}

impl SlopeSection {
    pub fn new(slope: f64) -> Self {
        Self { slope: Some(slope) }
    }

    pub fn slope(&self) -> Result<f64, SectionNotFound> {
        field(self.slope, "slope.slope")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_data::WorldDataResponse;

    #[test]
    fn sparse_sections_decode_and_report_missing_fields() {
        let response: WorldDataResponse = serde_json::from_value(serde_json::json!({
            "weather": { "day": { "temperature": { "max": 41.0 } } },
            "airQuality": {},
            "crime": { "totalIndex": null },
            "slope": { "slope": 17.5 },
            "weatherAlerts": { "alerts": [{ "event": "Thunderstorm Watch" }] }
        }))
        .expect("sparse payload decodes");

        let day = &response.weather().expect("weather present").day;
        assert_eq!(
            day.temperature_min("weather.day"),
            Err(SectionNotFound("weather.day.temperature.min".to_string()))
        );
        assert_eq!(
            day.apparent_max("weather.day"),
            Err(SectionNotFound(
                "weather.day.apparentTemperature".to_string()
            ))
        );
        assert_eq!(
            response.air_quality().expect("section present").aqi_value(),
            Err(SectionNotFound("airQuality.aqiValue".to_string()))
        );
        assert!(response
            .crime()
            .expect("section present")
            .total_index()
            .is_err());
        assert_eq!(response.slope().expect("section present").slope(), Ok(17.5));
        let alerts = &response.weather_alerts().expect("section present").alerts;
        assert_eq!(alerts[0].event_type, "");
    }

    #[test]
    fn weather_without_a_day_still_decodes() {
        let response: WorldDataResponse =
            serde_json::from_str(r#"{ "weather": { "previousDay": {} } }"#)
                .expect("decodes");
        let weather = response.weather().expect("weather present");
        assert!(weather.day.humidity_pct("weather.day").is_err());
        assert!(weather.previous_day().is_ok());
    }
}
