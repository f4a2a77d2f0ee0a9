//! Automatic site-condition classifiers.
//!
//! Every classifier is a pure function of the world-data inputs it names and
//! the library entry's `default_multiplier`. Threshold constants are part of
//! the contract with downstream risk models and must not drift.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::LibrarySiteCondition;
use crate::world_data::{SectionNotFound, WorldDataResponse, WorldDataSource};

pub const REDUCED_MULTIPLIER: f64 = 0.05;

pub const HEAT_INDEX_MIN: f64 = 91.0;
pub const HEAT_INDEX_SEVERE: f64 = 103.0;
pub const COLD_INDEX_MAX: f64 = 26.0;
pub const SLIP_TODAY_PCT: f64 = 80.0;
pub const SLIP_PREVIOUS_DAY_PCT: f64 = 95.0;
pub const FREEZING_POINT: f64 = 32.0;
pub const HIGH_WINDS_GUST: f64 = 30.0;
pub const HIGH_WINDS_SEVERE_GUST: f64 = 40.0;
pub const FUGITIVE_DUST_HUMIDITY_PCT: f64 = 50.0;
pub const FUGITIVE_DUST_WIND_SPEED: f64 = 12.0;
pub const AIR_QUALITY_INDEX_MAX: f64 = 150.0;
pub const CRIME_INDEX_MIN: f64 = 200.0;
pub const POPULATION_DENSITY_MIN: f64 = 2500.0;
pub const POPULATION_DENSITY_SEVERE: f64 = 10000.0;
pub const BUILDING_DENSITY_PCT: f64 = 10.0;
pub const EXTREME_SLOPE: f64 = 15.0;

const ROADWAY_MULTIPLIERS: &[(&str, f64)] = &[
    ("motorway", 0.1),
    ("motorway_link", 0.1),
    ("trunk", 0.1),
    ("trunk_link", 0.1),
    ("primary", 0.05),
    ("primary_link", 0.05),
    ("secondary", 0.05),
    ("secondary_link", 0.05),
    ("tertiary", 0.05),
    ("tertiary_link", 0.05),
    ("bus_stop", 0.05),
    ("busway", 0.05),
];

/// Normalized (alphanumeric, lowercase) names of the national carriers.
const MAJOR_CARRIERS: &[&str] = &["att", "verizon", "tmobile"];

const LIGHTNING_EVENT_MARKERS: &[&str] = &["thunderstorm", "lightning"];

/// Outcome of one classifier for one (location, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionResult {
    pub value: Value,
    pub condition_applies: bool,
    pub multiplier: f64,
    pub alert: bool,
}

impl ConditionResult {
    fn applies(value: Value, multiplier: f64) -> Self {
        Self {
            value,
            condition_applies: true,
            multiplier,
            alert: true,
        }
    }

    fn declines(value: Value) -> Self {
        Self {
            value,
            condition_applies: false,
            multiplier: 0.0,
            alert: false,
        }
    }

    fn from_rule(value: Value, applies: bool, multiplier: f64) -> Self {
        if applies {
            Self::applies(value, multiplier)
        } else {
            Self::declines(value)
        }
    }

    /// Manual conditions always apply at the library default.
    pub fn manual(library: &LibrarySiteCondition) -> Self {
        Self::applies(Value::Null, library.default_multiplier)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifierError {
    #[error(transparent)]
    Missing(#[from] SectionNotFound),
    #[error("input {field} is not a finite number ({value})")]
    InvalidInput { field: &'static str, value: f64 },
}

fn finite(field: &'static str, value: f64) -> Result<f64, ClassifierError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ClassifierError::InvalidInput { field, value })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classifier {
    HeatIndex,
    ColdIndex,
    Slip,
    WetOrFrozenGround,
    HighWinds,
    FugitiveDust,
    AirQualityIndex,
    Crime,
    Roadway,
    CellCoverage,
    PopulationDensity,
    BuildingDensity,
    LightningForecast,
    ExtremeTopography,
}

impl Classifier {
    pub const fn ordered() -> [Self; 14] {
        [
            Self::HeatIndex,
            Self::ColdIndex,
            Self::Slip,
            Self::WetOrFrozenGround,
            Self::HighWinds,
            Self::FugitiveDust,
            Self::AirQualityIndex,
            Self::Crime,
            Self::Roadway,
            Self::CellCoverage,
            Self::PopulationDensity,
            Self::BuildingDensity,
            Self::LightningForecast,
            Self::ExtremeTopography,
        ]
    }

    pub const fn handle_code(self) -> &'static str {
        match self {
            Self::HeatIndex => "heat_index",
            Self::ColdIndex => "cold_index",
            Self::Slip => "slip",
            Self::WetOrFrozenGround => "wet_or_frozen_ground",
            Self::HighWinds => "high_winds",
            Self::FugitiveDust => "fugitive_dust",
            Self::AirQualityIndex => "air_quality_index",
            Self::Crime => "crime",
            Self::Roadway => "roadway",
            Self::CellCoverage => "cell_coverage",
            Self::PopulationDensity => "population_density",
            Self::BuildingDensity => "building_density",
            Self::LightningForecast => "lightning_forecast",
            Self::ExtremeTopography => "extreme_topography",
        }
    }

    pub fn from_handle(handle_code: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|classifier| classifier.handle_code() == handle_code)
    }

    pub const fn source(self) -> WorldDataSource {
        match self {
            Self::HeatIndex
            | Self::ColdIndex
            | Self::Slip
            | Self::WetOrFrozenGround
            | Self::HighWinds
            | Self::FugitiveDust => WorldDataSource::Weather,
            Self::AirQualityIndex => WorldDataSource::AirQuality,
            Self::Crime => WorldDataSource::Crime,
            Self::Roadway => WorldDataSource::Roadway,
            Self::CellCoverage => WorldDataSource::CellCoverage,
            Self::PopulationDensity => WorldDataSource::Population,
            Self::BuildingDensity => WorldDataSource::Building,
            Self::LightningForecast => WorldDataSource::WeatherAlerts,
            Self::ExtremeTopography => WorldDataSource::Slope,
        }
    }

    pub fn classify(
        self,
        library: &LibrarySiteCondition,
        data: &WorldDataResponse,
    ) -> Result<ConditionResult, ClassifierError> {
        let default = library.default_multiplier;
        match self {
            Self::HeatIndex => heat_index(default, data),
            Self::ColdIndex => cold_index(default, data),
            Self::Slip => slip(default, data),
            Self::WetOrFrozenGround => wet_or_frozen_ground(default, data),
            Self::HighWinds => high_winds(default, data),
            Self::FugitiveDust => fugitive_dust(default, data),
            Self::AirQualityIndex => air_quality_index(default, data),
            Self::Crime => crime(default, data),
            Self::Roadway => Ok(roadway(data)?),
            Self::CellCoverage => Ok(cell_coverage(default, data)?),
            Self::PopulationDensity => population_density(default, data),
            Self::BuildingDensity => building_density(default, data),
            Self::LightningForecast => Ok(lightning_forecast(default, data)?),
            Self::ExtremeTopography => extreme_topography(default, data),
        }
    }
}

fn heat_index(default: f64, data: &WorldDataResponse) -> Result<ConditionResult, ClassifierError> {
    let max = data.weather()?.day.apparent_max("weather.day")?;
    let max = finite("apparentTemperature.max", max)?;
    let multiplier = if max > HEAT_INDEX_SEVERE {
        default
    } else {
        REDUCED_MULTIPLIER
    };
    Ok(ConditionResult::from_rule(
        json!({ "apparentTemperatureMax": max }),
        max >= HEAT_INDEX_MIN,
        multiplier,
    ))
}

fn cold_index(default: f64, data: &WorldDataResponse) -> Result<ConditionResult, ClassifierError> {
    let min = data.weather()?.day.temperature_min("weather.day")?;
    let min = finite("temperature.min", min)?;
    Ok(ConditionResult::from_rule(
        json!({ "temperatureMin": min }),
        min < COLD_INDEX_MAX,
        default,
    ))
}

fn precipitation_pair(data: &WorldDataResponse) -> Result<(f64, f64), ClassifierError> {
    let weather = data.weather()?;
    let today = weather.day.precipitation_pct("weather.day")?;
    let previous = weather
        .previous_day()?
        .precipitation_pct("weather.previousDay")?;
    Ok((
        finite("precipitation.probabilityPct", today)?,
        finite("previousDay.precipitation.probabilityPct", previous)?,
    ))
}

fn is_slippery(today: f64, previous: f64) -> bool {
    today >= SLIP_TODAY_PCT || previous >= SLIP_PREVIOUS_DAY_PCT
}

fn slip(default: f64, data: &WorldDataResponse) -> Result<ConditionResult, ClassifierError> {
    let (today, previous) = precipitation_pair(data)?;
    Ok(ConditionResult::from_rule(
        json!({ "precipitationPct": today, "previousDayPrecipitationPct": previous }),
        is_slippery(today, previous),
        default,
    ))
}

fn wet_or_frozen_ground(
    default: f64,
    data: &WorldDataResponse,
) -> Result<ConditionResult, ClassifierError> {
    let (today, previous) = precipitation_pair(data)?;
    let min = data.weather()?.day.temperature_min("weather.day")?;
    let min = finite("temperature.min", min)?;
    Ok(ConditionResult::from_rule(
        json!({
            "precipitationPct": today,
            "previousDayPrecipitationPct": previous,
            "temperatureMin": min,
        }),
        is_slippery(today, previous) && min <= FREEZING_POINT,
        default,
    ))
}

fn high_winds(default: f64, data: &WorldDataResponse) -> Result<ConditionResult, ClassifierError> {
    let gust = data.weather()?.day.wind_gust("weather.day")?;
    let gust = finite("wind.gust", gust)?;
    let multiplier = if gust > HIGH_WINDS_SEVERE_GUST {
        default
    } else {
        REDUCED_MULTIPLIER
    };
    Ok(ConditionResult::from_rule(
        json!({ "windGust": gust }),
        gust >= HIGH_WINDS_GUST,
        multiplier,
    ))
}

fn fugitive_dust(
    default: f64,
    data: &WorldDataResponse,
) -> Result<ConditionResult, ClassifierError> {
    let day = &data.weather()?.day;
    let humidity = finite("humidityPct", day.humidity_pct("weather.day")?)?;
    let speed = finite("wind.speed", day.wind_speed("weather.day")?)?;
    Ok(ConditionResult::from_rule(
        json!({ "humidityPct": humidity, "windSpeed": speed }),
        humidity < FUGITIVE_DUST_HUMIDITY_PCT && speed > FUGITIVE_DUST_WIND_SPEED,
        default,
    ))
}

fn air_quality_index(
    default: f64,
    data: &WorldDataResponse,
) -> Result<ConditionResult, ClassifierError> {
    let aqi = finite("aqiValue", data.air_quality()?.aqi_value()?)?;
    Ok(ConditionResult::from_rule(
        json!({ "aqiValue": aqi }),
        aqi > AIR_QUALITY_INDEX_MAX,
        default,
    ))
}

fn crime(default: f64, data: &WorldDataResponse) -> Result<ConditionResult, ClassifierError> {
    let index = finite("totalIndex", data.crime()?.total_index()?)?;
    Ok(ConditionResult::from_rule(
        json!({ "totalIndex": index }),
        index >= CRIME_INDEX_MIN,
        default,
    ))
}

fn roadway(data: &WorldDataResponse) -> Result<ConditionResult, SectionNotFound> {
    let classifications = &data.roadway()?.classifications;
    let multiplier = classifications
        .iter()
        .filter_map(|class| {
            let class = class.trim().to_ascii_lowercase();
            ROADWAY_MULTIPLIERS
                .iter()
                .find(|(name, _)| *name == class)
                .map(|(_, multiplier)| *multiplier)
        })
        .fold(None, |best: Option<f64>, value| {
            Some(best.map_or(value, |current| current.max(value)))
        });

    let value = json!({ "classifications": classifications });
    Ok(match multiplier {
        Some(multiplier) => ConditionResult::applies(value, multiplier),
        None => ConditionResult::declines(value),
    })
}

fn normalize_carrier(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn cell_coverage(
    default: f64,
    data: &WorldDataResponse,
) -> Result<ConditionResult, SectionNotFound> {
    let carriers = &data.cell_coverage()?.carriers;
    let has_major_carrier = carriers
        .iter()
        .any(|carrier| MAJOR_CARRIERS.contains(&normalize_carrier(carrier).as_str()));
    Ok(ConditionResult::from_rule(
        json!({ "carriers": carriers }),
        !has_major_carrier,
        default,
    ))
}

fn population_density(
    default: f64,
    data: &WorldDataResponse,
) -> Result<ConditionResult, ClassifierError> {
    let density = finite("density", data.population()?.density()?)?;
    let multiplier = if density >= POPULATION_DENSITY_SEVERE {
        default
    } else {
        REDUCED_MULTIPLIER
    };
    Ok(ConditionResult::from_rule(
        json!({ "density": density }),
        density > POPULATION_DENSITY_MIN,
        multiplier,
    ))
}

fn building_density(
    default: f64,
    data: &WorldDataResponse,
) -> Result<ConditionResult, ClassifierError> {
    let density = finite("densityPct", data.building()?.density_pct()?)?;
    Ok(ConditionResult::from_rule(
        json!({ "densityPct": density }),
        density > BUILDING_DENSITY_PCT,
        default,
    ))
}

fn lightning_forecast(
    default: f64,
    data: &WorldDataResponse,
) -> Result<ConditionResult, SectionNotFound> {
    let mut warning = false;
    let mut watch = false;
    let mut matched = Vec::new();

    for alert in &data.weather_alerts()?.alerts {
        let event = alert.event.to_ascii_lowercase();
        if !LIGHTNING_EVENT_MARKERS
            .iter()
            .any(|marker| event.contains(marker))
        {
            continue;
        }
        match alert.event_type.trim().to_ascii_lowercase().as_str() {
            "warning" => warning = true,
            "watch" => watch = true,
            _ => continue,
        }
        matched.push(json!({ "event": alert.event, "eventType": alert.event_type }));
    }

    let value = json!({ "alerts": matched });
    Ok(if warning {
        ConditionResult::applies(value, default)
    } else if watch {
        ConditionResult::applies(value, REDUCED_MULTIPLIER)
    } else {
        ConditionResult::declines(value)
    })
}

fn extreme_topography(
    default: f64,
    data: &WorldDataResponse,
) -> Result<ConditionResult, ClassifierError> {
    let slope = finite("slope", data.slope()?.slope()?)?;
    Ok(ConditionResult::from_rule(
        json!({ "slope": slope }),
        slope >= EXTREME_SLOPE,
        default,
    ))
}
