use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    #[default]
    Unknown,
    Recalculating,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Unknown,
            Self::Recalculating,
            Self::Low,
            Self::Medium,
            Self::High,
        ]
    }

    /// Sort key: descending order puts HIGH first and UNKNOWN last.
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Recalculating => 1,
            Self::Low => 2,
            Self::Medium => 3,
            Self::High => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Recalculating => "RECALCULATING",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown risk level '{0}'")]
pub struct UnknownRiskLevel(pub String);

impl FromStr for RiskLevel {
    type Err = UnknownRiskLevel;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        Self::ordered()
            .into_iter()
            .find(|level| level.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownRiskLevel(raw.to_string()))
    }
}

/// Band edges for one metric: `value < low` is LOW, `value >= medium` is HIGH.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub low: f64,
    pub medium: f64,
}

impl RiskThresholds {
    pub fn new(low: f64, medium: f64) -> Option<Self> {
        (low.is_finite() && medium.is_finite() && low <= medium).then_some(Self { low, medium })
    }

    pub fn level_for(&self, value: f64) -> RiskLevel {
        if value < self.low {
            RiskLevel::Low
        } else if value < self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

/// The half-open recalculation window `[today, today + horizon)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalculationWindow {
    pub today: NaiveDate,
    pub horizon_days: i64,
}

impl RecalculationWindow {
    pub fn new(today: NaiveDate, horizon_days: i64) -> Self {
        Self {
            today,
            horizon_days,
        }
    }

    pub fn end(&self) -> NaiveDate {
        self.today + Duration::days(self.horizon_days)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.today <= date && date < self.end()
    }

    /// Metrics are never published for dates at or past the horizon.
    pub fn is_beyond_horizon(&self, date: NaiveDate) -> bool {
        date >= self.end()
    }
}

/// What the metric store holds for one (entity, date).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricReading {
    Value(f64),
    Missing,
    NotAvailableForDate,
}

/// Everything a level depends on; nothing else may influence it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInputs {
    pub reading: MetricReading,
    pub valid_on_date: bool,
    pub has_active_tasks: bool,
    pub date: NaiveDate,
}

pub fn derive_level(
    inputs: LevelInputs,
    window: &RecalculationWindow,
    thresholds: &RiskThresholds,
) -> RiskLevel {
    let missing = matches!(inputs.reading, MetricReading::Missing);
    if missing && inputs.valid_on_date && window.contains(inputs.date) && inputs.has_active_tasks {
        return RiskLevel::Recalculating;
    }

    match inputs.reading {
        MetricReading::Value(value)
            if inputs.valid_on_date
                && inputs.has_active_tasks
                && !window.is_beyond_horizon(inputs.date) =>
        {
            thresholds.level_for(value)
        }
        _ => RiskLevel::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn inputs(reading: MetricReading, offset: i64) -> LevelInputs {
        LevelInputs {
            reading,
            valid_on_date: true,
            has_active_tasks: true,
            date: today() + Duration::days(offset),
        }
    }

    fn thresholds() -> RiskThresholds {
        RiskThresholds::new(100.0, 250.0).unwrap()
    }

    #[test]
    fn bands_follow_thresholds() {
        let thresholds = thresholds();
        assert_eq!(thresholds.level_for(99.9), RiskLevel::Low);
        assert_eq!(thresholds.level_for(100.0), RiskLevel::Medium);
        assert_eq!(thresholds.level_for(249.9), RiskLevel::Medium);
        assert_eq!(thresholds.level_for(250.0), RiskLevel::High);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        assert!(RiskThresholds::new(300.0, 100.0).is_none());
        assert!(RiskThresholds::new(f64::NAN, 100.0).is_none());
        assert!(RiskThresholds::new(100.0, 100.0).is_some());
    }

    #[test]
    fn missing_metric_inside_window_is_recalculating() {
        let window = RecalculationWindow::new(today(), 14);
        let level = derive_level(inputs(MetricReading::Missing, 10), &window, &thresholds());
        assert_eq!(level, RiskLevel::Recalculating);
    }

    #[test]
    fn horizon_is_exclusive() {
        let window = RecalculationWindow::new(today(), 14);
        let last = derive_level(inputs(MetricReading::Missing, 13), &window, &thresholds());
        assert_eq!(last, RiskLevel::Recalculating);
        let edge = derive_level(inputs(MetricReading::Missing, 14), &window, &thresholds());
        assert_eq!(edge, RiskLevel::Unknown);
        let stored = derive_level(inputs(MetricReading::Value(500.0), 14), &window, &thresholds());
        assert_eq!(stored, RiskLevel::Unknown);
    }

    #[test]
    fn guards_collapse_to_unknown() {
        let window = RecalculationWindow::new(today(), 14);
        let mut invalid = inputs(MetricReading::Value(500.0), 2);
        invalid.valid_on_date = false;
        assert_eq!(derive_level(invalid, &window, &thresholds()), RiskLevel::Unknown);

        let mut idle = inputs(MetricReading::Missing, 2);
        idle.has_active_tasks = false;
        assert_eq!(derive_level(idle, &window, &thresholds()), RiskLevel::Unknown);

        let unavailable = inputs(MetricReading::NotAvailableForDate, 20);
        assert_eq!(derive_level(unavailable, &window, &thresholds()), RiskLevel::Unknown);

        let past_missing = inputs(MetricReading::Missing, -3);
        assert_eq!(derive_level(past_missing, &window, &thresholds()), RiskLevel::Unknown);
    }

    #[test]
    fn stored_values_in_the_past_still_band() {
        let window = RecalculationWindow::new(today(), 14);
        let level = derive_level(inputs(MetricReading::Value(120.0), -5), &window, &thresholds());
        assert_eq!(level, RiskLevel::Medium);
    }

    #[test]
    fn ordinals_put_high_first_when_descending() {
        let mut levels = RiskLevel::ordered().to_vec();
        levels.sort_by_key(|level| std::cmp::Reverse(level.ordinal()));
        assert_eq!(levels.first(), Some(&RiskLevel::High));
        assert_eq!(levels.last(), Some(&RiskLevel::Unknown));
        assert_eq!("medium".parse::<RiskLevel>(), Ok(RiskLevel::Medium));
    }
}
