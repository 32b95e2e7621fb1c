use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analyzer::{BookingCurve, ClassificationPolicy};
use crate::error::PacingError;
use crate::schema::SchemaConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Data source configuration
    pub data_source_mode: DataSourceMode,
    pub data_directory: Option<String>,
    pub internet_urls: Option<Vec<String>>,
    pub output_directory: Option<String>,
    /// Fixed "today" for reproducible runs, `YYYY-MM-DD`.
    #[serde(default)]
    pub reference_date: Option<NaiveDate>,
    /// Plain text file, one acknowledged flight key per line.
    #[serde(default)]
    pub reviewed_flights_file: Option<String>,
    #[serde(default)]
    pub policy: ClassificationPolicy,
    #[serde(default)]
    pub curve: BookingCurve,
    #[serde(default)]
    pub schema: SchemaConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSourceMode {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "internet")]
    Internet,
    #[serde(rename = "both")]
    Both,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_source_mode: DataSourceMode::Local,
            data_directory: Some("data-source".to_string()),
            internet_urls: Some(vec![
                "https://example.com/inventory-report.csv".to_string(),
            ]),
            output_directory: Some("output".to_string()),
            reference_date: None,
            reviewed_flights_file: Some("reviewed_flights.txt".to_string()),
            policy: ClassificationPolicy::default(),
            curve: BookingCurve::default(),
            schema: SchemaConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PacingError> {
        if self.curve.steps.is_empty() {
            return Err(PacingError::Config("curve.steps must not be empty".to_string()));
        }
        if self.curve.band_below < 0.0 || self.curve.band_above < 0.0 {
            return Err(PacingError::Config(
                "curve tolerance band widths must be non-negative".to_string(),
            ));
        }
        if self.policy.min_deviation < 0.0 || self.policy.deviation_share < 0.0 {
            return Err(PacingError::Config(
                "policy deviation thresholds must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn uses_local(&self) -> bool {
        matches!(self.data_source_mode, DataSourceMode::Local | DataSourceMode::Both)
    }

    pub fn uses_internet(&self) -> bool {
        matches!(self.data_source_mode, DataSourceMode::Internet | DataSourceMode::Both)
    }
}

/// Day-bucketed sales history, each bucket optional in the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesBuckets {
    pub today: Option<f64>,
    pub yesterday: Option<f64>,
    pub days_2_3: Option<f64>,
    pub days_4_6: Option<f64>,
    pub days_7_13: Option<f64>,
    pub last_14: Option<f64>,
}

impl SalesBuckets {
    pub fn is_empty(&self) -> bool {
        self.today.is_none()
            && self.days_2_3.is_none()
            && self.days_4_6.is_none()
            && self.days_7_13.is_none()
            && self.last_14.is_none()
    }
}

/// One input row after parsing, before any pacing is derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlightRecord {
    pub raw_flight_key: String,
    pub flight_date: NaiveDate,
    pub flight_number: String,
    pub route: String,
    pub total_seats: f64,
    pub available_seats: f64,
    pub sold_yesterday: f64,
    pub load_factor_pct: f64,
    pub days_to_flight: i64,
    pub departed: bool,
    pub sales: SalesBuckets,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SalesSpeed {
    pub recent_daily_rate: f64,
    pub prior_daily_rate: Option<f64>,
    pub speed_ratio: Option<f64>,
    pub coverage_ratio: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PacingMetrics {
    pub sold_total: f64,
    pub remaining_seats: f64,
    pub daily_needed: f64,
    pub diff_vs_plan: f64,
    pub speed: Option<SalesSpeed>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightStatus {
    OnTrack,
    Oversold,
    ModerateLag,
    Behind,
    FarOut,
    Departed,
}

impl FlightStatus {
    pub const ALL: [FlightStatus; 6] = [
        FlightStatus::OnTrack,
        FlightStatus::FarOut,
        FlightStatus::Oversold,
        FlightStatus::ModerateLag,
        FlightStatus::Behind,
        FlightStatus::Departed,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            FlightStatus::OnTrack => "ON_TRACK",
            FlightStatus::Oversold => "OVERSOLD",
            FlightStatus::ModerateLag => "MODERATE_LAG",
            FlightStatus::Behind => "BEHIND",
            FlightStatus::FarOut => "FAR_OUT",
            FlightStatus::Departed => "DEPARTED",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FlightStatus::OnTrack => "🟢 On track",
            FlightStatus::Oversold => "🔵 Selling ahead of plan",
            FlightStatus::ModerateLag => "🟡 Moderate lag",
            FlightStatus::Behind => "🔴 Behind",
            FlightStatus::FarOut => "⚪ Far out, early stage",
            FlightStatus::Departed => "⚫ Departed",
        }
    }

    /// Statuses shown in the "needs attention" view.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            FlightStatus::Oversold | FlightStatus::ModerateLag | FlightStatus::Behind
        )
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedFlight {
    pub record: FlightRecord,
    pub pacing: PacingMetrics,
    pub target_load_factor: f64,
    pub status: FlightStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DropReason {
    MalformedKey,
    InvalidDate,
    AlreadyDeparted,
    MissingCapacity,
    MissingAvailable,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::MalformedKey => "malformed_key",
            DropReason::InvalidDate => "invalid_date",
            DropReason::AlreadyDeparted => "already_departed",
            DropReason::MissingCapacity => "missing_capacity",
            DropReason::MissingAvailable => "missing_available",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropCounts(BTreeMap<DropReason, usize>);

impl DropCounts {
    pub fn record(&mut self, reason: DropReason) {
        *self.0.entry(reason).or_insert(0) += 1;
    }

    pub fn get(&self, reason: DropReason) -> usize {
        self.0.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DropReason, usize)> + '_ {
        self.0.iter().map(|(reason, count)| (*reason, *count))
    }
}

impl fmt::Display for DropCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no rows dropped");
        }
        let parts: Vec<String> = self
            .iter()
            .map(|(reason, count)| format!("{}={}", reason, count))
            .collect();
        write!(f, "{} rows dropped ({})", self.total(), parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::PastFlightPolicy;

    #[test]
    fn default_config_survives_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.curve, config.curve);
        assert_eq!(parsed.policy, config.policy);
        assert_eq!(parsed.data_source_mode, DataSourceMode::Local);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn sections_are_optional() {
        let text = r#"
            data_source_mode = "both"
            data_directory = "in"
            output_directory = "out"
            reference_date = "2026-10-19"

            [policy]
            past_flights = "retain"
            moderate_lag = false
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert!(config.uses_local() && config.uses_internet());
        assert_eq!(config.reference_date, NaiveDate::from_ymd_opt(2026, 10, 19));
        assert_eq!(config.policy.past_flights, PastFlightPolicy::Retain);
        assert!(!config.policy.moderate_lag);
        assert!(config.policy.load_factor_gate);
        assert_eq!(config.curve.steps.len(), 4);
    }

    #[test]
    fn empty_curve_is_rejected() {
        let mut config = Config::default();
        config.curve.steps.clear();
        assert!(matches!(config.validate(), Err(PacingError::Config(_))));
    }

    #[test]
    fn drop_counts_display() {
        let mut drops = DropCounts::default();
        assert_eq!(drops.to_string(), "no rows dropped");
        drops.record(DropReason::InvalidDate);
        drops.record(DropReason::MalformedKey);
        drops.record(DropReason::InvalidDate);
        assert_eq!(drops.to_string(), "3 rows dropped (malformed_key=1, invalid_date=2)");
    }

    #[test]
    fn attention_statuses() {
        let attention: Vec<FlightStatus> = FlightStatus::ALL
            .into_iter()
            .filter(FlightStatus::needs_attention)
            .collect();
        assert_eq!(
            attention,
            vec![FlightStatus::Oversold, FlightStatus::ModerateLag, FlightStatus::Behind]
        );
    }
}
