//! Data models for La Bajada.
//!
//! Wind telemetry enters the system as a [`WindSample`], the only way a
//! reading can reach the classifiers and the alert engine. Samples are
//! validated once at construction and are immutable afterwards.
//!
//! The remaining types describe push subscribers, the append-only alert log
//! and the request/response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stability::StabilityIndex;
use crate::verdict::{SpeedBand, Verdict, WindExposure, recommend_kite_size, speed_band};

/// Reasons a raw reading cannot become a [`WindSample`].
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SampleError {
    #[error("wind speed must be a finite, non-negative number of knots (got {0})")]
    InvalidSpeed(f64),

    #[error("wind gust must be a finite, non-negative number of knots (got {0})")]
    InvalidGust(f64),

    #[error("wind direction must be a finite number of degrees (got {0})")]
    InvalidDirection(f64),
}

/// A normalized wind reading from the station.
///
/// `gust_knots` is normally at least `speed_knots`, but the station
/// occasionally reports a gust below the mean speed. That case is kept as-is
/// and classified as ultra stable by the stability index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindSample {
    speed_knots: f64,
    gust_knots: f64,
    direction_degrees: f64,
    temperature_celsius: Option<f64>,
    observed_at: DateTime<Utc>,
}

impl WindSample {
    /// Build a sample, rejecting negative or non-finite wind values.
    ///
    /// The direction is normalized into `[0, 360)`.
    pub fn new(
        speed_knots: f64,
        gust_knots: f64,
        direction_degrees: f64,
        temperature_celsius: Option<f64>,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, SampleError> {
        if !speed_knots.is_finite() || speed_knots < 0.0 {
            return Err(SampleError::InvalidSpeed(speed_knots));
        }
        if !gust_knots.is_finite() || gust_knots < 0.0 {
            return Err(SampleError::InvalidGust(gust_knots));
        }
        if !direction_degrees.is_finite() {
            return Err(SampleError::InvalidDirection(direction_degrees));
        }

        // rem_euclid rounds tiny negative angles up to exactly 360.
        let mut direction = direction_degrees.rem_euclid(360.0);
        if direction >= 360.0 {
            direction = 0.0;
        }

        Ok(Self {
            speed_knots,
            gust_knots,
            direction_degrees: direction,
            temperature_celsius: temperature_celsius.filter(|t| t.is_finite()),
            observed_at,
        })
    }

    pub fn speed_knots(&self) -> f64 {
        self.speed_knots
    }

    pub fn gust_knots(&self) -> f64 {
        self.gust_knots
    }

    pub fn direction_degrees(&self) -> f64 {
        self.direction_degrees
    }

    pub fn temperature_celsius(&self) -> Option<f64> {
        self.temperature_celsius
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Compass point the wind is blowing from.
    pub fn cardinal(&self) -> CardinalDirection {
        CardinalDirection::from_degrees(self.direction_degrees)
    }
}

/// One of the 16 compass points.
///
/// Serialized with the Spanish abbreviations shown on the dashboard
/// (`O` for west, `SO` for south-west, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardinalDirection {
    #[serde(rename = "N")]
    N,
    #[serde(rename = "NNE")]
    Nne,
    #[serde(rename = "NE")]
    Ne,
    #[serde(rename = "ENE")]
    Ene,
    #[serde(rename = "E")]
    E,
    #[serde(rename = "ESE")]
    Ese,
    #[serde(rename = "SE")]
    Se,
    #[serde(rename = "SSE")]
    Sse,
    #[serde(rename = "S")]
    S,
    #[serde(rename = "SSO")]
    Ssw,
    #[serde(rename = "SO")]
    Sw,
    #[serde(rename = "OSO")]
    Wsw,
    #[serde(rename = "O")]
    W,
    #[serde(rename = "ONO")]
    Wnw,
    #[serde(rename = "NO")]
    Nw,
    #[serde(rename = "NNO")]
    Nnw,
}

impl CardinalDirection {
    const ALL: [CardinalDirection; 16] = [
        CardinalDirection::N,
        CardinalDirection::Nne,
        CardinalDirection::Ne,
        CardinalDirection::Ene,
        CardinalDirection::E,
        CardinalDirection::Ese,
        CardinalDirection::Se,
        CardinalDirection::Sse,
        CardinalDirection::S,
        CardinalDirection::Ssw,
        CardinalDirection::Sw,
        CardinalDirection::Wsw,
        CardinalDirection::W,
        CardinalDirection::Wnw,
        CardinalDirection::Nw,
        CardinalDirection::Nnw,
    ];

    /// Map degrees to the nearest of 16 sectors of 22.5°.
    ///
    /// `index = round(degrees / 22.5) mod 16`, so north covers
    /// `[348.75, 360) ∪ [0, 11.25)`.
    pub fn from_degrees(degrees: f64) -> Self {
        let index = (degrees.rem_euclid(360.0) / 22.5).round() as usize % 16;
        Self::ALL[index]
    }

    /// Abbreviation as displayed to users.
    pub fn abbrev(&self) -> &'static str {
        match self {
            CardinalDirection::N => "N",
            CardinalDirection::Nne => "NNE",
            CardinalDirection::Ne => "NE",
            CardinalDirection::Ene => "ENE",
            CardinalDirection::E => "E",
            CardinalDirection::Ese => "ESE",
            CardinalDirection::Se => "SE",
            CardinalDirection::Sse => "SSE",
            CardinalDirection::S => "S",
            CardinalDirection::Ssw => "SSO",
            CardinalDirection::Sw => "SO",
            CardinalDirection::Wsw => "OSO",
            CardinalDirection::W => "O",
            CardinalDirection::Wnw => "ONO",
            CardinalDirection::Nw => "NO",
            CardinalDirection::Nnw => "NNO",
        }
    }
}

impl std::fmt::Display for CardinalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.abbrev())
    }
}

/// Kind of push alert, in priority order (epic is the most important).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    /// Epic conditions have held for the sustain duration.
    Epic,
    /// Wind or gusts are beyond safe limits.
    Dangerous,
    /// Navigable wind blowing from land.
    Offshore,
    /// Navigable onshore wind within the subscriber's range.
    Good,
}

impl AlertType {
    /// 1 is the highest priority.
    pub fn priority(&self) -> u8 {
        match self {
            AlertType::Epic => 1,
            AlertType::Dangerous => 2,
            AlertType::Offshore => 3,
            AlertType::Good => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Epic => "epic",
            AlertType::Dangerous => "dangerous",
            AlertType::Offshore => "offshore",
            AlertType::Good => "good",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "epic" => Some(AlertType::Epic),
            "dangerous" => Some(AlertType::Dangerous),
            "offshore" => Some(AlertType::Offshore),
            "good" => Some(AlertType::Good),
            _ => None,
        }
    }
}

/// Per-subscriber alert preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Lowest speed (knots) the subscriber considers worth going out for.
    #[serde(alias = "minNavigableWind", default = "default_min_navigable_wind")]
    pub min_navigable_wind_knots: u32,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            min_navigable_wind_knots: default_min_navigable_wind(),
        }
    }
}

fn default_min_navigable_wind() -> u32 {
    15
}

/// A browser that opted into push alerts.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscriber {
    pub id: i64,

    /// Push service endpoint URL; identifies the subscription.
    pub endpoint: String,

    /// Opaque push subscription (endpoint plus encryption keys) as sent
    /// by the browser. Never logged.
    pub credentials: serde_json::Value,

    pub config: SubscriberConfig,

    /// False once the push service reported the endpoint gone.
    pub active: bool,
}

/// Wind values captured alongside an alert log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindSnapshot {
    pub speed_knots: f64,
    pub gust_knots: f64,
    pub direction_degrees: f64,
    pub cardinal: CardinalDirection,
}

impl From<&WindSample> for WindSnapshot {
    fn from(sample: &WindSample) -> Self {
        Self {
            speed_knots: sample.speed_knots(),
            gust_knots: sample.gust_knots(),
            direction_degrees: sample.direction_degrees(),
            cardinal: sample.cardinal(),
        }
    }
}

/// One record per run that actually delivered at least one alert.
///
/// Only the most recent entry matters to the cooldown check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertLogEntry {
    pub sent_at: DateTime<Utc>,
    pub alert_type: AlertType,
    pub wind: WindSnapshot,
    pub subscribers_sent: u32,
    pub subscribers_skipped: u32,
    pub subscribers_expired: u32,
    pub subscribers_failed: u32,
}

/// A point of the station's recent wind history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub time: DateTime<Utc>,
    #[serde(rename = "speed")]
    pub speed_knots: f64,
    #[serde(rename = "gust")]
    pub gust_knots: f64,
}

/// Everything the dashboard derives from a single sample.
#[derive(Debug, Clone, Serialize)]
pub struct Conditions {
    pub sample: WindSample,
    pub cardinal: CardinalDirection,
    pub verdict: Verdict,
    pub stability: StabilityIndex,
    /// Per-metric band of the mean speed (independent thresholds).
    pub speed_band: Option<SpeedBand>,
    /// Per-metric band of the gust.
    pub gust_band: Option<SpeedBand>,
    pub exposure: WindExposure,
    pub kite_size: &'static str,
}

impl Conditions {
    pub fn from_sample(sample: &WindSample) -> Self {
        Self {
            sample: sample.clone(),
            cardinal: sample.cardinal(),
            verdict: Verdict::for_sample(sample),
            stability: StabilityIndex::compute(
                Some(sample.speed_knots()),
                Some(sample.gust_knots()),
            ),
            speed_band: speed_band(Some(sample.speed_knots())),
            gust_band: speed_band(Some(sample.gust_knots())),
            exposure: WindExposure::from_degrees(sample.direction_degrees()),
            kite_size: recommend_kite_size(sample.speed_knots()),
        }
    }
}

/// Response for GET /conditions.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionsResponse {
    #[serde(flatten)]
    pub conditions: Conditions,

    /// Served from the in-memory cache rather than a fresh station read.
    pub cached: bool,

    /// The station could not be reached; these are the last known values.
    pub stale: bool,

    /// Seconds since the sample was fetched from the station.
    pub cache_age_seconds: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Response for GET /history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryPoint>,
    pub unit: String,
}

/// Request body for POST /subscriptions.
///
/// `subscription` is the browser's `PushSubscription.toJSON()`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeRequest {
    pub subscription: serde_json::Value,

    #[serde(default)]
    pub config: SubscriberConfig,
}

/// Request body for DELETE /subscriptions.
#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

/// Response for subscription changes.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub ok: bool,
    pub endpoint: String,
    pub active: bool,
}

/// Request body for POST /verdict.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerdictRequest {
    pub speed: Option<f64>,
    pub gust: Option<f64>,
    pub direction: Option<f64>,
    pub cardinal: Option<String>,
    pub temp: Option<f64>,
}

impl VerdictRequest {
    /// Reject inputs outside the ranges the station can physically report.
    pub fn validate(&self) -> Result<(), String> {
        if self.speed.is_none() && self.direction.is_none() {
            return Err("wind speed or direction is required".to_string());
        }
        if let Some(speed) = self.speed {
            if !(0.0..=100.0).contains(&speed) {
                return Err("wind speed out of range (0-100 knots)".to_string());
            }
        }
        if let Some(direction) = self.direction {
            if !(0.0..360.0).contains(&direction) {
                return Err("wind direction out of range (0-359°)".to_string());
            }
        }
        if let Some(temp) = self.temp {
            if !(-50.0..=60.0).contains(&temp) {
                return Err("temperature out of range (-50 to 60°C)".to_string());
            }
        }
        Ok(())
    }
}

/// Response for POST /verdict.
#[derive(Debug, Clone, Serialize)]
pub struct VerdictResponse {
    pub verdict: &'static str,
    pub fallback: bool,
    pub timestamp: DateTime<Utc>,
}
