//! Ecowitt cloud API client.
//!
//! The La Bajada station uploads to Ecowitt; readings are fetched with the
//! API v3 `device/real_time` and `device/history` endpoints, with wind in
//! knots and temperature in Celsius.
//!
//! Every value in an Ecowitt response is a string (`"18.4"`), nested as
//! `data.<block>.<field>.value`. A response with a non-zero `code`, without
//! `data`, or without wind speed and direction is rejected as malformed.
//!
//! # API Reference
//!
//! See: <https://doc.ecowitt.net/web/#/apiv3en>

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{WeatherError, WeatherSource};
use crate::model::{HistoryPoint, HistoryResponse, WindSample};

/// Base URL for the Ecowitt API v3.
const ECOWITT_API_BASE: &str = "https://api.ecowitt.net/api/v3";

/// Ecowitt unit ids: 1 = Celsius, 8 = knots.
const TEMP_UNIT_CELSIUS: &str = "1";
const WIND_SPEED_UNIT_KNOTS: &str = "8";

const HISTORY_CYCLE: &str = "30min";

/// Credentials and transport settings for the Ecowitt API.
#[derive(Debug, Clone)]
pub struct EcowittConfig {
    pub application_key: String,
    pub api_key: String,
    /// Station MAC address, e.g. `C8:C9:A3:00:00:00`.
    pub mac: String,
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles after each one.
    pub initial_backoff: Duration,
}

impl EcowittConfig {
    pub fn new(application_key: &str, api_key: &str, mac: &str) -> Self {
        Self {
            application_key: application_key.to_string(),
            api_key: api_key.to_string(),
            mac: mac.to_string(),
            base_url: ECOWITT_API_BASE.to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 2,
            initial_backoff: Duration::from_secs(1),
        }
    }

    /// Point the client at a different server (for testing).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

/// Client for the Ecowitt API.
#[derive(Clone)]
pub struct EcowittClient {
    client: reqwest::Client,
    config: EcowittConfig,
}

impl EcowittClient {
    pub fn new(config: EcowittConfig) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("labajada/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, endpoint: &str, params: &[(&str, &str)]) -> String {
        let mut url = format!(
            "{}/{}?application_key={}&api_key={}&mac={}",
            self.config.base_url,
            endpoint,
            urlencoding::encode(&self.config.application_key),
            urlencoding::encode(&self.config.api_key),
            urlencoding::encode(&self.config.mac),
        );
        for (key, value) in params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    /// GET with timeout, retrying network errors, 5xx and 429 with
    /// exponential backoff.
    async fn get_envelope(&self, url: &str) -> Result<Envelope, WeatherError> {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0;

        loop {
            let error = match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let envelope = response
                            .json::<Envelope>()
                            .await
                            .map_err(|e| WeatherError::Malformed(e.to_string()))?;
                        return envelope.check();
                    }
                    if !(status.is_server_error() || status.as_u16() == 429) {
                        return Err(WeatherError::Status(status.as_u16()));
                    }
                    WeatherError::Status(status.as_u16())
                }
                Err(e) => WeatherError::Transport(e),
            };

            if attempt >= self.config.max_retries {
                warn!(attempts = attempt + 1, error = %error, "Ecowitt request failed");
                return Err(error);
            }

            attempt += 1;
            debug!(
                attempt,
                max_retries = self.config.max_retries,
                ?backoff,
                error = %error,
                "Retrying Ecowitt request"
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }

    /// Fetch the station's latest reading.
    pub async fn get_real_time(&self) -> Result<WindSample, WeatherError> {
        let url = self.url(
            "device/real_time",
            &[
                ("call_back", "outdoor,wind"),
                ("temp_unitid", TEMP_UNIT_CELSIUS),
                ("wind_speed_unitid", WIND_SPEED_UNIT_KNOTS),
            ],
        );

        let envelope = self.get_envelope(&url).await?;
        parse_real_time(envelope)
    }

    /// Fetch speed and gust history at a 30-minute cycle.
    pub async fn get_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HistoryResponse, WeatherError> {
        let start = from.format("%Y-%m-%d %H:%M:%S").to_string();
        let end = to.format("%Y-%m-%d %H:%M:%S").to_string();
        let url = self.url(
            "device/history",
            &[
                ("start_date", &start),
                ("end_date", &end),
                ("cycle_type", HISTORY_CYCLE),
                ("call_back", "wind"),
                ("wind_speed_unitid", WIND_SPEED_UNIT_KNOTS),
            ],
        );

        let envelope = self.get_envelope(&url).await?;
        parse_history(envelope)
    }
}

#[async_trait]
impl WeatherSource for EcowittClient {
    async fn current(&self) -> Result<WindSample, WeatherError> {
        self.get_real_time().await
    }

    async fn history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HistoryResponse, WeatherError> {
        self.get_history(from, to).await
    }
}

// ============================================================================
// Response types
// ============================================================================

/// Top-level Ecowitt response.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    msg: String,
    /// An object on success; Ecowitt sends `[]` when the device has no data.
    #[serde(default)]
    data: serde_json::Value,
}

impl Envelope {
    fn check(self) -> Result<Self, WeatherError> {
        if self.code != 0 {
            return Err(WeatherError::Api {
                code: self.code,
                message: self.msg,
            });
        }
        if !self.data.is_object() {
            return Err(WeatherError::Malformed("response has no data".to_string()));
        }
        Ok(self)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RealTimeData {
    #[serde(default)]
    outdoor: Option<OutdoorBlock>,
    #[serde(default)]
    wind: Option<WindBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct OutdoorBlock {
    #[serde(default)]
    temperature: Option<Reading>,
}

#[derive(Debug, Default, Deserialize)]
struct WindBlock {
    #[serde(default)]
    wind_speed: Option<Reading>,
    #[serde(default)]
    wind_gust: Option<Reading>,
    #[serde(default)]
    wind_direction: Option<Reading>,
}

#[derive(Debug, Deserialize)]
struct Reading {
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

impl Reading {
    fn number(&self) -> Option<f64> {
        self.value.as_deref()?.trim().parse().ok()
    }

    fn observed_at(&self) -> Option<DateTime<Utc>> {
        let seconds: i64 = self.time.as_deref()?.trim().parse().ok()?;
        Utc.timestamp_opt(seconds, 0).single()
    }
}

#[derive(Debug, Default, Deserialize)]
struct HistoryData {
    #[serde(default)]
    wind: Option<HistoryWindBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryWindBlock {
    #[serde(default)]
    wind_speed: Option<Series>,
    #[serde(default)]
    wind_gust: Option<Series>,
}

/// A series keyed by unix seconds, as strings.
#[derive(Debug, Default, Deserialize)]
struct Series {
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    list: BTreeMap<String, String>,
}

fn parse_real_time(envelope: Envelope) -> Result<WindSample, WeatherError> {
    let data: RealTimeData = serde_json::from_value(envelope.data)
        .map_err(|e| WeatherError::Malformed(e.to_string()))?;

    let wind = data
        .wind
        .ok_or_else(|| WeatherError::Malformed("missing wind block".to_string()))?;
    let speed_reading = wind
        .wind_speed
        .as_ref()
        .ok_or_else(|| WeatherError::Malformed("missing wind speed".to_string()))?;
    let speed = speed_reading
        .number()
        .ok_or_else(|| WeatherError::Malformed("wind speed is not a number".to_string()))?;
    let direction = wind
        .wind_direction
        .as_ref()
        .and_then(Reading::number)
        .ok_or_else(|| WeatherError::Malformed("missing wind direction".to_string()))?;
    // No gust reported means no gust above the mean.
    let gust = wind.wind_gust.as_ref().and_then(Reading::number).unwrap_or(speed);
    let temperature = data
        .outdoor
        .and_then(|o| o.temperature)
        .and_then(|t| t.number());
    let observed_at = speed_reading.observed_at().unwrap_or_else(Utc::now);

    WindSample::new(speed, gust, direction, temperature, observed_at)
        .map_err(|e| WeatherError::Malformed(e.to_string()))
}

fn parse_history(envelope: Envelope) -> Result<HistoryResponse, WeatherError> {
    let data: HistoryData = serde_json::from_value(envelope.data)
        .map_err(|e| WeatherError::Malformed(e.to_string()))?;

    let wind = data.wind.unwrap_or_default();
    let speed = wind.wind_speed.unwrap_or_default();
    let gust = wind.wind_gust.unwrap_or_default();

    let mut history: Vec<HistoryPoint> = speed
        .list
        .iter()
        .filter_map(|(key, value)| {
            let seconds: i64 = key.parse().ok()?;
            let time = Utc.timestamp_opt(seconds, 0).single()?;
            // Gaps ("-", "") are dropped rather than charted as calm.
            let speed_knots = knots(value)?;
            let gust_knots = gust.list.get(key).and_then(|g| knots(g)).unwrap_or(speed_knots);
            Some(HistoryPoint {
                time,
                speed_knots,
                gust_knots,
            })
        })
        .collect();

    // Map keys are strings, so sort numerically by time.
    history.sort_by_key(|point| point.time);

    Ok(HistoryResponse {
        history,
        unit: speed.unit.unwrap_or_else(|| "kts".to_string()),
    })
}

fn knots(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}
