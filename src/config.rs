//! Environment configuration.
//!
//! Both binaries read their settings once at startup. Secrets (Ecowitt keys,
//! cron secret, relay token) are never logged.

use std::env;

use chrono::Duration;

use crate::alerting::AlertRules;
use crate::data_sources::EcowittConfig;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DB_PATH: &str = "sqlite:labajada.db?mode=rwc";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub ecowitt: EcowittConfig,
    /// Bearer token required by the alert run trigger. `None` leaves it open.
    pub cron_secret: Option<String>,
    pub push_relay_url: String,
    pub push_relay_token: Option<String>,
    pub rules: AlertRules,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = parse_or(get("LABAJADA_PORT"), "LABAJADA_PORT", DEFAULT_PORT)?;
        let database_url = get("LABAJADA_DATABASE_URL").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let mut rules = AlertRules::default();
        rules.cooldown = minutes_or(
            get("LABAJADA_COOLDOWN_MINUTES"),
            "LABAJADA_COOLDOWN_MINUTES",
            rules.cooldown,
        )?;
        rules.epic.sustain = minutes_or(
            get("LABAJADA_EPIC_SUSTAIN_MINUTES"),
            "LABAJADA_EPIC_SUSTAIN_MINUTES",
            rules.epic.sustain,
        )?;

        Ok(Self {
            port,
            database_url,
            ecowitt: ecowitt_from(&get)?,
            cron_secret: get("CRON_SECRET"),
            push_relay_url: required(&get, "PUSH_RELAY_URL")?,
            push_relay_token: get("PUSH_RELAY_TOKEN"),
            rules,
        })
    }
}

/// Configuration of the `labajada-watch` dashboard monitor.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub ecowitt: EcowittConfig,
    pub min_navigable_wind_knots: u32,
}

impl WatchConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            ecowitt: ecowitt_from(&get)?,
            min_navigable_wind_knots: parse_or(get("LABAJADA_MIN_WIND"), "LABAJADA_MIN_WIND", 15)?,
        })
    }
}

fn ecowitt_from(get: &impl Fn(&str) -> Option<String>) -> anyhow::Result<EcowittConfig> {
    let config = EcowittConfig::new(
        &required(get, "ECOWITT_APPLICATION_KEY")?,
        &required(get, "ECOWITT_API_KEY")?,
        &required(get, "ECOWITT_MAC")?,
    );

    Ok(match get("ECOWITT_BASE_URL") {
        Some(base_url) => config.with_base_url(&base_url),
        None => config,
    })
}

fn required(get: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    get(key).ok_or_else(|| anyhow::anyhow!("missing required environment variable {key}"))
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

/// A whole, positive number of minutes.
fn minutes_or(value: Option<String>, key: &str, default: Duration) -> anyhow::Result<Duration> {
    let Some(raw) = value else {
        return Ok(default);
    };
    let minutes: u32 = parse_or(Some(raw), key, 0)?;
    if minutes == 0 {
        anyhow::bail!("{key} must be at least one minute");
    }
    Duration::try_minutes(i64::from(minutes))
        .ok_or_else(|| anyhow::anyhow!("{key} is out of range: {minutes}"))
}
