//! Weather station data sources.
//!
//! The alert run and the dashboard only see the [`WeatherSource`] trait. The
//! production implementation is the Ecowitt cloud API for the La Bajada
//! station.
//!
//! # Data Sources
//!
//! - [`ecowitt`]: Ecowitt API v3, real-time readings and 30-minute history
//! - [`cache`]: a short-lived cache value for the last good reading

pub mod cache;
pub mod ecowitt;

pub use cache::{CachedSample, SampleCache};
pub use ecowitt::{EcowittClient, EcowittConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{HistoryResponse, WindSample};

/// Why a reading could not be obtained.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("weather service returned HTTP {0}")]
    Status(u16),

    #[error("weather service error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("malformed weather response: {0}")]
    Malformed(String),
}

/// Source of current and recent wind readings.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// The station's latest reading.
    async fn current(&self) -> Result<WindSample, WeatherError>;

    /// Wind speed and gust between `from` and `to`, oldest first.
    async fn history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HistoryResponse, WeatherError>;
}
