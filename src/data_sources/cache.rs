//! Last-good-reading cache.
//!
//! Held in the server state behind a lock and passed to handlers with it.
//! A fresh entry is served without contacting the station; an expired entry
//! is still kept as the stale fallback for when the station is unreachable.

use chrono::{DateTime, Duration, Utc};

use crate::model::WindSample;

/// Default time a reading is served without refreshing.
pub const DEFAULT_TTL_SECONDS: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedSample {
    pub sample: WindSample,
    pub fetched_at: DateTime<Utc>,
}

impl CachedSample {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.fetched_at)
    }
}

#[derive(Debug, Clone)]
pub struct SampleCache {
    entry: Option<CachedSample>,
    ttl: Duration,
}

impl Default for SampleCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECONDS))
    }
}

impl SampleCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entry: None, ttl }
    }

    /// The cached reading if it is younger than the TTL.
    pub fn fresh(&self, now: DateTime<Utc>) -> Option<&CachedSample> {
        self.entry.as_ref().filter(|entry| entry.age(now) < self.ttl)
    }

    /// The cached reading regardless of age.
    pub fn last(&self) -> Option<&CachedSample> {
        self.entry.as_ref()
    }

    pub fn store(&mut self, sample: WindSample, now: DateTime<Utc>) -> &CachedSample {
        self.entry.insert(CachedSample {
            sample,
            fetched_at: now,
        })
    }
}
