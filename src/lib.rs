//! La Bajada - wind conditions and alerts for a kitesurf spot.
//!
//! # Overview
//!
//! A weather station at La Bajada reports wind speed, gust and direction.
//! This crate turns those readings into a safety verdict and a gust
//! stability index for the dashboard, tracks sustained "epic" conditions
//! across scheduled runs, and pushes alerts to subscribed browsers with a
//! per-type cooldown.
//!
//! # Modules
//!
//! - [`model`]: Wind samples, subscribers, alert log and API bodies
//! - [`verdict`]: Verdict engine, speed bands, kite size and fallback phrase
//! - [`stability`]: Gust factor and stability classification
//! - [`epic`]: Sustained-condition tracker
//! - [`alerting`]: Per-subscriber alert selection and cooldown
//! - [`dispatch`]: Concurrent push delivery
//! - [`run`]: One scheduled alert run
//! - [`data_sources`]: Ecowitt client and sample cache
//! - [`storage`]: SQLite storage layer
//! - [`api`]: HTTP API handlers
//! - [`monitor`]: Dashboard refresh loop and local notifications
//! - [`config`]: Environment configuration

pub mod alerting;
pub mod api;
pub mod config;
pub mod data_sources;
pub mod dispatch;
pub mod epic;
pub mod error;
pub mod model;
pub mod monitor;
pub mod run;
pub mod stability;
pub mod storage;
pub mod verdict;
