//! La Bajada server.
//!
//! # API Endpoints
//!
//! - `GET|POST /alerts/run` - Scheduled alert run (bearer `CRON_SECRET`)
//! - `GET /conditions` - Live conditions, verdict and stability
//! - `GET /history` - Last 24 hours of wind
//! - `POST /verdict` - Rule-based verdict phrase
//! - `POST /subscriptions`, `DELETE /subscriptions` - Push opt-in/out
//! - `GET /health` - Health check

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use labajada::api::{AppState, router};
use labajada::config::Config;
use labajada::data_sources::{EcowittClient, SampleCache};
use labajada::dispatch::RelayPushSender;
use labajada::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("labajada=info".parse()?))
        .init();

    let config = Config::from_env()?;

    info!(port = config.port, db_url = %config.database_url, "Starting La Bajada server");

    if config.cron_secret.is_none() {
        warn!("CRON_SECRET not set, /alerts/run accepts unauthenticated requests");
    }

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let weather = EcowittClient::new(config.ecowitt.clone())?;
    let push = RelayPushSender::new(&config.push_relay_url, config.push_relay_token.clone())?;

    let state = AppState {
        storage,
        weather: Arc::new(weather),
        push: Arc::new(push),
        rules: config.rules,
        cron_secret: config.cron_secret.clone(),
        cache: Arc::new(RwLock::new(SampleCache::default())),
    };

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "La Bajada is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
