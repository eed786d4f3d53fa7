//! La Bajada watch - terminal dashboard monitor.
//!
//! Polls the station every 30 seconds, logs the verdict and stability, and
//! raises local notifications every 5 minutes. Stops on Ctrl-C.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use labajada::alerting::AlertRules;
use labajada::config::WatchConfig;
use labajada::data_sources::EcowittClient;
use labajada::monitor::{LocalNotifier, Monitor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("labajada=info".parse()?))
        .init();

    let config = WatchConfig::from_env()?;
    info!(
        min_wind = config.min_navigable_wind_knots,
        "Starting La Bajada monitor"
    );

    let weather = EcowittClient::new(config.ecowitt)?;
    let notifier = LocalNotifier::new(
        config.min_navigable_wind_knots,
        AlertRules::default(),
        Utc::now(),
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    Monitor::new(Arc::new(weather), notifier).run(shutdown).await;

    Ok(())
}
