//! HTTP API handlers for La Bajada.
//!
//! # Endpoints
//!
//! - **GET|POST /alerts/run**: one scheduled alert run. Requires
//!   `Authorization: Bearer <CRON_SECRET>` when a secret is configured.
//! - **GET /conditions**: live conditions with verdict and stability,
//!   served from a 30 second cache.
//! - **GET /history**: the last 24 hours of speed and gust.
//! - **POST /verdict**: the rule-based verdict phrase.
//! - **POST /subscriptions**, **DELETE /subscriptions**: push opt-in/out.
//! - **GET /health**: health check.
//!
//! Push credentials and the cron secret are never logged.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::alerting::AlertRules;
use crate::data_sources::{SampleCache, WeatherSource};
use crate::dispatch::PushSender;
use crate::error::RunError;
use crate::model::{
    Conditions, ConditionsResponse, HistoryResponse, SubscribeRequest, SubscriptionResponse,
    UnsubscribeRequest, VerdictRequest, VerdictResponse,
};
use crate::run::{RunReport, run_alert_cycle};
use crate::storage::Storage;
use crate::verdict::fallback_phrase;

/// How far back GET /history looks.
const HISTORY_HOURS: i64 = 24;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub weather: Arc<dyn WeatherSource>,
    pub push: Arc<dyn PushSender>,
    pub rules: AlertRules,
    pub cron_secret: Option<String>,
    pub cache: Arc<RwLock<SampleCache>>,
}

/// Build the router with request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/alerts/run", get(run_alerts).post(run_alerts))
        .route("/conditions", get(get_conditions))
        .route("/history", get(get_history))
        .route("/verdict", post(post_verdict))
        .route(
            "/subscriptions",
            post(post_subscription).delete(delete_subscription),
        )
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

fn authorize(headers: &HeaderMap, secret: Option<&str>) -> Result<(), RunError> {
    let Some(secret) = secret else {
        return Ok(());
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == secret => Ok(()),
        _ => Err(RunError::Unauthorized),
    }
}

/// GET|POST /alerts/run - Evaluate current conditions and push alerts.
///
/// # Response
///
/// ```json
/// {
///     "ok": true,
///     "checked_at": "2025-01-18T14:15:00Z",
///     "wind": { "speed_knots": 20.0, "gust_knots": 23.0, "direction_degrees": 110.0, "cardinal": "ESE" },
///     "alert": "epic",
///     "epic": { "state": "sustained", "started_at": "2025-01-18T14:00:00Z", "transition": "became_sustained" },
///     "subscribers": { "total": 4, "sent": 3, "skipped": 0, "expired": 1, "failed": 0 },
///     "cooldown": { "alert_type": "good", "ends_at": "2025-01-18T16:00:00Z" },
///     "log_written": true
/// }
/// ```
///
/// Errors answer `{"ok": false, "error": ".."}` with 401, 502 (station
/// unreachable, nothing written) or 500 (storage).
#[instrument(skip(state, headers))]
pub async fn run_alerts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RunReport>, RunError> {
    if let Err(e) = authorize(&headers, state.cron_secret.as_deref()) {
        warn!("Rejected alert run with bad authorization");
        return Err(e);
    }

    match run_alert_cycle(
        &state.storage,
        state.weather.as_ref(),
        state.push.as_ref(),
        &state.rules,
        Utc::now(),
    )
    .await
    {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            warn!(error = %e, "Alert run failed");
            Err(e)
        }
    }
}

/// GET /conditions - Current conditions.
///
/// Served from the cache while it is fresh. When the station cannot be read
/// the last cached sample is returned with `stale: true` and a warning; with
/// nothing cached the answer is `502 Bad Gateway`.
#[instrument(skip(state))]
pub async fn get_conditions(
    State(state): State<AppState>,
) -> Result<Json<ConditionsResponse>, StatusCode> {
    let now = Utc::now();

    if let Some(entry) = state.cache.read().await.fresh(now) {
        return Ok(Json(ConditionsResponse {
            conditions: Conditions::from_sample(&entry.sample),
            cached: true,
            stale: false,
            cache_age_seconds: entry.age(now).num_seconds(),
            warning: None,
        }));
    }

    match state.weather.current().await {
        Ok(sample) => {
            let conditions = Conditions::from_sample(&sample);
            state.cache.write().await.store(sample, now);
            info!(
                speed = conditions.sample.speed_knots(),
                direction = conditions.sample.direction_degrees(),
                verdict = ?conditions.verdict.label,
                "Conditions refreshed"
            );
            Ok(Json(ConditionsResponse {
                conditions,
                cached: false,
                stale: false,
                cache_age_seconds: 0,
                warning: None,
            }))
        }
        Err(e) => {
            warn!(error = %e, "Failed to refresh conditions");
            let cache = state.cache.read().await;
            let entry = cache.last().ok_or(StatusCode::BAD_GATEWAY)?;
            Ok(Json(ConditionsResponse {
                conditions: Conditions::from_sample(&entry.sample),
                cached: true,
                stale: true,
                cache_age_seconds: entry.age(now).num_seconds(),
                warning: Some("Datos en caché por error de conexión".to_string()),
            }))
        }
    }
}

/// GET /history - Speed and gust over the last 24 hours, oldest first.
#[instrument(skip(state))]
pub async fn get_history(
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    let now = Utc::now();

    match state
        .weather
        .history(now - Duration::hours(HISTORY_HOURS), now)
        .await
    {
        Ok(history) => {
            info!(points = history.history.len(), "History queried");
            Ok(Json(history))
        }
        Err(e) => {
            warn!(error = %e, "Failed to fetch history");
            Err(StatusCode::BAD_GATEWAY)
        }
    }
}

/// POST /verdict - Rule-based verdict phrase for the given readings.
///
/// # Request Body
///
/// ```json
/// { "speed": 18.2, "gust": 22.0, "direction": 120, "cardinal": "ESE", "temp": 24.5 }
/// ```
///
/// Out-of-range values answer `400 Bad Request`.
#[instrument(skip(request))]
pub async fn post_verdict(
    Json(request): Json<VerdictRequest>,
) -> Result<Json<VerdictResponse>, (StatusCode, Json<Value>)> {
    if let Err(message) = request.validate() {
        warn!(error = %message, "Invalid verdict request");
        return Err((StatusCode::BAD_REQUEST, Json(json!({ "error": message }))));
    }

    Ok(Json(VerdictResponse {
        verdict: fallback_phrase(request.speed, request.direction),
        fallback: true,
        timestamp: Utc::now(),
    }))
}

/// POST /subscriptions - Register or refresh a push subscription.
///
/// # Request Body
///
/// ```json
/// {
///     "subscription": { "endpoint": "https://fcm.googleapis.com/..", "keys": { "p256dh": "..", "auth": ".." } },
///     "config": { "minNavigableWind": 15 }
/// }
/// ```
#[instrument(skip(state, request))]
pub async fn post_subscription(
    State(state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<SubscriptionResponse>, StatusCode> {
    let endpoint = request
        .subscription
        .get("endpoint")
        .and_then(Value::as_str)
        .filter(|endpoint| endpoint.starts_with("https://") || endpoint.starts_with("http://"))
        .ok_or_else(|| {
            warn!("Subscription without a valid endpoint");
            StatusCode::BAD_REQUEST
        })?
        .to_string();

    match state
        .storage
        .upsert_subscriber(&endpoint, &request.subscription, request.config, Utc::now())
        .await
    {
        Ok(subscriber) => {
            info!(
                subscriber_id = subscriber.id,
                min_wind = subscriber.config.min_navigable_wind_knots,
                "Push subscription saved"
            );
            Ok(Json(SubscriptionResponse {
                ok: true,
                endpoint: subscriber.endpoint,
                active: subscriber.active,
            }))
        }
        Err(e) => {
            warn!(error = %e, "Failed to save push subscription");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// DELETE /subscriptions - Deactivate a push subscription.
#[instrument(skip(state, request))]
pub async fn delete_subscription(
    State(state): State<AppState>,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<Json<SubscriptionResponse>, StatusCode> {
    match state.storage.unsubscribe(&request.endpoint, Utc::now()).await {
        Ok(true) => {
            info!("Push subscription deactivated");
            Ok(Json(SubscriptionResponse {
                ok: true,
                endpoint: request.endpoint,
                active: false,
            }))
        }
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            warn!(error = %e, "Failed to deactivate push subscription");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
