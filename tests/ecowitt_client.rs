//! Ecowitt client transport tests against a local stand-in server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{Json, Router, extract::Query, extract::State, http::StatusCode, routing::get};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use labajada::data_sources::{EcowittClient, EcowittConfig, WeatherError, WeatherSource};

#[derive(Clone)]
struct Script {
    hits: Arc<AtomicUsize>,
    /// Status codes answered before the first success.
    failures: Vec<StatusCode>,
}

async fn real_time(
    State(script): State<Script>,
    Query(params): Query<Vec<(String, String)>>,
) -> (StatusCode, Json<Value>) {
    let hit = script.hits.fetch_add(1, Ordering::SeqCst);
    if let Some(status) = script.failures.get(hit) {
        return (*status, Json(json!({})));
    }

    let has = |key: &str, value: &str| params.iter().any(|(k, v)| k == key && v == value);
    if !has("wind_speed_unitid", "8") || !has("mac", "C8:C9:A3:1C:0D:E5") {
        return (
            StatusCode::OK,
            Json(json!({ "code": 40000, "msg": "bad parameters", "data": [] })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "code": 0,
            "msg": "success",
            "data": {
                "wind": {
                    "wind_speed": { "time": "1736700000", "unit": "knots", "value": "17.8" },
                    "wind_gust": { "time": "1736700000", "unit": "knots", "value": "21.4" },
                    "wind_direction": { "time": "1736700000", "unit": "º", "value": "101" }
                }
            }
        })),
    )
}

async fn history(State(script): State<Script>) -> Json<Value> {
    script.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "code": 0,
        "msg": "success",
        "data": {
            "wind": {
                "wind_speed": { "unit": "knots", "list": { "1736701800": "18.0", "1736700000": "16.5" } },
                "wind_gust": { "unit": "knots", "list": { "1736701800": "22.0", "1736700000": "20.0" } }
            }
        }
    }))
}

async fn start(failures: Vec<StatusCode>) -> (EcowittClient, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let script = Script {
        hits: hits.clone(),
        failures,
    };
    let app = Router::new()
        .route("/device/real_time", get(real_time))
        .route("/device/history", get(history))
        .with_state(script);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = EcowittConfig::new("app-key", "api-key", "C8:C9:A3:1C:0D:E5")
        .with_base_url(&format!("http://{addr}"));
    config.initial_backoff = Duration::from_millis(10);

    (EcowittClient::new(config).unwrap(), hits)
}

#[tokio::test]
async fn test_real_time_reading() {
    let (client, hits) = start(vec![]).await;

    let sample = client.current().await.unwrap();

    assert_eq!(sample.speed_knots(), 17.8);
    assert_eq!(sample.gust_knots(), 21.4);
    assert_eq!(sample.direction_degrees(), 101.0);
    assert_eq!(sample.temperature_celsius(), None);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retries_server_errors_and_rate_limits() {
    let (client, hits) = start(vec![
        StatusCode::SERVICE_UNAVAILABLE,
        StatusCode::TOO_MANY_REQUESTS,
    ])
    .await;

    let sample = client.current().await.unwrap();

    assert_eq!(sample.speed_knots(), 17.8);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_gives_up_after_bounded_retries() {
    let (client, hits) = start(vec![StatusCode::BAD_GATEWAY; 5]).await;

    let result = client.current().await;

    assert!(matches!(result, Err(WeatherError::Status(502))));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let (client, hits) = start(vec![StatusCode::FORBIDDEN]).await;

    let result = client.current().await;

    assert!(matches!(result, Err(WeatherError::Status(403))));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_history_is_sorted() {
    let (client, _) = start(vec![]).await;
    let to = Utc.with_ymd_and_hms(2025, 1, 12, 18, 0, 0).unwrap();

    let history = client
        .history(to - chrono::Duration::hours(24), to)
        .await
        .unwrap();

    assert_eq!(history.history.len(), 2);
    assert_eq!(history.history[0].speed_knots, 16.5);
    assert_eq!(history.history[1].gust_knots, 22.0);
}

#[tokio::test]
async fn test_unreachable_station() {
    let mut config = EcowittConfig::new("a", "b", "c").with_base_url("http://127.0.0.1:9");
    config.initial_backoff = Duration::from_millis(5);
    config.max_retries = 1;
    let client = EcowittClient::new(config).unwrap();

    let result = client.current().await;

    assert!(matches!(result, Err(WeatherError::Transport(_))));
}
