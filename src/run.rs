//! One scheduled alert run.
//!
//! Runs are independent invocations with no memory of their own. Everything
//! that must survive between runs (the epic tracker, the alert log and the
//! subscriber list) is read from storage at the start and written back at
//! the end:
//!
//! 1. fetch the current sample (abort on failure, nothing written)
//! 2. load the tracker, advance it, save it
//! 3. read the latest alert log entry for the cooldown gate
//! 4. decide per active subscriber
//! 5. dispatch concurrently
//! 6. append one log entry if anything was sent
//!
//! Once pushes have gone out the run always reports them. A failed log write
//! at that point is logged and flagged with `log_written: false` instead of
//! failing the run.
//!
//! Overlapping runs are not coordinated; the scheduler is expected to run
//! them one at a time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::alerting::{AlertRules, CooldownGate, decide};
use crate::data_sources::WeatherSource;
use crate::dispatch::{DispatchSummary, PushSender, dispatch};
use crate::epic::{EpicState, EpicTransition};
use crate::error::RunError;
use crate::model::{AlertLogEntry, AlertType, WindSnapshot};
use crate::storage::Storage;

#[derive(Debug, Clone, Serialize)]
pub struct EpicReport {
    #[serde(flatten)]
    pub state: EpicState,
    pub transition: EpicTransition,
}

#[derive(Debug, Clone, Serialize)]
pub struct CooldownReport {
    /// Type of the most recent alert while it is still cooling down.
    pub alert_type: Option<AlertType>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Outcome of a successful run, returned to the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub ok: bool,
    pub checked_at: DateTime<Utc>,
    pub wind: WindSnapshot,
    /// Highest-priority alert type actually delivered.
    pub alert: Option<AlertType>,
    pub epic: EpicReport,
    pub subscribers: DispatchSummary,
    pub cooldown: CooldownReport,
    /// False when alerts went out but the log entry could not be stored.
    pub log_written: bool,
}

#[instrument(skip_all, fields(now = %now))]
pub async fn run_alert_cycle(
    storage: &Storage,
    weather: &dyn WeatherSource,
    push: &dyn PushSender,
    rules: &AlertRules,
    now: DateTime<Utc>,
) -> Result<RunReport, RunError> {
    let sample = weather.current().await?;

    let tracker = storage.load_epic_tracker().await?;
    let qualifying = rules.is_epic_candidate(&sample);
    let update = tracker.advance(&sample, qualifying, rules.epic.sustain, now);
    storage.save_epic_tracker(&update.tracker).await?;
    let epic = update.tracker.state();

    let last_alert = storage.latest_alert_log().await?;
    let gate = CooldownGate::new(last_alert.as_ref(), rules.cooldown, now);

    let subscribers = storage.active_subscribers().await?;
    let decisions: Vec<_> = subscribers
        .into_iter()
        .map(|subscriber| {
            let decision = decide(&sample, epic, &subscriber.config, &gate, rules);
            (subscriber, decision)
        })
        .collect();

    let summary = dispatch(storage, push, &decisions, now).await;
    let wind = WindSnapshot::from(&sample);

    let mut log_written = true;
    if let Some(alert_type) = summary.alert_type.filter(|_| summary.sent > 0) {
        let entry = AlertLogEntry {
            sent_at: now,
            alert_type,
            wind: wind.clone(),
            subscribers_sent: summary.sent,
            subscribers_skipped: summary.skipped,
            subscribers_expired: summary.expired,
            subscribers_failed: summary.failed,
        };
        if let Err(e) = storage.append_alert_log(&entry).await {
            warn!(
                error = %e,
                alert = alert_type.as_str(),
                sent = summary.sent,
                "Alerts delivered but the alert log entry was not stored"
            );
            log_written = false;
        }
    }

    info!(
        speed = sample.speed_knots(),
        gust = sample.gust_knots(),
        direction = sample.direction_degrees(),
        epic = ?update.transition,
        alert = summary.alert_type.map(|t| t.as_str()),
        total = summary.total,
        sent = summary.sent,
        skipped = summary.skipped,
        expired = summary.expired,
        failed = summary.failed,
        "Alert run complete"
    );

    Ok(RunReport {
        ok: true,
        checked_at: now,
        wind,
        alert: summary.alert_type,
        epic: EpicReport {
            state: epic,
            transition: update.transition,
        },
        subscribers: summary,
        cooldown: CooldownReport {
            alert_type: gate.cooling_type(),
            ends_at: gate.ends_at(),
        },
        log_written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_sources::WeatherError;
    use crate::dispatch::PushError;
    use crate::alerting::PushPayload;
    use crate::model::{HistoryResponse, Subscriber, SubscriberConfig, WindSample};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedWeather(Option<(f64, f64, f64)>);

    #[async_trait]
    impl WeatherSource for FixedWeather {
        async fn current(&self) -> Result<WindSample, WeatherError> {
            let (speed, gust, direction) = self.0.ok_or(WeatherError::Status(503))?;
            Ok(WindSample::new(speed, gust, direction, Some(22.0), Utc::now()).unwrap())
        }

        async fn history(
            &self,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<HistoryResponse, WeatherError> {
            Err(WeatherError::Status(503))
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        titles: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PushSender for RecordingSender {
        async fn send(&self, _subscriber: &Subscriber, payload: &PushPayload) -> Result<(), PushError> {
            self.titles.lock().unwrap().push(payload.title.clone());
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 18, 14, 0, 0).unwrap()
    }

    async fn storage_with_subscriber() -> Storage {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        storage
            .upsert_subscriber(
                "https://push.example/1",
                &json!({ "endpoint": "https://push.example/1" }),
                SubscriberConfig::default(),
                t0(),
            )
            .await
            .unwrap();
        storage
    }

    #[tokio::test]
    async fn test_weather_failure_leaves_tracker_untouched() {
        let storage = storage_with_subscriber().await;
        let sender = RecordingSender::default();

        let result = run_alert_cycle(
            &storage,
            &FixedWeather(None),
            &sender,
            &AlertRules::default(),
            t0(),
        )
        .await;

        assert!(matches!(result, Err(RunError::WeatherUnavailable(_))));
        assert_eq!(storage.load_epic_tracker().await.unwrap().last_checked_at, None);
        assert!(storage.latest_alert_log().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_epic_streak_across_runs_with_cooldown() {
        let storage = storage_with_subscriber().await;
        let sender = RecordingSender::default();
        let weather = FixedWeather(Some((20.0, 23.0, 110.0)));
        let rules = AlertRules::default();

        // Run 1: streak starts, onshore 20 kts is "good".
        let run1 = run_alert_cycle(&storage, &weather, &sender, &rules, t0()).await.unwrap();
        assert_eq!(run1.epic.transition, EpicTransition::Started);
        assert_eq!(run1.alert, Some(AlertType::Good));
        assert_eq!(run1.subscribers.sent, 1);

        // Run 2: 15 minutes later the streak is sustained; epic differs from
        // the cooling "good" type so it goes out.
        let t2 = t0() + Duration::minutes(15);
        let run2 = run_alert_cycle(&storage, &weather, &sender, &rules, t2).await.unwrap();
        assert_eq!(run2.epic.transition, EpicTransition::BecameSustained);
        assert_eq!(run2.alert, Some(AlertType::Epic));
        assert_eq!(run2.cooldown.alert_type, Some(AlertType::Good));

        // Run 3: epic again, now suppressed by its own cooldown.
        let t3 = t0() + Duration::minutes(30);
        let run3 = run_alert_cycle(&storage, &weather, &sender, &rules, t3).await.unwrap();
        assert_eq!(run3.alert, None);
        assert_eq!(run3.subscribers.skipped, 1);
        assert_eq!(run3.cooldown.alert_type, Some(AlertType::Epic));

        let latest = storage.latest_alert_log().await.unwrap().unwrap();
        assert_eq!(latest.alert_type, AlertType::Epic);
        assert_eq!(latest.sent_at, t2);

        let titles = sender.titles.lock().unwrap().clone();
        assert_eq!(titles, vec!["🪁 ¡Hay viento!", "👑 ¡ÉPICO!"]);
    }

    #[tokio::test]
    async fn test_tracker_advances_without_subscribers() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let sender = RecordingSender::default();
        let weather = FixedWeather(Some((19.0, 21.0, 100.0)));

        let report = run_alert_cycle(&storage, &weather, &sender, &AlertRules::default(), t0())
            .await
            .unwrap();

        assert_eq!(report.subscribers.total, 0);
        assert_eq!(report.alert, None);
        assert_eq!(
            storage.load_epic_tracker().await.unwrap().started_at,
            Some(t0())
        );
        assert!(storage.latest_alert_log().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dangerous_gust_breaks_epic_streak() {
        let storage = storage_with_subscriber().await;
        let sender = RecordingSender::default();
        let rules = AlertRules::default();

        run_alert_cycle(&storage, &FixedWeather(Some((20.0, 23.0, 110.0))), &sender, &rules, t0())
            .await
            .unwrap();
        let report = run_alert_cycle(
            &storage,
            &FixedWeather(Some((22.0, 36.0, 110.0))),
            &sender,
            &rules,
            t0() + Duration::minutes(15),
        )
        .await
        .unwrap();

        assert_eq!(report.epic.transition, EpicTransition::Broken);
        assert_eq!(report.alert, Some(AlertType::Dangerous));
    }

    #[tokio::test]
    async fn test_failed_log_write_still_reports_deliveries() {
        let storage = storage_with_subscriber().await;
        let sender = RecordingSender::default();
        sqlx::query(
            r#"
            CREATE TRIGGER reject_alert_log BEFORE INSERT ON alert_log
            BEGIN
                SELECT RAISE(ABORT, 'disk full');
            END
            "#,
        )
        .execute(storage.pool())
        .await
        .unwrap();

        let report = run_alert_cycle(
            &storage,
            &FixedWeather(Some((18.0, 21.0, 200.0))),
            &sender,
            &AlertRules::default(),
            t0(),
        )
        .await
        .unwrap();

        assert!(report.ok);
        assert!(!report.log_written);
        assert_eq!(report.alert, Some(AlertType::Good));
        assert_eq!(report.subscribers.sent, 1);
        assert_eq!(sender.titles.lock().unwrap().len(), 1);
        assert!(storage.latest_alert_log().await.unwrap().is_none());
        // The tracker was saved before dispatch and is unaffected.
        assert_eq!(
            storage.load_epic_tracker().await.unwrap().last_checked_at,
            Some(t0())
        );
    }

    #[tokio::test]
    async fn test_log_written_flag_on_normal_run() {
        let storage = storage_with_subscriber().await;
        let sender = RecordingSender::default();

        let report = run_alert_cycle(
            &storage,
            &FixedWeather(Some((18.0, 21.0, 200.0))),
            &sender,
            &AlertRules::default(),
            t0(),
        )
        .await
        .unwrap();

        assert!(report.log_written);
        assert_eq!(
            storage.latest_alert_log().await.unwrap().unwrap().alert_type,
            AlertType::Good
        );
    }
}
