//! Dashboard monitor.
//!
//! A single task that keeps a live view of the spot:
//!
//! - every 30 seconds the station is read and the derived conditions are
//!   recomputed; a failed read keeps the last good snapshot, marked stale,
//!   with an error message until the next success or until dismissed
//! - every 5 minutes the local notification rules run against the current
//!   snapshot
//!
//! Local notifications are a lighter version of the push alerts. Each kind
//! fires at most once until the flags reset, two hours after the last reset.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::alerting::AlertRules;
use crate::data_sources::{WeatherError, WeatherSource};
use crate::model::{Conditions, WindSample};
use crate::verdict::is_offshore;

pub const REFRESH_INTERVAL: StdDuration = StdDuration::from_secs(30);
pub const NOTIFY_INTERVAL: StdDuration = StdDuration::from_secs(5 * 60);

/// Time after which the sent-notification flags are cleared.
pub const NOTIFICATION_RESET_HOURS: i64 = 2;

/// Lower bound of the "acceptable" band, knots.
const ACCEPTABLE_MIN_KNOTS: f64 = 12.0;
/// Upper bound (inclusive) of the "acceptable" band, knots.
const ACCEPTABLE_MAX_KNOTS: f64 = 14.0;

// ============================================================================
// Dashboard state
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub conditions: Conditions,
    pub fetched_at: DateTime<Utc>,
}

/// What the dashboard shows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardState {
    pub snapshot: Option<Snapshot>,
    /// The snapshot is older than the last refresh attempt.
    pub stale: bool,
    /// Dismissible message from the last failed refresh.
    pub error: Option<String>,
}

impl DashboardState {
    pub fn apply_refresh(&mut self, result: Result<WindSample, WeatherError>, now: DateTime<Utc>) {
        match result {
            Ok(sample) => {
                self.snapshot = Some(Snapshot {
                    conditions: Conditions::from_sample(&sample),
                    fetched_at: now,
                });
                self.stale = false;
                self.error = None;
            }
            Err(e) => {
                self.stale = self.snapshot.is_some();
                self.error = Some(format!("No se pudieron actualizar los datos: {e}"));
            }
        }
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// The sample to evaluate, if there is a current one.
    pub fn live_sample(&self) -> Option<&WindSample> {
        if self.stale {
            return None;
        }
        self.snapshot.as_ref().map(|s| &s.conditions.sample)
    }
}

// ============================================================================
// Local notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalAlertKind {
    Dangerous,
    Good,
    Acceptable,
    WindIncreased,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalNotification {
    pub kind: LocalAlertKind,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SentFlags {
    dangerous: bool,
    /// Shared by good and acceptable.
    good: bool,
    wind_increased: bool,
}

/// Client-side notification rules with once-per-window flags.
#[derive(Debug, Clone)]
pub struct LocalNotifier {
    min_navigable_wind_knots: f64,
    rules: AlertRules,
    sent: SentFlags,
    last_reset: DateTime<Utc>,
    previous_speed: Option<f64>,
}

impl LocalNotifier {
    pub fn new(min_navigable_wind_knots: u32, rules: AlertRules, now: DateTime<Utc>) -> Self {
        Self {
            min_navigable_wind_knots: f64::from(min_navigable_wind_knots),
            rules,
            sent: SentFlags::default(),
            last_reset: now,
            previous_speed: None,
        }
    }

    /// Evaluate one observation and return the notifications to show.
    pub fn evaluate(&mut self, sample: &WindSample, now: DateTime<Utc>) -> Vec<LocalNotification> {
        if now.signed_duration_since(self.last_reset) >= Duration::hours(NOTIFICATION_RESET_HOURS) {
            self.sent = SentFlags::default();
            self.last_reset = now;
        }

        let speed = sample.speed_knots();
        let gust = sample.gust_knots();
        let cardinal = sample.cardinal();
        let offshore = is_offshore(sample.direction_degrees());
        let dangerous = self.rules.is_dangerous(sample);
        let navigable = speed >= self.min_navigable_wind_knots;

        let mut out = Vec::new();

        if dangerous && !self.sent.dangerous {
            out.push(LocalNotification {
                kind: LocalAlertKind::Dangerous,
                title: "⚠️ Condiciones extremas".to_string(),
                body: format!("Viento {speed:.0} kts, rachas {gust:.0} kts"),
            });
            self.sent.dangerous = true;
        }

        let good = navigable && speed < self.rules.max_good_speed_knots && !offshore && !dangerous;
        if good && !self.sent.good {
            out.push(LocalNotification {
                kind: LocalAlertKind::Good,
                title: "🪁 ¡Condiciones ideales!".to_string(),
                body: format!("{speed:.0} kts {cardinal}"),
            });
            self.sent.good = true;
        }

        let acceptable = (ACCEPTABLE_MIN_KNOTS..=ACCEPTABLE_MAX_KNOTS).contains(&speed)
            && !offshore
            && !dangerous;
        if acceptable && !self.sent.good {
            out.push(LocalNotification {
                kind: LocalAlertKind::Acceptable,
                title: "🌬️ Condiciones aceptables".to_string(),
                body: format!("{speed:.0} kts {cardinal} - Con kite 14-17 m"),
            });
            self.sent.good = true;
        }

        let increased = self
            .previous_speed
            .is_some_and(|previous| previous < self.min_navigable_wind_knots);
        if increased && navigable && !self.sent.wind_increased {
            out.push(LocalNotification {
                kind: LocalAlertKind::WindIncreased,
                title: "📈 El viento subió".to_string(),
                body: format!("Ahora {speed:.0} kts {cardinal}"),
            });
            self.sent.wind_increased = true;
        }

        self.previous_speed = Some(speed);
        out
    }
}

// ============================================================================
// Polling loop
// ============================================================================

pub struct Monitor {
    weather: Arc<dyn WeatherSource>,
    state: DashboardState,
    notifier: LocalNotifier,
    refresh_every: StdDuration,
    notify_every: StdDuration,
}

impl Monitor {
    pub fn new(weather: Arc<dyn WeatherSource>, notifier: LocalNotifier) -> Self {
        Self {
            weather,
            state: DashboardState::default(),
            notifier,
            refresh_every: REFRESH_INTERVAL,
            notify_every: NOTIFY_INTERVAL,
        }
    }

    pub fn with_intervals(mut self, refresh_every: StdDuration, notify_every: StdDuration) -> Self {
        self.refresh_every = refresh_every;
        self.notify_every = notify_every;
        self
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub async fn refresh(&mut self) {
        let now = Utc::now();
        let result = self.weather.current().await;

        match &result {
            Ok(sample) => info!(
                speed = sample.speed_knots(),
                gust = sample.gust_knots(),
                cardinal = %sample.cardinal(),
                "Conditions refreshed"
            ),
            Err(e) => warn!(error = %e, "Refresh failed, keeping last snapshot"),
        }

        self.state.apply_refresh(result, now);

        if let Some(snapshot) = &self.state.snapshot {
            let c = &snapshot.conditions;
            info!(
                verdict = c.verdict.text,
                stability = ?c.stability.label,
                gust_factor = c.stability.gust_factor_percent,
                kite = c.kite_size,
                stale = self.state.stale,
                "Dashboard"
            );
        }
    }

    pub fn check_notifications(&mut self) -> Vec<LocalNotification> {
        let Some(sample) = self.state.live_sample().cloned() else {
            return Vec::new();
        };

        let notifications = self.notifier.evaluate(&sample, Utc::now());
        for notification in &notifications {
            info!(
                kind = ?notification.kind,
                title = %notification.title,
                body = %notification.body,
                "Notification"
            );
        }
        notifications
    }

    /// Run until `shutdown` completes.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let mut refresh = tokio::time::interval(self.refresh_every);
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut notify = tokio::time::interval(self.notify_every);
        notify.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Monitor stopping");
                    break;
                }
                _ = refresh.tick() => {
                    self.refresh().await;
                }
                _ = notify.tick() => {
                    self.check_notifications();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HistoryResponse;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 20, 13, 0, 0).unwrap()
    }

    fn sample(speed: f64, gust: f64, direction: f64) -> WindSample {
        WindSample::new(speed, gust, direction, Some(25.0), t0()).unwrap()
    }

    fn local_notifier(min: u32) -> LocalNotifier {
        LocalNotifier::new(min, AlertRules::default(), t0())
    }

    fn kinds(notifications: &[LocalNotification]) -> Vec<LocalAlertKind> {
        notifications.iter().map(|n| n.kind).collect()
    }

    #[test]
    fn test_good_fires_once_per_window() {
        let mut notifier = local_notifier(15);
        let first = notifier.evaluate(&sample(18.0, 21.0, 180.0), t0());
        assert_eq!(kinds(&first), vec![LocalAlertKind::Good]);

        let again = notifier.evaluate(&sample(19.0, 22.0, 180.0), t0() + Duration::minutes(5));
        assert!(again.is_empty());

        let after_reset =
            notifier.evaluate(&sample(19.0, 22.0, 180.0), t0() + Duration::hours(2));
        assert_eq!(kinds(&after_reset), vec![LocalAlertKind::Good]);
    }

    #[test]
    fn test_dangerous_suppresses_good() {
        let mut notifier = local_notifier(15);
        let out = notifier.evaluate(&sample(24.0, 36.0, 180.0), t0());
        assert_eq!(kinds(&out), vec![LocalAlertKind::Dangerous]);
    }

    #[test]
    fn test_good_upper_bound_is_exclusive() {
        let mut notifier = local_notifier(15);
        assert!(notifier.evaluate(&sample(27.0, 29.0, 180.0), t0()).is_empty());
    }

    #[test]
    fn test_acceptable_only_when_good_has_not_fired() {
        let mut notifier = local_notifier(15);
        let out = notifier.evaluate(&sample(13.0, 15.0, 180.0), t0());
        assert_eq!(kinds(&out), vec![LocalAlertKind::Acceptable]);

        let mut notifier = local_notifier(12);
        let out = notifier.evaluate(&sample(13.0, 15.0, 180.0), t0());
        assert_eq!(kinds(&out), vec![LocalAlertKind::Good]);
    }

    #[test]
    fn test_offshore_is_neither_good_nor_acceptable() {
        let mut notifier = local_notifier(12);
        assert!(notifier.evaluate(&sample(18.0, 20.0, 10.0), t0()).is_empty());
        assert!(notifier.evaluate(&sample(13.0, 14.0, 330.0), t0()).is_empty());
    }

    #[test]
    fn test_wind_increased() {
        let mut notifier = local_notifier(15);
        assert!(notifier.evaluate(&sample(8.0, 10.0, 180.0), t0()).is_empty());

        let out = notifier.evaluate(&sample(16.0, 18.0, 180.0), t0() + Duration::minutes(5));
        assert_eq!(
            kinds(&out),
            vec![LocalAlertKind::Good, LocalAlertKind::WindIncreased]
        );
    }

    #[test]
    fn test_failed_refresh_keeps_snapshot_and_marks_stale() {
        let mut state = DashboardState::default();
        state.apply_refresh(Ok(sample(18.0, 21.0, 120.0)), t0());
        assert!(!state.stale);
        assert!(state.live_sample().is_some());

        state.apply_refresh(Err(WeatherError::Status(503)), t0() + Duration::seconds(30));
        assert!(state.stale);
        assert!(state.error.is_some());
        assert!(state.live_sample().is_none());
        let snapshot = state.snapshot.as_ref().unwrap();
        assert_eq!(snapshot.fetched_at, t0());
        assert_eq!(snapshot.conditions.sample.speed_knots(), 18.0);

        state.dismiss_error();
        assert!(state.error.is_none());

        state.apply_refresh(Ok(sample(20.0, 22.0, 120.0)), t0() + Duration::seconds(60));
        assert!(!state.stale);
    }

    #[test]
    fn test_failed_first_refresh_is_not_stale() {
        let mut state = DashboardState::default();
        state.apply_refresh(Err(WeatherError::Status(500)), t0());
        assert!(state.snapshot.is_none());
        assert!(!state.stale);
        assert!(state.error.is_some());
    }

    struct QueueWeather(Mutex<Vec<Result<WindSample, WeatherError>>>);

    #[async_trait]
    impl WeatherSource for QueueWeather {
        async fn current(&self) -> Result<WindSample, WeatherError> {
            self.0.lock().unwrap().remove(0)
        }

        async fn history(
            &self,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<HistoryResponse, WeatherError> {
            Err(WeatherError::Status(404))
        }
    }

    #[tokio::test]
    async fn test_monitor_refresh_and_notify() {
        let weather = QueueWeather(Mutex::new(vec![
            Ok(sample(18.0, 21.0, 180.0)),
            Err(WeatherError::Status(503)),
        ]));
        let mut monitor = Monitor::new(Arc::new(weather), local_notifier(15));

        monitor.refresh().await;
        assert_eq!(kinds(&monitor.check_notifications()), vec![LocalAlertKind::Good]);

        monitor.refresh().await;
        assert!(monitor.state().stale);
        assert!(monitor.check_notifications().is_empty());
    }
}
