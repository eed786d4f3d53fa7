//! Alert decision engine.
//!
//! For each subscriber, pick at most one alert for the current sample. The
//! first matching rule wins:
//!
//! 1. **epic**: the epic tracker is sustained
//! 2. **dangerous**: speed above 30 knots or gusts of 35 knots or more
//! 3. **offshore**: offshore wind at or above the subscriber's minimum
//! 4. **good**: onshore wind between the subscriber's minimum and 27 knots
//!
//! A global cooldown then suppresses the chosen alert when the most recent
//! alert sent to anyone was of the same type and is younger than the
//! cooldown. Only the single latest log entry is consulted, so a subscriber
//! who just became eligible can be held back by someone else's alert.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::epic::{EpicRules, EpicState};
use crate::model::{AlertLogEntry, AlertType, SubscriberConfig, WindSample};
use crate::verdict::is_offshore;

/// Global thresholds for the scheduled alert run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertRules {
    /// Mean speed strictly above this is dangerous.
    pub dangerous_speed_knots: f64,
    /// Gusts at or above this are dangerous.
    pub dangerous_gust_knots: f64,
    /// Highest mean speed still reported as "good".
    pub max_good_speed_knots: f64,
    /// Minimum age before the last-sent alert type may be sent again.
    pub cooldown: Duration,
    pub epic: EpicRules,
}

impl Default for AlertRules {
    fn default() -> Self {
        Self {
            dangerous_speed_knots: 30.0,
            dangerous_gust_knots: 35.0,
            max_good_speed_knots: 27.0,
            cooldown: Duration::minutes(120),
            epic: EpicRules::default(),
        }
    }
}

impl AlertRules {
    pub fn is_dangerous(&self, sample: &WindSample) -> bool {
        sample.speed_knots() > self.dangerous_speed_knots
            || sample.gust_knots() >= self.dangerous_gust_knots
    }

    /// Whether this sample counts towards an epic streak.
    pub fn is_epic_candidate(&self, sample: &WindSample) -> bool {
        self.epic.in_window(sample) && !self.is_dangerous(sample)
    }
}

/// A selected alert with its user-facing text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDecision {
    pub alert_type: AlertType,
    pub title: String,
    pub body: String,
}

impl AlertDecision {
    fn new(alert_type: AlertType, sample: &WindSample) -> Self {
        let speed = sample.speed_knots();
        let cardinal = sample.cardinal();

        let (title, body) = match alert_type {
            AlertType::Epic => (
                "👑 ¡ÉPICO!",
                format!("{speed:.0} kts del {cardinal} — ¡Condiciones soñadas!"),
            ),
            AlertType::Dangerous => (
                "⚠️ Condiciones extremas",
                format!(
                    "{speed:.0} kts, rachas {:.0} kts — Precaución",
                    sample.gust_knots()
                ),
            ),
            AlertType::Offshore => (
                "🚨 Viento Offshore",
                format!("{speed:.0} kts del {cardinal} — ¡No navegar!"),
            ),
            AlertType::Good => (
                "🪁 ¡Hay viento!",
                format!("{speed:.0} kts del {cardinal} — ¡A preparar el equipo!"),
            ),
        };

        Self {
            alert_type,
            title: title.to_string(),
            body,
        }
    }

    /// Web push payload as the service worker expects it.
    pub fn payload(&self) -> PushPayload {
        let urgent = self.alert_type.priority() <= 2;

        PushPayload {
            title: self.title.clone(),
            body: self.body.clone(),
            icon: NOTIFICATION_ICON.to_string(),
            badge: NOTIFICATION_ICON.to_string(),
            tag: format!("wind-alert-{}", self.alert_type.as_str()),
            vibrate: if urgent {
                vec![300, 100, 300, 100, 300]
            } else {
                vec![200, 100, 200]
            },
            require_interaction: urgent,
            data: PushData {
                url: NOTIFICATION_URL.to_string(),
            },
        }
    }
}

const NOTIFICATION_ICON: &str = "/icon-192.png";
const NOTIFICATION_URL: &str = "/?from_notification=true";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub vibrate: Vec<u32>,
    pub require_interaction: bool,
    pub data: PushData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushData {
    pub url: String,
}

/// Pick the alert for one subscriber, ignoring cooldown.
pub fn evaluate_alert(
    sample: &WindSample,
    epic: EpicState,
    config: &SubscriberConfig,
    rules: &AlertRules,
) -> Option<AlertDecision> {
    let speed = sample.speed_knots();
    let min_wind = f64::from(config.min_navigable_wind_knots);
    let offshore = is_offshore(sample.direction_degrees());

    let alert_type = if epic.is_sustained() {
        AlertType::Epic
    } else if rules.is_dangerous(sample) {
        AlertType::Dangerous
    } else if offshore && speed >= min_wind {
        AlertType::Offshore
    } else if !offshore && speed >= min_wind && speed <= rules.max_good_speed_knots {
        AlertType::Good
    } else {
        return None;
    };

    Some(AlertDecision::new(alert_type, sample))
}

/// Cooldown state for one run, derived from the most recent log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownGate {
    /// Type of the last alert and when its cooldown ends.
    active: Option<(AlertType, DateTime<Utc>)>,
}

impl CooldownGate {
    /// `last` is the most recent alert log entry, if any.
    pub fn new(last: Option<&AlertLogEntry>, cooldown: Duration, now: DateTime<Utc>) -> Self {
        let active = last
            .filter(|entry| now.signed_duration_since(entry.sent_at) < cooldown)
            .map(|entry| (entry.alert_type, entry.sent_at + cooldown));
        Self { active }
    }

    pub fn open() -> Self {
        Self { active: None }
    }

    /// Type of the last alert if it is still inside the cooldown window.
    pub fn cooling_type(&self) -> Option<AlertType> {
        self.active.map(|(kind, _)| kind)
    }

    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.active.map(|(_, until)| until)
    }

    pub fn suppresses(&self, alert_type: AlertType) -> bool {
        self.cooling_type() == Some(alert_type)
    }
}

/// Final per-subscriber decision after the cooldown gate.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriberDecision {
    Send(AlertDecision),
    NoAlert,
    CooledDown(AlertType),
}

pub fn decide(
    sample: &WindSample,
    epic: EpicState,
    config: &SubscriberConfig,
    gate: &CooldownGate,
    rules: &AlertRules,
) -> SubscriberDecision {
    match evaluate_alert(sample, epic, config, rules) {
        None => SubscriberDecision::NoAlert,
        Some(alert) if gate.suppresses(alert.alert_type) => {
            SubscriberDecision::CooledDown(alert.alert_type)
        }
        Some(alert) => SubscriberDecision::Send(alert),
    }
}
