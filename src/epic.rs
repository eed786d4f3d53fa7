//! Epic-condition tracker.
//!
//! "Epic" is 17-25 knots from E through SE that is not dangerous, held
//! continuously for a sustain duration (10 minutes by default). Alert runs
//! are independent scheduled invocations with no shared memory, so the
//! streak is kept as a durable [`EpicTracker`] record: storage reads it at
//! the start of a run, [`EpicTracker::advance`] computes the next record,
//! and storage writes it back.
//!
//! # State Machine
//!
//! ```text
//!          qualifying               elapsed >= sustain
//!  Idle ─────────────► Accumulating ─────────────────► Sustained
//!   ▲                     │                                │
//!   │   not qualifying    │                                │
//!   └─────────────────────┘                                │
//!   │                     not qualifying                   │
//!   └──────────────────────────────────────────────────────┘
//! ```
//!
//! A single non-qualifying observation returns to `Idle`. There is no
//! averaging and no grace period; the next streak starts from zero.
//!
//! Elapsed time is measured from the persisted start timestamp, never by
//! counting runs.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::model::WindSample;

/// Speed and direction window that counts as epic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpicRules {
    /// Inclusive lower speed bound, knots.
    pub min_speed_knots: f64,
    /// Exclusive upper speed bound, knots.
    pub max_speed_knots: f64,
    /// Inclusive lower direction bound, degrees (E).
    pub min_direction_degrees: f64,
    /// Inclusive upper direction bound, degrees (SE).
    pub max_direction_degrees: f64,
    /// How long the condition must hold before it is sustained.
    pub sustain: Duration,
}

impl Default for EpicRules {
    fn default() -> Self {
        Self {
            min_speed_knots: 17.0,
            max_speed_knots: 25.0,
            min_direction_degrees: 68.0,
            max_direction_degrees: 146.0,
            sustain: Duration::minutes(10),
        }
    }
}

impl EpicRules {
    /// Speed and direction check only; the caller folds in the danger check.
    pub fn in_window(&self, sample: &WindSample) -> bool {
        let speed = sample.speed_knots();
        let direction = sample.direction_degrees();

        speed >= self.min_speed_knots
            && speed < self.max_speed_knots
            && direction >= self.min_direction_degrees
            && direction <= self.max_direction_degrees
    }
}

/// The three states derived from a tracker record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EpicState {
    Idle,
    Accumulating { started_at: DateTime<Utc> },
    Sustained { started_at: DateTime<Utc> },
}

impl EpicState {
    pub fn is_sustained(&self) -> bool {
        matches!(self, EpicState::Sustained { .. })
    }
}

/// What a single observation did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EpicTransition {
    /// Not qualifying, no streak to break.
    Idle,
    /// First qualifying observation of a streak.
    Started,
    /// Still qualifying, sustain duration not reached.
    Accumulating,
    /// Sustain duration reached on this observation.
    BecameSustained,
    /// Already sustained and still qualifying.
    Sustained,
    /// A streak was in progress and this observation did not qualify.
    Broken,
}

/// Durable tracker record. One row, overwritten on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EpicTracker {
    pub started_at: Option<DateTime<Utc>>,
    pub sustained: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_speed_knots: Option<f64>,
    pub last_direction_degrees: Option<f64>,
    /// When the most recent streak ended (diagnostics only).
    pub broken_at: Option<DateTime<Utc>>,
}

/// Result of [`EpicTracker::advance`].
#[derive(Debug, Clone, PartialEq)]
pub struct EpicUpdate {
    pub tracker: EpicTracker,
    pub transition: EpicTransition,
}

impl EpicTracker {
    pub fn state(&self) -> EpicState {
        match (self.started_at, self.sustained) {
            (None, _) => EpicState::Idle,
            (Some(started_at), false) => EpicState::Accumulating { started_at },
            (Some(started_at), true) => EpicState::Sustained { started_at },
        }
    }

    /// Compute the record that follows this one after observing `sample`.
    ///
    /// | Current state | qualifying | Next state |
    /// |---------------|------------|------------|
    /// | Idle | false | Idle |
    /// | Idle | true | Accumulating (`started_at = now`) |
    /// | Accumulating | true | Sustained if `now - started_at >= sustain` |
    /// | Accumulating / Sustained | false | Idle (`broken_at = now`) |
    /// | Sustained | true | Sustained |
    pub fn advance(
        &self,
        sample: &WindSample,
        qualifying: bool,
        sustain: Duration,
        now: DateTime<Utc>,
    ) -> EpicUpdate {
        let mut next = EpicTracker {
            started_at: self.started_at,
            sustained: self.sustained,
            last_checked_at: Some(now),
            last_speed_knots: Some(sample.speed_knots()),
            last_direction_degrees: Some(sample.direction_degrees()),
            broken_at: self.broken_at,
        };

        let transition = match (self.started_at, qualifying) {
            (None, false) => {
                next.sustained = false;
                EpicTransition::Idle
            }
            (Some(_), false) => {
                next.started_at = None;
                next.sustained = false;
                next.broken_at = Some(now);
                EpicTransition::Broken
            }
            (None, true) => {
                next.started_at = Some(now);
                next.sustained = false;
                EpicTransition::Started
            }
            (Some(started_at), true) => {
                let was_sustained = self.sustained;
                next.sustained = now.signed_duration_since(started_at) >= sustain;
                match (was_sustained, next.sustained) {
                    (_, false) => EpicTransition::Accumulating,
                    (false, true) => EpicTransition::BecameSustained,
                    (true, true) => EpicTransition::Sustained,
                }
            }
        };

        EpicUpdate {
            tracker: next,
            transition,
        }
    }
}
