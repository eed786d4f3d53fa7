//! Gust stability index.
//!
//! The gust factor is `(1 - speed / gust) * 100`: the share of the peak gust
//! that the mean wind does not reach. 0% is a perfectly steady wind and
//! higher values are gustier. This is the only direction supported.

use serde::Serialize;

/// Below this mean speed nobody is kiting, so gustiness is not reported.
pub const MIN_KITING_SPEED_KNOTS: f64 = 12.0;

/// Upper bound (inclusive) of a stable gust factor, in percent.
pub const STABLE_MAX_PERCENT: f64 = 15.0;

/// Upper bound (inclusive) of a gusty gust factor, in percent.
pub const GUSTY_MAX_PERCENT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityLabel {
    NotApplicable,
    UltraStable,
    Stable,
    Gusty,
    VeryGusty,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StabilityIndex {
    pub gust_factor_percent: Option<f64>,
    pub label: StabilityLabel,
}

impl StabilityIndex {
    fn not_applicable() -> Self {
        Self {
            gust_factor_percent: None,
            label: StabilityLabel::NotApplicable,
        }
    }

    /// Classify the gustiness of a speed/gust pair.
    ///
    /// - missing or non-positive input: not applicable
    /// - speed below 12 knots: not applicable
    /// - gust at or below speed: factor 0, ultra stable
    /// - otherwise `<=15%` stable, `<=30%` gusty, above that very gusty
    pub fn compute(speed_knots: Option<f64>, gust_knots: Option<f64>) -> Self {
        let (Some(speed), Some(gust)) = (speed_knots, gust_knots) else {
            return Self::not_applicable();
        };
        if !(speed > 0.0 && gust > 0.0) {
            return Self::not_applicable();
        }
        if speed < MIN_KITING_SPEED_KNOTS {
            return Self::not_applicable();
        }
        if gust <= speed {
            return Self {
                gust_factor_percent: Some(0.0),
                label: StabilityLabel::UltraStable,
            };
        }

        // Rounded to hundredths of a percent.
        let factor = ((1.0 - speed / gust) * 10_000.0).round() / 100.0;
        let label = if !factor.is_finite() {
            StabilityLabel::Unknown
        } else if factor <= STABLE_MAX_PERCENT {
            StabilityLabel::Stable
        } else if factor <= GUSTY_MAX_PERCENT {
            StabilityLabel::Gusty
        } else {
            StabilityLabel::VeryGusty
        };

        Self {
            gust_factor_percent: factor.is_finite().then_some(factor),
            label,
        }
    }
}
