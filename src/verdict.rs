//! Spot verdict: is it good to kite at La Bajada right now?
//!
//! Two independent speed classifiers live here and they intentionally
//! disagree:
//!
//! - [`spot_verdict`] drives the main verdict card. Offshore wind always
//!   wins, then speed is banded at 14/18/22/27/33 knots.
//! - [`speed_band`] colors the individual speed and gust readouts, banded at
//!   10/16/21/27/33 knots.
//!
//! All functions are total: missing inputs produce an "unknown" result
//! rather than an error.

use serde::Serialize;

use crate::model::WindSample;

/// Wind from this bearing (exclusive) round to [`OFFSHORE_TO_DEGREES`]
/// blows from land towards open water.
pub const OFFSHORE_FROM_DEGREES: f64 = 292.5;

/// Upper (inclusive) bound of the offshore sector.
pub const OFFSHORE_TO_DEGREES: f64 = 67.5;

/// True when the wind blows from land at La Bajada (NO through ENE).
pub fn is_offshore(degrees: f64) -> bool {
    degrees > OFFSHORE_FROM_DEGREES || degrees <= OFFSHORE_TO_DEGREES
}

/// Display tier used by the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TierColor {
    Gray,
    Blue,
    Green,
    Yellow,
    Orange,
    Red,
    Purple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictLabel {
    DangerOffshore,
    TooLight,
    Ideal,
    VeryGood,
    Strong,
    VeryStrong,
    TooStrong,
    Unknown,
}

impl VerdictLabel {
    pub fn tier(&self) -> TierColor {
        match self {
            VerdictLabel::DangerOffshore => TierColor::Red,
            VerdictLabel::TooLight => TierColor::Blue,
            VerdictLabel::Ideal => TierColor::Green,
            VerdictLabel::VeryGood => TierColor::Yellow,
            VerdictLabel::Strong => TierColor::Orange,
            VerdictLabel::VeryStrong => TierColor::Red,
            VerdictLabel::TooStrong => TierColor::Purple,
            VerdictLabel::Unknown => TierColor::Gray,
        }
    }

    /// Card text shown to riders.
    pub fn text(&self) -> &'static str {
        match self {
            VerdictLabel::DangerOffshore => "¡PELIGRO! VIENTO OFFSHORE",
            VerdictLabel::TooLight => "FLOJO...",
            VerdictLabel::Ideal => "¡IDEAL!",
            VerdictLabel::VeryGood => "¡MUY BUENO!",
            VerdictLabel::Strong => "¡FUERTE!",
            VerdictLabel::VeryStrong => "¡MUY FUERTE!",
            VerdictLabel::TooStrong => "¡DEMASIADO FUERTE!",
            VerdictLabel::Unknown => "Calculando...",
        }
    }
}

/// Safety/quality classification of the current wind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub label: VerdictLabel,
    pub tier: TierColor,
    pub text: &'static str,
}

impl Verdict {
    fn from_label(label: VerdictLabel) -> Self {
        Self {
            label,
            tier: label.tier(),
            text: label.text(),
        }
    }

    pub fn for_sample(sample: &WindSample) -> Self {
        spot_verdict(Some(sample.speed_knots()), Some(sample.direction_degrees()))
    }
}

/// Classify speed and direction into a verdict. First match wins:
///
/// 1. known direction in the offshore sector: `DangerOffshore`
/// 2. unknown speed: `Unknown`
/// 3. speed bands `<=14`, `<=18`, `<=22`, `<=27`, `<=33`, `>33`
///
/// Band edges belong to the lower band (14.0 is too light, 14.01 ideal).
pub fn spot_verdict(speed_knots: Option<f64>, direction_degrees: Option<f64>) -> Verdict {
    if let Some(degrees) = direction_degrees.filter(|d| d.is_finite()) {
        if is_offshore(degrees.rem_euclid(360.0)) {
            return Verdict::from_label(VerdictLabel::DangerOffshore);
        }
    }

    let Some(speed) = speed_knots.filter(|s| s.is_finite()) else {
        return Verdict::from_label(VerdictLabel::Unknown);
    };

    let label = if speed <= 14.0 {
        VerdictLabel::TooLight
    } else if speed <= 18.0 {
        VerdictLabel::Ideal
    } else if speed <= 22.0 {
        VerdictLabel::VeryGood
    } else if speed <= 27.0 {
        VerdictLabel::Strong
    } else if speed <= 33.0 {
        VerdictLabel::VeryStrong
    } else {
        VerdictLabel::TooStrong
    };

    Verdict::from_label(label)
}

/// Per-metric speed band, weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedBand {
    Light,
    Moderate,
    Good,
    Strong,
    VeryStrong,
    Extreme,
}

impl SpeedBand {
    pub fn tier(&self) -> TierColor {
        match self {
            SpeedBand::Light => TierColor::Blue,
            SpeedBand::Moderate => TierColor::Green,
            SpeedBand::Good => TierColor::Yellow,
            SpeedBand::Strong => TierColor::Orange,
            SpeedBand::VeryStrong => TierColor::Red,
            SpeedBand::Extreme => TierColor::Purple,
        }
    }
}

/// Band a single speed reading for the speed/gust sub-displays.
///
/// Uses its own breakpoints (10/16/21/27/33), not the verdict's. Returns
/// `None` for a missing reading, which renders gray.
pub fn speed_band(speed_knots: Option<f64>) -> Option<SpeedBand> {
    let speed = speed_knots.filter(|s| s.is_finite())?;

    let band = if speed <= 10.0 {
        SpeedBand::Light
    } else if speed <= 16.0 {
        SpeedBand::Moderate
    } else if speed <= 21.0 {
        SpeedBand::Good
    } else if speed <= 27.0 {
        SpeedBand::Strong
    } else if speed <= 33.0 {
        SpeedBand::VeryStrong
    } else {
        SpeedBand::Extreme
    };

    Some(band)
}

/// Direction relative to the shoreline, for the wind arrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindExposure {
    Offshore,
    Cross,
    Onshore,
}

impl WindExposure {
    pub fn from_degrees(degrees: f64) -> Self {
        let degrees = degrees.rem_euclid(360.0);
        if is_offshore(degrees) {
            WindExposure::Offshore
        } else if (degrees > 67.5 && degrees <= 112.5) || (degrees > 247.5 && degrees <= 292.5) {
            WindExposure::Cross
        } else {
            WindExposure::Onshore
        }
    }
}

/// Suggested kite size for a mean wind speed.
pub fn recommend_kite_size(speed_knots: f64) -> &'static str {
    if speed_knots < 12.0 {
        "12-14m"
    } else if speed_knots < 16.0 {
        "10-12m"
    } else if speed_knots < 20.0 {
        "9-10m"
    } else if speed_knots < 25.0 {
        "7-9m"
    } else if speed_knots < 30.0 {
        "5-7m"
    } else {
        "5m o menos"
    }
}

/// Short rule-based phrase for the verdict banner.
///
/// Served when no generated phrase is available. Offshore dominates,
/// then a finer speed scale than [`spot_verdict`] that also names a kite.
pub fn fallback_phrase(speed_knots: Option<f64>, direction_degrees: Option<f64>) -> &'static str {
    if let Some(degrees) = direction_degrees.filter(|d| d.is_finite()) {
        if is_offshore(degrees.rem_euclid(360.0)) {
            return "¡PELIGRO! VIENTO OFFSHORE";
        }
    }

    match speed_knots.filter(|s| s.is_finite()) {
        Some(speed) if speed <= 10.0 => "Muy flojo para navegar",
        Some(speed) if speed <= 14.0 => "Flojo, ideal para aprender",
        Some(speed) if speed <= 16.0 => "Aceptable para 12m",
        Some(speed) if speed <= 19.0 => "¡Ideal para 10m!",
        Some(speed) if speed <= 22.0 => "¡Muy bueno para 9m!",
        Some(speed) if speed <= 27.0 => "¡Fuerte! Usar 7-8m",
        Some(speed) if speed <= 33.0 => "¡Muy fuerte! Solo expertos",
        Some(_) => "¡Demasiado fuerte!",
        None => "Datos insuficientes",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offshore_dominates_any_speed() {
        let mut degrees = 292.6;
        while degrees < 360.0 {
            for speed in [0.0, 12.0, 18.0, 40.0] {
                let verdict = spot_verdict(Some(speed), Some(degrees));
                assert_eq!(verdict.label, VerdictLabel::DangerOffshore, "{degrees}°");
            }
            degrees += 0.7;
        }

        let mut degrees = 0.0;
        while degrees <= 67.5 {
            let verdict = spot_verdict(Some(18.0), Some(degrees));
            assert_eq!(verdict.label, VerdictLabel::DangerOffshore, "{degrees}°");
            degrees += 0.5;
        }
    }

    #[test]
    fn test_offshore_sector_edges() {
        assert!(is_offshore(67.5));
        assert!(!is_offshore(67.6));
        assert!(!is_offshore(292.5));
        assert!(is_offshore(292.51));
    }

    #[test]
    fn test_offshore_without_speed() {
        let verdict = spot_verdict(None, Some(10.0));
        assert_eq!(verdict.label, VerdictLabel::DangerOffshore);
        assert_eq!(verdict.tier, TierColor::Red);
    }

    #[test]
    fn test_unknown_speed() {
        let verdict = spot_verdict(None, Some(120.0));
        assert_eq!(verdict.label, VerdictLabel::Unknown);
        assert_eq!(verdict.tier, TierColor::Gray);

        assert_eq!(spot_verdict(None, None).label, VerdictLabel::Unknown);
    }

    #[test]
    fn test_unknown_direction_classifies_by_speed() {
        assert_eq!(spot_verdict(Some(16.0), None).label, VerdictLabel::Ideal);
    }

    #[test]
    fn test_speed_bands_upper_inclusive() {
        let cases = [
            (0.0, VerdictLabel::TooLight),
            (14.0, VerdictLabel::TooLight),
            (14.01, VerdictLabel::Ideal),
            (18.0, VerdictLabel::Ideal),
            (18.5, VerdictLabel::VeryGood),
            (22.0, VerdictLabel::VeryGood),
            (27.0, VerdictLabel::Strong),
            (33.0, VerdictLabel::VeryStrong),
            (33.1, VerdictLabel::TooStrong),
        ];
        for (speed, expected) in cases {
            assert_eq!(spot_verdict(Some(speed), Some(180.0)).label, expected, "{speed} kts");
        }
    }

    #[test]
    fn test_ideal_band_for_onshore_directions() {
        let mut speed = 14.05;
        while speed <= 18.0 {
            for degrees in [68.0, 120.0, 180.0, 250.0, 292.5] {
                assert_eq!(
                    spot_verdict(Some(speed), Some(degrees)).label,
                    VerdictLabel::Ideal
                );
            }
            speed += 0.25;
        }
    }

    #[test]
    fn test_speed_band_uses_its_own_breakpoints() {
        assert_eq!(speed_band(Some(10.0)), Some(SpeedBand::Light));
        assert_eq!(speed_band(Some(16.0)), Some(SpeedBand::Moderate));
        assert_eq!(speed_band(Some(21.0)), Some(SpeedBand::Good));
        assert_eq!(speed_band(Some(27.0)), Some(SpeedBand::Strong));
        assert_eq!(speed_band(Some(33.0)), Some(SpeedBand::VeryStrong));
        assert_eq!(speed_band(Some(33.5)), Some(SpeedBand::Extreme));
        assert_eq!(speed_band(None), None);
    }

    #[test]
    fn test_classifiers_disagree_at_12_knots() {
        // Too light on the card, already green on the readout.
        assert_eq!(spot_verdict(Some(12.0), Some(180.0)).label, VerdictLabel::TooLight);
        assert_eq!(speed_band(Some(12.0)).map(|b| b.tier()), Some(TierColor::Green));
    }

    #[test]
    fn test_exposure() {
        assert_eq!(WindExposure::from_degrees(0.0), WindExposure::Offshore);
        assert_eq!(WindExposure::from_degrees(90.0), WindExposure::Cross);
        assert_eq!(WindExposure::from_degrees(180.0), WindExposure::Onshore);
        assert_eq!(WindExposure::from_degrees(270.0), WindExposure::Cross);
        assert_eq!(WindExposure::from_degrees(300.0), WindExposure::Offshore);
    }

    #[test]
    fn test_kite_size() {
        assert_eq!(recommend_kite_size(8.0), "12-14m");
        assert_eq!(recommend_kite_size(18.0), "9-10m");
        assert_eq!(recommend_kite_size(31.0), "5m o menos");
    }

    #[test]
    fn test_fallback_phrase() {
        assert_eq!(fallback_phrase(Some(20.0), Some(30.0)), "¡PELIGRO! VIENTO OFFSHORE");
        assert_eq!(fallback_phrase(Some(9.0), Some(180.0)), "Muy flojo para navegar");
        assert_eq!(fallback_phrase(Some(19.0), Some(180.0)), "¡Ideal para 10m!");
        assert_eq!(fallback_phrase(Some(40.0), None), "¡Demasiado fuerte!");
        assert_eq!(fallback_phrase(None, None), "Datos insuficientes");
    }
}
