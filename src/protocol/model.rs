//! Calibration models
//!
//! Both models are empirical and tuned to the 50 mL falcon tubes in the
//! holder; they are configuration, not logic. Defaults reproduce the bench
//! protocol: 10/20/30 s delays split at 100 and 600 uL, and a 1.8 mm level
//! drop per mL dispensed (5 mL is 9 mm) starting 80 mm below the tube top.

use crate::error::{AppResult, ViscometerError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Three-tier aspiration delay lookup on aspirated volume.
///
/// Upper bounds are inclusive: `volume <= low_max_ul` gets `low_s`,
/// `volume <= high_max_ul` gets `mid_s`, anything larger gets `high_s`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayTiers {
    /// Upper bound of the low tier in uL
    #[serde(default = "default_low_max")]
    pub low_max_ul: f64,
    /// Upper bound of the middle tier in uL
    #[serde(default = "default_high_max")]
    pub high_max_ul: f64,
    /// Delay for the low tier in seconds
    #[serde(default = "default_low_delay")]
    pub low_s: f64,
    /// Delay for the middle tier in seconds
    #[serde(default = "default_mid_delay")]
    pub mid_s: f64,
    /// Delay for the high tier in seconds
    #[serde(default = "default_high_delay")]
    pub high_s: f64,
}

fn default_low_max() -> f64 {
    100.0
}
fn default_high_max() -> f64 {
    600.0
}
fn default_low_delay() -> f64 {
    10.0
}
fn default_mid_delay() -> f64 {
    20.0
}
fn default_high_delay() -> f64 {
    30.0
}

impl Default for DelayTiers {
    fn default() -> Self {
        Self {
            low_max_ul: default_low_max(),
            high_max_ul: default_high_max(),
            low_s: default_low_delay(),
            mid_s: default_mid_delay(),
            high_s: default_high_delay(),
        }
    }
}

impl DelayTiers {
    /// Delay in seconds after aspirating `volume_ul`.
    pub fn delay_secs(&self, volume_ul: f64) -> f64 {
        if volume_ul <= self.low_max_ul {
            self.low_s
        } else if volume_ul <= self.high_max_ul {
            self.mid_s
        } else {
            self.high_s
        }
    }

    /// Delay after aspirating `volume_ul`.
    pub fn delay_for(&self, volume_ul: f64) -> AppResult<Duration> {
        let secs = self.delay_secs(volume_ul);
        Duration::try_from_secs_f64(secs).map_err(|_| {
            ViscometerError::Configuration(format!(
                "aspiration delay of {secs} s after {volume_ul} uL is not a valid duration"
            ))
        })
    }

    /// Bounds must be ordered and delays non-negative and representable.
    pub fn validate(&self) -> AppResult<()> {
        if !(self.low_max_ul >= 0.0 && self.low_max_ul < self.high_max_ul) {
            return Err(ViscometerError::Configuration(format!(
                "delay tiers must satisfy 0 <= low_max_ul < high_max_ul (got {} / {})",
                self.low_max_ul, self.high_max_ul
            )));
        }
        for (name, secs) in [("low_s", self.low_s), ("mid_s", self.mid_s), ("high_s", self.high_s)] {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(ViscometerError::Configuration(format!(
                    "delay tier {name} must be a non-negative number of seconds within range (got {secs})"
                )));
            }
        }
        Ok(())
    }
}

/// Linear model of the reservoir liquid level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidLevelModel {
    /// Aspiration height relative to the tube top at the start of a sample (mm)
    #[serde(default = "default_start_depth")]
    pub start_depth_mm: f64,
    /// Level drop per mL dispensed (mm)
    #[serde(default = "default_mm_per_ml")]
    pub mm_per_ml: f64,
}

fn default_start_depth() -> f64 {
    -80.0
}
fn default_mm_per_ml() -> f64 {
    1.8
}

impl Default for LiquidLevelModel {
    fn default() -> Self {
        Self {
            start_depth_mm: default_start_depth(),
            mm_per_ml: default_mm_per_ml(),
        }
    }
}

impl LiquidLevelModel {
    /// Level drop caused by dispensing `volume_ul`.
    pub fn drop_mm(&self, volume_ul: f64) -> f64 {
        volume_ul / 1000.0 * self.mm_per_ml
    }

    /// Aspiration height after `level` has been dispensed.
    pub fn depth(&self, level: LiquidLevel) -> f64 {
        self.start_depth_mm - self.drop_mm(level.dispensed_ul())
    }

    /// Start must be at or below the tube top and the slope positive.
    pub fn validate(&self) -> AppResult<()> {
        if !self.start_depth_mm.is_finite() || self.start_depth_mm > 0.0 {
            return Err(ViscometerError::Configuration(format!(
                "start_depth_mm must be at or below the well top (got {})",
                self.start_depth_mm
            )));
        }
        if !self.mm_per_ml.is_finite() || self.mm_per_ml <= 0.0 {
            return Err(ViscometerError::Configuration(format!(
                "mm_per_ml must be positive (got {})",
                self.mm_per_ml
            )));
        }
        Ok(())
    }
}

/// Cumulative volume dispensed from the current sample's reservoir.
///
/// Each viscous cycle consumes one level and returns the next; a new sample
/// starts again from `LiquidLevel::default()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LiquidLevel {
    dispensed_ul: f64,
}

impl LiquidLevel {
    /// Total volume dispensed so far.
    pub fn dispensed_ul(&self) -> f64 {
        self.dispensed_ul
    }

    /// Level after dispensing a further `volume_ul`.
    #[must_use]
    pub fn after_dispense(self, volume_ul: f64) -> Self {
        Self {
            dispensed_ul: self.dispensed_ul + volume_ul,
        }
    }
}

/// Volume moved at `flow_rate_ul_s` for `seconds`.
pub fn volume_for(flow_rate_ul_s: f64, seconds: f64) -> f64 {
    flow_rate_ul_s * seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_tiers_match_bench_protocol() {
        let tiers = DelayTiers::default();
        assert_eq!(tiers.delay_for(volume_for(50.0, 7.5)).unwrap(), Duration::from_secs(20));
        assert_eq!(tiers.delay_for(100.0).unwrap(), Duration::from_secs(10));
        assert_eq!(tiers.delay_for(100.5).unwrap(), Duration::from_secs(20));
        assert_eq!(tiers.delay_for(600.0).unwrap(), Duration::from_secs(20));
        assert_eq!(tiers.delay_for(600.1).unwrap(), Duration::from_secs(30));
        assert_eq!(tiers.delay_for(0.0).unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn delay_tiers_validation() {
        assert!(DelayTiers::default().validate().is_ok());

        let inverted = DelayTiers {
            low_max_ul: 700.0,
            ..DelayTiers::default()
        };
        assert!(inverted.validate().is_err());

        let negative = DelayTiers {
            mid_s: -1.0,
            ..DelayTiers::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn delays_beyond_duration_range_are_errors() {
        let huge = DelayTiers {
            high_s: 1e20,
            ..DelayTiers::default()
        };
        assert!(huge.validate().is_err());
        assert!(matches!(
            huge.delay_for(900.0),
            Err(ViscometerError::Configuration(_))
        ));
        assert_eq!(huge.delay_for(50.0).unwrap(), Duration::from_secs(10));

        let infinite = DelayTiers {
            low_s: f64::INFINITY,
            ..DelayTiers::default()
        };
        assert!(infinite.validate().is_err());
    }

    #[test]
    fn depth_drops_by_0_45_mm_per_250_ul() {
        let model = LiquidLevelModel::default();
        let dispensed = volume_for(50.0, 5.0);
        assert!((model.drop_mm(dispensed) - 0.45).abs() < 1e-12);

        let level = LiquidLevel::default();
        assert_eq!(model.depth(level), -80.0);

        let level = level.after_dispense(dispensed);
        assert!((model.depth(level) - -80.45).abs() < 1e-12);

        let level = level.after_dispense(dispensed);
        assert!((model.depth(level) - -80.9).abs() < 1e-12);
    }

    #[test]
    fn one_millimetre_per_5_56_ml() {
        let model = LiquidLevelModel::default();
        assert!((model.drop_mm(5555.6) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn level_model_validation() {
        assert!(LiquidLevelModel::default().validate().is_ok());
        let above_top = LiquidLevelModel {
            start_depth_mm: 5.0,
            ..LiquidLevelModel::default()
        };
        assert!(above_top.validate().is_err());
        let flat = LiquidLevelModel {
            mm_per_ml: 0.0,
            ..LiquidLevelModel::default()
        };
        assert!(flat.validate().is_err());
    }
}
