//! Engine configuration
//!
//! All tunables live in [`EngineConfig`]. Defaults are the production
//! constants; every config is validated before an engine is built or
//! reconfigured, so nothing here can fail at runtime.

use serde::{Deserialize, Serialize};

use crate::detectors::Grade;
use crate::{DivergenceError, Period, Result};

// ============================================================
// SCORING
// ============================================================

/// Parameters of the composite score.
///
/// ```text
/// base      = min(score_cap, cvd_z / z_full_scale * score_cap)
/// mult      = min(atr_mult_cap, atr_base + atr_slope * price_atr_mult)
/// composite = min(score_cap, base * mult)
/// ```
///
/// Non-decreasing in both `cvd_z` and `price_atr_mult`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// `cvd_z` at which the base score saturates
    pub z_full_scale: f64,
    pub atr_base: f64,
    pub atr_slope: f64,
    pub atr_mult_cap: f64,
    pub score_cap: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            z_full_scale: 3.0,
            atr_base: 0.5,
            atr_slope: 0.5,
            atr_mult_cap: 2.0,
            score_cap: 100.0,
        }
    }
}

impl ScoreWeights {
    pub fn composite(&self, cvd_z: f64, price_atr_mult: f64) -> f64 {
        let base = (cvd_z / self.z_full_scale * self.score_cap).min(self.score_cap);
        let mult = (self.atr_base + self.atr_slope * price_atr_mult).min(self.atr_mult_cap);
        (base * mult).min(self.score_cap)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("z_full_scale", self.z_full_scale),
            ("atr_base", self.atr_base),
            ("atr_slope", self.atr_slope),
            ("atr_mult_cap", self.atr_mult_cap),
            ("score_cap", self.score_cap),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(DivergenceError::InvalidConfig(format!("{name} must be finite")));
        }
        if self.z_full_scale <= 0.0 || self.score_cap <= 0.0 {
            return Err(DivergenceError::InvalidConfig(
                "z_full_scale and score_cap must be > 0".into(),
            ));
        }
        if self.atr_base < 0.0 || self.atr_slope < 0.0 {
            return Err(DivergenceError::InvalidConfig(
                "atr_base and atr_slope must be >= 0".into(),
            ));
        }
        if self.atr_mult_cap < self.atr_base {
            return Err(DivergenceError::InvalidConfig(
                "atr_mult_cap must be >= atr_base".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// GRADING
// ============================================================

/// Lower bounds of each grade bucket; anything below `b` is grade C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeThresholds {
    pub a_plus: f64,
    pub a: f64,
    pub b: f64,
}

impl Default for GradeThresholds {
    fn default() -> Self {
        Self {
            a_plus: 75.0,
            a: 55.0,
            b: 35.0,
        }
    }
}

impl GradeThresholds {
    /// Bucket a composite score. Never rejects: the floor is [`Grade::C`].
    pub fn grade(&self, composite: f64) -> Grade {
        if composite >= self.a_plus {
            Grade::APlus
        } else if composite >= self.a {
            Grade::A
        } else if composite >= self.b {
            Grade::B
        } else {
            Grade::C
        }
    }

    pub fn validate(&self, score_cap: f64) -> Result<()> {
        if !(self.a_plus.is_finite() && self.a.is_finite() && self.b.is_finite()) {
            return Err(DivergenceError::InvalidConfig("grade thresholds must be finite".into()));
        }
        if !(self.a_plus > self.a && self.a > self.b && self.b >= 0.0) {
            return Err(DivergenceError::InvalidConfig(format!(
                "grade thresholds must satisfy a_plus > a > b >= 0, got {} / {} / {}",
                self.a_plus, self.a, self.b
            )));
        }
        if self.a_plus > score_cap {
            return Err(DivergenceError::InvalidConfig(format!(
                "grade A+ threshold {} is unreachable with score cap {score_cap}",
                self.a_plus
            )));
        }
        Ok(())
    }
}

// ============================================================
// ENGINE CONFIG
// ============================================================

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bars required before a pivot candidate
    pub pivot_left: Period,
    /// Bars required after a pivot candidate (confirmation delay)
    pub pivot_right: Period,
    /// Trigger bar volume must be >= this multiple of the volume average
    pub min_volume_ratio: f64,
    pub cvd_std_window: Period,
    pub price_atr_window: Period,
    pub volume_avg_window: Period,
    /// Minimum `|cvd_gap| / cvd_std` for a candidate to qualify
    pub min_cvd_z: f64,
    /// Maximum bars between the more recent swing and the current bar
    pub max_pair_distance_bars: Period,
    /// Swings older than this (relative to the current bar) are ignored
    pub max_swing_age: Period,
    /// Consecutive same-kind swing pairs examined per side, newest first
    pub pair_lookback: Period,
    pub weights: ScoreWeights,
    pub grades: GradeThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pivot_left: Period::new_const(2),
            pivot_right: Period::new_const(2),
            min_volume_ratio: 1.4,
            cvd_std_window: Period::new_const(20),
            price_atr_window: Period::new_const(20),
            volume_avg_window: Period::new_const(10),
            min_cvd_z: 0.5,
            max_pair_distance_bars: Period::new_const(40),
            max_swing_age: Period::new_const(50),
            pair_lookback: Period::new_const(1),
            weights: ScoreWeights::default(),
            grades: GradeThresholds::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let periods = [
            self.pivot_left,
            self.pivot_right,
            self.cvd_std_window,
            self.price_atr_window,
            self.volume_avg_window,
            self.max_pair_distance_bars,
            self.max_swing_age,
            self.pair_lookback,
        ];
        if periods.iter().any(|p| p.get() == 0) {
            return Err(DivergenceError::InvalidValue("Period must be > 0"));
        }
        if !self.min_volume_ratio.is_finite() || self.min_volume_ratio <= 0.0 {
            return Err(DivergenceError::OutOfRange {
                field: "min_volume_ratio",
                value: self.min_volume_ratio,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        if !self.min_cvd_z.is_finite() || self.min_cvd_z < 0.0 {
            return Err(DivergenceError::OutOfRange {
                field: "min_cvd_z",
                value: self.min_cvd_z,
                min: 0.0,
                max: f64::MAX,
            });
        }
        if self.cvd_std_window.get() < 2 {
            return Err(DivergenceError::InvalidConfig(
                "cvd_std_window must hold at least 2 samples".into(),
            ));
        }
        if self.max_pair_distance_bars < self.pivot_right {
            return Err(DivergenceError::InvalidConfig(format!(
                "max_pair_distance_bars ({}) is below the pivot confirmation delay ({})",
                self.max_pair_distance_bars.get(),
                self.pivot_right.get()
            )));
        }
        if self.max_swing_age < self.max_pair_distance_bars {
            return Err(DivergenceError::InvalidConfig(format!(
                "max_swing_age ({}) must be >= max_pair_distance_bars ({})",
                self.max_swing_age.get(),
                self.max_pair_distance_bars.get()
            )));
        }
        self.weights.validate()?;
        self.grades.validate(self.weights.score_cap)?;
        Ok(())
    }
}
