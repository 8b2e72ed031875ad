//! Parameter metadata for the engine configuration
//!
//! This module describes every scalar tunable of [`EngineConfig`], enabling:
//! - Grid search over detection parameters
//! - Parameter documentation
//! - Building configs from loosely-typed key/value maps
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use cvdiv::params::ParameterizedConfig;
//! use cvdiv::prelude::*;
//!
//! for param in EngineConfig::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut params = HashMap::new();
//! params.insert("min_cvd_z", 0.75);
//! let config = EngineConfig::with_params(&params).unwrap();
//! assert_eq!(config.min_cvd_z, 0.75);
//! ```

use std::collections::HashMap;

use crate::{config::EngineConfig, DivergenceError, Period, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Real-valued threshold or multiplier
  Scalar,
  /// Bar count (positive integer)
  Period,
}

/// Metadata for a single engine parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "min_cvd_z")
  pub name: &'static str,
  /// Parameter type (Scalar or Period)
  pub param_type: ParamType,
  /// Default value
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a Scalar parameter
  pub const fn scalar(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Scalar, default, range, description }
  }

  /// Create a new ParamMeta for a Period parameter
  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut i = 0u32;
    loop {
      let v = min + step * i as f64;
      if v > max + f64::EPSILON {
        break;
      }
      values.push(v);
      i += 1;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(DivergenceError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Scalar => Ok(()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(DivergenceError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETER TABLE
// ============================================================

const ENGINE_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("pivot_left", 2.0, (1.0, 5.0, 1.0), "Bars before a pivot candidate"),
  ParamMeta::period("pivot_right", 2.0, (1.0, 5.0, 1.0), "Bars after a pivot candidate (confirmation delay)"),
  ParamMeta::scalar("min_volume_ratio", 1.4, (1.0, 3.0, 0.1), "Trigger volume / average volume"),
  ParamMeta::period("cvd_std_window", 20.0, (5.0, 60.0, 5.0), "CVD delta window for standard deviation"),
  ParamMeta::period("price_atr_window", 20.0, (5.0, 60.0, 5.0), "Close-to-close move window for the ATR proxy"),
  ParamMeta::period("volume_avg_window", 10.0, (5.0, 30.0, 5.0), "Volume window for the trigger average"),
  ParamMeta::scalar("min_cvd_z", 0.5, (0.25, 2.0, 0.25), "Minimum normalized CVD gap"),
  ParamMeta::period("max_pair_distance_bars", 40.0, (5.0, 60.0, 5.0), "Maximum bars from the recent swing to the trigger"),
  ParamMeta::period("max_swing_age", 50.0, (10.0, 120.0, 10.0), "Swings older than this are ignored"),
  ParamMeta::period("pair_lookback", 1.0, (1.0, 4.0, 1.0), "Swing pairs examined per side"),
  ParamMeta::scalar("z_full_scale", 3.0, (1.0, 5.0, 0.5), "cvd_z at which the base score saturates"),
  ParamMeta::scalar("grade_a_plus", 75.0, (50.0, 100.0, 5.0), "Minimum composite score for grade A+"),
  ParamMeta::scalar("grade_a", 55.0, (30.0, 80.0, 5.0), "Minimum composite score for grade A"),
  ParamMeta::scalar("grade_b", 35.0, (10.0, 60.0, 5.0), "Minimum composite score for grade B"),
];

// ============================================================
// PARAMETERIZED CONFIG TRAIT
// ============================================================

/// Trait for configs that support loosely-typed parameterization
pub trait ParameterizedConfig: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a config from a HashMap
  ///
  /// Missing parameters use their default values; unknown keys are rejected.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;
}

impl ParameterizedConfig for EngineConfig {
  fn param_meta() -> &'static [ParamMeta] {
    ENGINE_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    for key in params.keys() {
      if !ENGINE_PARAMS.iter().any(|m| m.name == *key) {
        return Err(DivergenceError::InvalidConfig(format!("unknown parameter '{key}'")));
      }
    }
    for meta in ENGINE_PARAMS {
      if let Some(&value) = params.get(meta.name) {
        meta.validate(value)?;
      }
    }

    let d = EngineConfig::default();
    let mut config = EngineConfig {
      pivot_left: get_period(params, "pivot_left", d.pivot_left.get())?,
      pivot_right: get_period(params, "pivot_right", d.pivot_right.get())?,
      min_volume_ratio: get_scalar(params, "min_volume_ratio", d.min_volume_ratio),
      cvd_std_window: get_period(params, "cvd_std_window", d.cvd_std_window.get())?,
      price_atr_window: get_period(params, "price_atr_window", d.price_atr_window.get())?,
      volume_avg_window: get_period(params, "volume_avg_window", d.volume_avg_window.get())?,
      min_cvd_z: get_scalar(params, "min_cvd_z", d.min_cvd_z),
      max_pair_distance_bars: get_period(params, "max_pair_distance_bars", d.max_pair_distance_bars.get())?,
      max_swing_age: get_period(params, "max_swing_age", d.max_swing_age.get())?,
      pair_lookback: get_period(params, "pair_lookback", d.pair_lookback.get())?,
      ..d
    };
    config.weights.z_full_scale = get_scalar(params, "z_full_scale", d.weights.z_full_scale);
    config.grades.a_plus = get_scalar(params, "grade_a_plus", d.grades.a_plus);
    config.grades.a = get_scalar(params, "grade_a", d.grades.a);
    config.grades.b = get_scalar(params, "grade_b", d.grades.b);

    config.validate()?;
    Ok(config)
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a scalar from params with default fallback
pub fn get_scalar(params: &HashMap<&str, f64>, key: &str, default: f64) -> f64 {
  params.get(key).copied().unwrap_or(default)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  Period::new(value as usize)
}

// ============================================================
// TESTS
// ============================================================
