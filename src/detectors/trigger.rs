//! Volume surge gate
//!
//! Divergence scanning only runs on bars whose own volume is at least
//! `min_ratio` times the rolling average. Volume at the compared swing bars is
//! not considered.

use crate::OHLCV;

/// `bar.volume / volume_avg`, if the average is defined.
#[inline]
pub fn volume_ratio<B: OHLCV>(bar: &B, volume_avg: Option<f64>) -> Option<f64> {
    let avg = volume_avg.filter(|a| a.is_finite() && *a > 0.0)?;
    Some(bar.volume() / avg)
}

/// True if `bar.volume >= min_ratio * volume_avg`. Undefined average never fires.
#[inline]
pub fn fires<B: OHLCV>(bar: &B, volume_avg: Option<f64>, min_ratio: f64) -> bool {
    match volume_avg.filter(|a| a.is_finite() && *a > 0.0) {
        Some(avg) => bar.volume() >= min_ratio * avg,
        None => false,
    }
}

/// Gate with its threshold bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeTrigger {
    pub min_ratio: f64,
}

impl Default for VolumeTrigger {
    fn default() -> Self {
        Self { min_ratio: 1.4 }
    }
}

impl VolumeTrigger {
    pub fn new(min_ratio: f64) -> Self {
        Self { min_ratio }
    }

    #[inline]
    pub fn fires<B: OHLCV>(&self, bar: &B, volume_avg: Option<f64>) -> bool {
        fires(bar, volume_avg, self.min_ratio)
    }
}
