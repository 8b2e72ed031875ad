//! Rolling statistics over bar-to-bar changes
//!
//! Three independent FIFO windows feed the rest of the engine:
//! - CVD deltas (`cvd_close[t] - cvd_close[t-1]`) -> population standard deviation
//! - absolute close-to-close moves -> mean, used as a bar-range (ATR) proxy
//! - raw bar volume -> mean, used by the volume trigger gate
//!
//! Statistics are recomputed from the window contents on every read so that an
//! exported window restores to bit-identical results.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::helpers::{mean, population_std, positive};
use crate::{DivergenceError, FlowBar, Period, Result};

// ============================================================
// ROLLING WINDOW
// ============================================================

/// Fixed-capacity FIFO of samples; the oldest sample is evicted on overflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingWindow {
    capacity: Period,
    values: VecDeque<f64>,
}

impl RollingWindow {
    pub fn new(capacity: Period) -> Self {
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity.get() + 1),
        }
    }

    /// Append a sample, returning the evicted one if the window was full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        self.values.push_back(value);
        if self.values.len() > self.capacity.get() {
            self.values.pop_front()
        } else {
            None
        }
    }

    #[inline]
    pub fn capacity(&self) -> Period {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity.get()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + Clone + '_ {
        self.values.iter().copied()
    }

    pub fn mean(&self) -> Option<f64> {
        mean(self.iter())
    }

    pub fn std_dev(&self) -> Option<f64> {
        population_std(self.iter())
    }

    /// Change capacity, dropping the oldest samples if shrinking.
    pub fn resize(&mut self, capacity: Period) {
        self.capacity = capacity;
        while self.values.len() > capacity.get() {
            self.values.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Check a deserialized window against the capacity it must have.
    pub(crate) fn check(&self, name: &str, expected: Period) -> Result<()> {
        if self.capacity != expected {
            return Err(DivergenceError::InvalidState(format!(
                "{name} window capacity {} does not match configured {}",
                self.capacity.get(),
                expected.get()
            )));
        }
        if self.values.len() > self.capacity.get() {
            return Err(DivergenceError::InvalidState(format!(
                "{name} window holds {} samples, capacity {}",
                self.values.len(),
                self.capacity.get()
            )));
        }
        if self.values.iter().any(|v| !v.is_finite()) {
            return Err(DivergenceError::InvalidState(format!(
                "{name} window contains a non-finite sample"
            )));
        }
        Ok(())
    }
}

// ============================================================
// ROLLING STATISTICS
// ============================================================

/// Owner of the three statistic windows plus the previous bar's close/CVD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingStats {
    cvd_deltas: RollingWindow,
    price_moves: RollingWindow,
    volumes: RollingWindow,
    prev_close: Option<f64>,
    prev_cvd: Option<f64>,
}

impl RollingStats {
    pub fn new(cvd_std_window: Period, price_atr_window: Period, volume_avg_window: Period) -> Self {
        Self {
            cvd_deltas: RollingWindow::new(cvd_std_window),
            price_moves: RollingWindow::new(price_atr_window),
            volumes: RollingWindow::new(volume_avg_window),
            prev_close: None,
            prev_cvd: None,
        }
    }

    /// Fold one bar into the windows.
    ///
    /// The first bar after construction or `reset` only seeds the previous
    /// close/CVD; it contributes its volume but no deltas.
    pub fn observe<B: FlowBar>(&mut self, bar: &B) {
        if let (Some(prev_close), Some(prev_cvd)) = (self.prev_close, self.prev_cvd) {
            self.price_moves.push((bar.close() - prev_close).abs());
            self.cvd_deltas.push(bar.cvd_close() - prev_cvd);
        }
        self.volumes.push(bar.volume());
        self.prev_close = Some(bar.close());
        self.prev_cvd = Some(bar.cvd_close());
    }

    /// Standard deviation of CVD deltas; `None` if undefined or zero.
    pub fn cvd_std(&self) -> Option<f64> {
        positive(self.cvd_deltas.std_dev())
    }

    /// Mean absolute close-to-close move; `None` if undefined or zero.
    pub fn price_atr_proxy(&self) -> Option<f64> {
        positive(self.price_moves.mean())
    }

    /// Mean volume; `None` if undefined or zero.
    pub fn volume_avg(&self) -> Option<f64> {
        positive(self.volumes.mean())
    }

    pub fn cvd_window(&self) -> &RollingWindow {
        &self.cvd_deltas
    }

    pub fn price_window(&self) -> &RollingWindow {
        &self.price_moves
    }

    pub fn volume_window(&self) -> &RollingWindow {
        &self.volumes
    }

    pub fn resize(&mut self, cvd_std_window: Period, price_atr_window: Period, volume_avg_window: Period) {
        self.cvd_deltas.resize(cvd_std_window);
        self.price_moves.resize(price_atr_window);
        self.volumes.resize(volume_avg_window);
    }

    pub fn reset(&mut self) {
        self.cvd_deltas.clear();
        self.price_moves.clear();
        self.volumes.clear();
        self.prev_close = None;
        self.prev_cvd = None;
    }

    pub(crate) fn check(
        &self,
        cvd_std_window: Period,
        price_atr_window: Period,
        volume_avg_window: Period,
    ) -> Result<()> {
        self.cvd_deltas.check("cvd_std", cvd_std_window)?;
        self.price_moves.check("price_atr", price_atr_window)?;
        self.volumes.check("volume_avg", volume_avg_window)?;
        if self.prev_close.is_some() != self.prev_cvd.is_some() {
            return Err(DivergenceError::InvalidState(
                "previous close and previous cvd must be both set or both empty".into(),
            ));
        }
        Ok(())
    }
}
