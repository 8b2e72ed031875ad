//! # cvdiv - swing-based price / CVD divergence detection
//!
//! Streaming detector for absorption and exhaustion divergences between price
//! swings and cumulative volume delta (CVD), gated by a volume surge.
//!
//! ## Quick Start
//!
//! ```rust
//! use cvdiv::prelude::*;
//!
//! let mut engine = EngineBuilder::new()
//!     .min_volume_ratio(1.5)
//!     .build()
//!     .unwrap();
//!
//! for i in 0..30u64 {
//!     let price = 100.0 + (i as f64 * 0.7).sin() * 3.0;
//!     let cvd = i as f64 * 25.0;
//!     let bar = Bar::new(i, price, price + 0.5, price - 0.5, price, 1_000.0)
//!         .with_cvd(cvd, cvd + 10.0, cvd - 10.0, cvd);
//!
//!     let result = engine.process(&bar).unwrap();
//!     if let Some(signal) = result.primary {
//!         println!("{} {} grade {}", signal.pattern, signal.direction, signal.grade);
//!     }
//! }
//!
//! // persist and restore across restarts
//! let state = engine.export_state();
//! let mut restored = EngineBuilder::new().min_volume_ratio(1.5).build().unwrap();
//! restored.import_state(state).unwrap();
//! assert_eq!(restored.last_index(), Some(29));
//! ```

pub mod config;
pub mod detectors;
pub mod params;

pub mod prelude {
    pub use crate::{
        // Config
        config::{EngineConfig, GradeThresholds, ScoreWeights},
        // Components
        detectors::*,
        // Parameters
        params::{ParamMeta, ParamType, ParameterizedConfig},
        // Parallel
        scan_parallel,
        // Bars
        Bar,
        // Output
        DetectionResult,
        Direction,
        // Errors
        DivergenceError,
        // Engine
        DivergenceEngine,
        EngineBuilder,
        EngineState,
        FlowBar,
        FlowBarExt,
        OrderFlow,
        Period,
        Result,
        ScanError,
        ScanResult,
        OHLCV,
    };
}

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use config::{EngineConfig, GradeThresholds, ScoreWeights};
use detectors::{
    resolve_candidates, DivergenceCandidate, DivergenceScanner, PivotBar, RollingStats, Swing,
    SwingTracker, VolumeTrigger,
};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, DivergenceError>;

/// Errors raised by configuration, sequencing and state import.
///
/// Thin history and degenerate statistics are never errors; they just mean
/// nothing can be detected on that bar.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DivergenceError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Out-of-order bar: index {got} is not after last processed index {last}")]
    OutOfOrder { last: u64, got: u64 },

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: u64, reason: &'static str },

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Bar count (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(DivergenceError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    /// Unchecked constructor; configs built this way are checked by
    /// [`EngineConfig::validate`].
    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// BAR TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Bar position and intra-bar CVD trajectory
pub trait OrderFlow {
    /// Monotonic bar index within the stream
    fn index(&self) -> u64;
    fn cvd_open(&self) -> f64;
    fn cvd_high(&self) -> f64;
    fn cvd_low(&self) -> f64;
    fn cvd_close(&self) -> f64;
}

/// A completed bar the engine can consume
pub trait FlowBar: OHLCV + OrderFlow {}

impl<T: OHLCV + OrderFlow> FlowBar for T {}

/// Consistency checks for incoming bars
pub trait FlowBarExt: FlowBar {
    fn validate(&self) -> Result<()> {
        let index = self.index();
        let values = [
            self.open(),
            self.high(),
            self.low(),
            self.close(),
            self.volume(),
            self.cvd_open(),
            self.cvd_high(),
            self.cvd_low(),
            self.cvd_close(),
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DivergenceError::InvalidBar { index, reason: "NaN or infinite value" });
        }
        if self.high() < self.low() {
            return Err(DivergenceError::InvalidBar { index, reason: "high < low" });
        }
        if self.volume() < 0.0 {
            return Err(DivergenceError::InvalidBar { index, reason: "negative volume" });
        }
        Ok(())
    }
}

impl<T: FlowBar> FlowBarExt for T {}

/// Plain owned bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub index: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub cvd_open: f64,
    pub cvd_high: f64,
    pub cvd_low: f64,
    pub cvd_close: f64,
}

impl Bar {
    /// Bar with a flat zero CVD trajectory; see [`Bar::with_cvd`].
    pub fn new(index: u64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            index,
            open,
            high,
            low,
            close,
            volume,
            cvd_open: 0.0,
            cvd_high: 0.0,
            cvd_low: 0.0,
            cvd_close: 0.0,
        }
    }

    pub fn with_cvd(mut self, open: f64, high: f64, low: f64, close: f64) -> Self {
        self.cvd_open = open;
        self.cvd_high = high;
        self.cvd_low = low;
        self.cvd_close = close;
        self
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

impl OrderFlow for Bar {
    fn index(&self) -> u64 {
        self.index
    }

    fn cvd_open(&self) -> f64 {
        self.cvd_open
    }

    fn cvd_high(&self) -> f64 {
        self.cvd_high
    }

    fn cvd_low(&self) -> f64 {
        self.cvd_low
    }

    fn cvd_close(&self) -> f64 {
        self.cvd_close
    }
}

// ============================================================
// DETECTION RESULT
// ============================================================

/// Trade direction signalled by a divergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }

    #[inline]
    pub fn is_buy(self) -> bool {
        matches!(self, Direction::Buy)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-bar output of [`DivergenceEngine::process`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub bar_index: u64,
    /// Bar volume over the preceding volume average, when defined
    pub volume_ratio: Option<f64>,
    pub primary: Option<DivergenceCandidate>,
    /// Losing candidate from the opposite side, kept for audit
    pub rejected: Option<DivergenceCandidate>,
    /// Every qualifying candidate found on this bar
    pub all_candidates: Vec<DivergenceCandidate>,
}

impl DetectionResult {
    fn empty(bar_index: u64, volume_ratio: Option<f64>) -> Self {
        Self {
            bar_index,
            volume_ratio,
            primary: None,
            rejected: None,
            all_candidates: Vec::new(),
        }
    }

    /// True if nothing was detected on this bar.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.rejected.is_none() && self.all_candidates.is_empty()
    }
}

// ============================================================
// ENGINE STATE
// ============================================================

/// Everything needed to resume a stream exactly where it stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub last_index: Option<u64>,
    /// Alternating swing sequence, oldest first
    pub swings: Vec<Swing>,
    /// Bars buffered for pending pivot tests, oldest first
    pub pivot_bars: Vec<PivotBar>,
    /// Rolling windows plus the previous close/CVD
    pub stats: RollingStats,
}

// ============================================================
// ENGINE
// ============================================================

/// Streaming divergence detector for one instrument/session.
///
/// Not internally synchronized: callers serialize `process` calls per
/// instance. Independent streams use independent engines.
#[derive(Debug, Clone)]
pub struct DivergenceEngine {
    config: EngineConfig,
    stats: RollingStats,
    tracker: SwingTracker,
    trigger: VolumeTrigger,
    scanner: DivergenceScanner,
    last_index: Option<u64>,
}

impl Default for DivergenceEngine {
    fn default() -> Self {
        Self::from_valid_config(EngineConfig::default())
    }
}

impl DivergenceEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: EngineConfig) -> Self {
        Self {
            stats: RollingStats::new(
                config.cvd_std_window,
                config.price_atr_window,
                config.volume_avg_window,
            ),
            tracker: SwingTracker::new(config.pivot_left.get(), config.pivot_right.get()),
            trigger: VolumeTrigger::new(config.min_volume_ratio),
            scanner: DivergenceScanner::from_config(&config),
            last_index: None,
            config,
        }
    }

    // ===========================================
    // Per-bar entry point
    // ===========================================

    /// Fold one completed bar into the engine and report what it detected.
    ///
    /// Rejects invalid or out-of-order bars without touching any state.
    pub fn process<B: FlowBar>(&mut self, bar: &B) -> Result<DetectionResult> {
        bar.validate()?;
        let index = bar.index();
        if let Some(last) = self.last_index {
            if index <= last {
                warn!(last, got = index, "out-of-order bar rejected");
                return Err(DivergenceError::OutOfOrder { last, got: index });
            }
        }

        // The gate compares against the bars before this one.
        let volume_avg = self.stats.volume_avg();
        self.stats.observe(bar);
        self.tracker.update(PivotBar::from_bar(bar));
        self.tracker
            .prune_before(index.saturating_sub(self.config.max_swing_age.get() as u64));
        self.last_index = Some(index);

        let volume_ratio = detectors::volume_ratio(bar, volume_avg);
        trace!(index, volume = bar.volume(), ?volume_ratio, swings = self.tracker.swings().len(), "bar processed");

        if !self.trigger.fires(bar, volume_avg) {
            return Ok(DetectionResult::empty(index, volume_ratio));
        }
        debug!(index, ?volume_ratio, "volume trigger fired");

        let all_candidates = self.scanner.scan(
            index,
            self.tracker.swings(),
            self.stats.cvd_std(),
            self.stats.price_atr_proxy(),
        );
        let (primary, rejected) = resolve_candidates(&all_candidates);

        if let Some(p) = &primary {
            info!(
                index,
                pattern = p.pattern.as_str(),
                direction = p.direction.as_str(),
                grade = p.grade.as_str(),
                score = p.composite_score,
                cvd_z = p.cvd_z,
                rejected = rejected.map(|r| r.pattern.as_str()),
                "divergence detected"
            );
        }

        Ok(DetectionResult {
            bar_index: index,
            volume_ratio,
            primary,
            rejected,
            all_candidates,
        })
    }

    /// Process a batch of bars in order, stopping at the first error.
    pub fn process_all<B: FlowBar>(&mut self, bars: &[B]) -> Result<Vec<DetectionResult>> {
        bars.iter().map(|bar| self.process(bar)).collect()
    }

    // ===========================================
    // Session lifecycle
    // ===========================================

    /// Clear swings, windows and the sequencing cursor (e.g. at session open).
    pub fn reset(&mut self) {
        self.stats.reset();
        self.tracker.reset();
        self.last_index = None;
        debug!("engine reset");
    }

    pub fn export_state(&self) -> EngineState {
        EngineState {
            last_index: self.last_index,
            swings: self.tracker.swings().to_vec(),
            pivot_bars: self.tracker.recent_bars().copied().collect(),
            stats: self.stats.clone(),
        }
    }

    /// Replace the engine state with an exported one. On error the current
    /// state is kept.
    pub fn import_state(&mut self, state: EngineState) -> Result<()> {
        let restored = self.restore(state).inspect_err(|e| warn!(error = %e, "state import failed"))?;
        let (tracker, stats, last_index) = restored;
        self.tracker = tracker;
        self.stats = stats;
        self.last_index = last_index;
        Ok(())
    }

    fn restore(&self, state: EngineState) -> Result<(SwingTracker, RollingStats, Option<u64>)> {
        let c = &self.config;
        state
            .stats
            .check(c.cvd_std_window, c.price_atr_window, c.volume_avg_window)?;

        let newest = state
            .swings
            .iter()
            .map(|s| s.bar_index)
            .chain(state.pivot_bars.iter().map(|b| b.index))
            .max();
        match (newest, state.last_index) {
            (Some(newest), Some(last)) if newest > last => {
                return Err(DivergenceError::InvalidState(format!(
                    "state references bar {newest} after last index {last}"
                )));
            }
            (Some(_), None) => {
                return Err(DivergenceError::InvalidState(
                    "state has swings or pivot bars but no last index".into(),
                ));
            }
            _ => {}
        }

        let tracker = SwingTracker::restore(
            c.pivot_left.get(),
            c.pivot_right.get(),
            state.pivot_bars,
            state.swings,
        )?;
        Ok((tracker, state.stats, state.last_index))
    }

    /// Swap configuration without rescanning past bars. Windows shrink from the
    /// oldest end; the swing sequence is kept.
    pub fn reconfigure(&mut self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        self.stats.resize(
            config.cvd_std_window,
            config.price_atr_window,
            config.volume_avg_window,
        );
        self.tracker
            .reconfigure(config.pivot_left.get(), config.pivot_right.get());
        self.trigger = VolumeTrigger::new(config.min_volume_ratio);
        self.scanner = DivergenceScanner::from_config(&config);
        self.config = config;
        debug!("engine reconfigured");
        Ok(())
    }

    // ===========================================
    // Accessors
    // ===========================================

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn swings(&self) -> &[Swing] {
        self.tracker.swings()
    }

    #[inline]
    pub fn stats(&self) -> &RollingStats {
        &self.stats
    }

    #[inline]
    pub fn last_index(&self) -> Option<u64> {
        self.last_index
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`DivergenceEngine`]; everything is validated in `build`.
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a complete config
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Pivot look-back / look-ahead in bars
    pub fn pivot(mut self, left: usize, right: usize) -> Self {
        self.config.pivot_left = Period::new_const(left);
        self.config.pivot_right = Period::new_const(right);
        self
    }

    pub fn min_volume_ratio(mut self, ratio: f64) -> Self {
        self.config.min_volume_ratio = ratio;
        self
    }

    pub fn cvd_std_window(mut self, bars: usize) -> Self {
        self.config.cvd_std_window = Period::new_const(bars);
        self
    }

    pub fn price_atr_window(mut self, bars: usize) -> Self {
        self.config.price_atr_window = Period::new_const(bars);
        self
    }

    pub fn volume_avg_window(mut self, bars: usize) -> Self {
        self.config.volume_avg_window = Period::new_const(bars);
        self
    }

    pub fn min_cvd_z(mut self, z: f64) -> Self {
        self.config.min_cvd_z = z;
        self
    }

    pub fn max_pair_distance_bars(mut self, bars: usize) -> Self {
        self.config.max_pair_distance_bars = Period::new_const(bars);
        self
    }

    pub fn max_swing_age(mut self, bars: usize) -> Self {
        self.config.max_swing_age = Period::new_const(bars);
        self
    }

    pub fn pair_lookback(mut self, pairs: usize) -> Self {
        self.config.pair_lookback = Period::new_const(pairs);
        self
    }

    pub fn weights(mut self, weights: ScoreWeights) -> Self {
        self.config.weights = weights;
        self
    }

    pub fn grades(mut self, grades: GradeThresholds) -> Self {
        self.config.grades = grades;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<DivergenceEngine> {
        DivergenceEngine::new(self.config)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Detections for a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    /// Only bars with a primary detection
    pub detections: Vec<DetectionResult>,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: DivergenceError,
}

/// Replay several instruments in parallel, one fresh engine per instrument.
pub fn scan_parallel<'a, B, I>(
    config: &EngineConfig,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    B: FlowBar + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [B])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            DivergenceEngine::new(config.clone())
                .and_then(|mut engine| engine.process_all(bars))
                .map(|all| ScanResult {
                    symbol: symbol.to_string(),
                    detections: all.into_iter().filter(|r| r.primary.is_some()).collect(),
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
