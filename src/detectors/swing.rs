//! Swing tracker: confirmed pivot highs/lows as a strictly alternating sequence
//!
//! A bar is tested as a pivot once `right` further bars have arrived, so every
//! swing is confirmed with a `right`-bar delay. Ties count as confirming in both
//! directions (`<=` for lows, `>=` for highs).
//!
//! The sequence alternates HIGH/LOW. A confirmed pivot of the same kind as the
//! tail either replaces the tail (if at least as extreme) or is discarded.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DivergenceError, FlowBar, Result};

/// Kind of swing point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

impl SwingKind {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            SwingKind::High => SwingKind::Low,
            SwingKind::Low => SwingKind::High,
        }
    }
}

/// A confirmed local extremum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Swing {
    pub kind: SwingKind,
    pub bar_index: u64,
    /// `high` for a HIGH swing, `low` for a LOW swing
    pub price: f64,
    /// `cvd_high` for a HIGH swing, `cvd_low` for a LOW swing
    pub cvd: f64,
    /// Volume of the pivot bar
    pub volume: f64,
}

impl Swing {
    /// True if `self` is at least as extreme as `other` (same kind assumed).
    #[inline]
    pub fn at_least_as_extreme_as(&self, other: &Swing) -> bool {
        match self.kind {
            SwingKind::Low => self.price <= other.price,
            SwingKind::High => self.price >= other.price,
        }
    }
}

/// The subset of a bar the tracker needs to keep for pivot tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PivotBar {
    pub index: u64,
    pub high: f64,
    pub low: f64,
    pub cvd_high: f64,
    pub cvd_low: f64,
    pub volume: f64,
}

impl PivotBar {
    pub fn from_bar<B: FlowBar>(bar: &B) -> Self {
        Self {
            index: bar.index(),
            high: bar.high(),
            low: bar.low(),
            cvd_high: bar.cvd_high(),
            cvd_low: bar.cvd_low(),
            volume: bar.volume(),
        }
    }

    fn swing(&self, kind: SwingKind) -> Swing {
        let (price, cvd) = match kind {
            SwingKind::High => (self.high, self.cvd_high),
            SwingKind::Low => (self.low, self.cvd_low),
        };
        Swing {
            kind,
            bar_index: self.index,
            price,
            cvd,
            volume: self.volume,
        }
    }
}

/// What a single `update` did to the swing sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SwingUpdate {
    /// Not enough history, or the candidate bar is not a pivot.
    Unchanged,
    Appended(Swing),
    Replaced { old: Swing, new: Swing },
    /// Same kind as the tail but less extreme.
    Discarded(Swing),
}

/// Causal pivot detector holding the swing sequence for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SwingTracker {
    left: usize,
    right: usize,
    recent: VecDeque<PivotBar>,
    swings: Vec<Swing>,
}

impl SwingTracker {
    pub fn new(left: usize, right: usize) -> Self {
        Self {
            left,
            right,
            recent: VecDeque::with_capacity(left + right + 2),
            swings: Vec::new(),
        }
    }

    #[inline]
    fn span(&self) -> usize {
        self.left + self.right + 1
    }

    /// Push the newest bar and test the bar `right` positions back.
    pub fn update(&mut self, bar: PivotBar) -> SwingUpdate {
        self.recent.push_back(bar);
        if self.recent.len() > self.span() {
            self.recent.pop_front();
        }
        if self.recent.len() < self.span() {
            return SwingUpdate::Unchanged;
        }

        let candidate = self.recent[self.left];
        let others = || {
            self.recent
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != self.left)
                .map(|(_, b)| b)
        };
        let is_low = others().all(|b| candidate.low <= b.low);
        let is_high = others().all(|b| candidate.high >= b.high);

        let kind = match (is_low, is_high) {
            (false, false) => return SwingUpdate::Unchanged,
            (true, false) => SwingKind::Low,
            (false, true) => SwingKind::High,
            // Outside bar: take the kind that keeps the sequence alternating.
            (true, true) => match self.swings.last() {
                Some(tail) => tail.kind.opposite(),
                None => SwingKind::Low,
            },
        };

        self.push_swing(candidate.swing(kind))
    }

    fn push_swing(&mut self, swing: Swing) -> SwingUpdate {
        match self.swings.last_mut() {
            Some(tail) if tail.kind == swing.kind => {
                if swing.at_least_as_extreme_as(tail) {
                    let old = *tail;
                    *tail = swing;
                    debug!(kind = ?swing.kind, old_price = old.price, new_price = swing.price, bar_index = swing.bar_index, "swing replaced");
                    SwingUpdate::Replaced { old, new: swing }
                } else {
                    debug!(kind = ?swing.kind, price = swing.price, bar_index = swing.bar_index, "swing discarded");
                    SwingUpdate::Discarded(swing)
                }
            }
            _ => {
                self.swings.push(swing);
                debug!(kind = ?swing.kind, price = swing.price, cvd = swing.cvd, bar_index = swing.bar_index, "swing appended");
                SwingUpdate::Appended(swing)
            }
        }
    }

    /// Ordered swing sequence, oldest first.
    #[inline]
    pub fn swings(&self) -> &[Swing] {
        &self.swings
    }

    /// Bars currently buffered for pivot tests, oldest first.
    pub fn recent_bars(&self) -> impl Iterator<Item = &PivotBar> {
        self.recent.iter()
    }

    /// Drop swings older than `min_bar_index`, always keeping the last two so
    /// replacement and alternation behave exactly as without pruning.
    pub fn prune_before(&mut self, min_bar_index: u64) {
        let keep_from = self.swings.len().saturating_sub(2);
        let stale = self.swings[..keep_from]
            .iter()
            .take_while(|s| s.bar_index < min_bar_index)
            .count();
        if stale > 0 {
            self.swings.drain(..stale);
        }
    }

    pub fn reset(&mut self) {
        self.recent.clear();
        self.swings.clear();
    }

    /// Rebuild from exported parts, rejecting anything that breaks the
    /// tracker's invariants.
    pub(crate) fn restore(
        left: usize,
        right: usize,
        recent: Vec<PivotBar>,
        swings: Vec<Swing>,
    ) -> Result<Self> {
        if recent.len() > left + right + 1 {
            return Err(DivergenceError::InvalidState(format!(
                "{} pivot bars exceed window of {}",
                recent.len(),
                left + right + 1
            )));
        }
        let finite_bar = |b: &PivotBar| {
            [b.high, b.low, b.cvd_high, b.cvd_low, b.volume].iter().all(|v| v.is_finite())
        };
        if !recent.iter().all(finite_bar) {
            return Err(DivergenceError::InvalidState(
                "pivot bar holds a NaN or infinite value".into(),
            ));
        }
        if recent.windows(2).any(|w| w[1].index <= w[0].index) {
            return Err(DivergenceError::InvalidState(
                "pivot bars are not in increasing index order".into(),
            ));
        }
        if !swings
            .iter()
            .all(|s| s.price.is_finite() && s.cvd.is_finite() && s.volume.is_finite())
        {
            return Err(DivergenceError::InvalidState(
                "swing holds a NaN or infinite value".into(),
            ));
        }
        if swings.windows(2).any(|w| w[0].kind == w[1].kind) {
            return Err(DivergenceError::InvalidState(
                "swing sequence does not alternate".into(),
            ));
        }
        if swings.windows(2).any(|w| w[1].bar_index <= w[0].bar_index) {
            return Err(DivergenceError::InvalidState(
                "swing sequence is not in increasing bar order".into(),
            ));
        }
        Ok(Self {
            left,
            right,
            recent: recent.into(),
            swings,
        })
    }

    /// Change the pivot window. The swing sequence is kept. If the window
    /// changes, buffered bars are dropped so that no bar is pivot-tested twice;
    /// pivot tests resume once `left + right + 1` new bars have arrived.
    pub fn reconfigure(&mut self, left: usize, right: usize) {
        if (left, right) == (self.left, self.right) {
            return;
        }
        self.left = left;
        self.right = right;
        self.recent.clear();
    }
}
