//! Swing-pair price/CVD divergence scanner
//!
//! Patterns (swing₂ is the more recent of two consecutive same-kind swings):
//!
//! | Pattern          | Direction | Swings | Price         | CVD           |
//! |------------------|-----------|--------|---------------|---------------|
//! | Sell Exhaustion  | Buy       | lows   | low₂ < low₁   | cvd₂ > cvd₁   |
//! | Sell Absorption  | Buy       | lows   | low₂ > low₁   | cvd₂ < cvd₁   |
//! | Buy Exhaustion   | Sell      | highs  | high₂ > high₁ | cvd₂ < cvd₁   |
//! | Buy Absorption   | Sell      | highs  | high₂ < high₁ | cvd₂ > cvd₁   |
//!
//! A candidate is kept once `cvd_z >= min_cvd_z` and swing₂ is fresh enough.
//! Grading classifies strength only; it never drops a qualifying candidate.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::helpers::normalized;
use super::swing::{Swing, SwingKind};
use crate::config::{EngineConfig, GradeThresholds, ScoreWeights};
use crate::Direction;

// ============================================================
// PATTERN / GRADE
// ============================================================

/// The four divergence patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    SellExhaustion,
    SellAbsorption,
    BuyExhaustion,
    BuyAbsorption,
}

impl Pattern {
    pub const ALL: [Pattern; 4] = [
        Pattern::SellExhaustion,
        Pattern::SellAbsorption,
        Pattern::BuyExhaustion,
        Pattern::BuyAbsorption,
    ];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Pattern::SellExhaustion => "sell_exhaustion",
            Pattern::SellAbsorption => "sell_absorption",
            Pattern::BuyExhaustion => "buy_exhaustion",
            Pattern::BuyAbsorption => "buy_absorption",
        }
    }

    /// Trade direction the pattern signals.
    #[inline]
    pub fn direction(self) -> Direction {
        match self {
            Pattern::SellExhaustion | Pattern::SellAbsorption => Direction::Buy,
            Pattern::BuyExhaustion | Pattern::BuyAbsorption => Direction::Sell,
        }
    }

    /// Fixed priority for cross-side resolution. Exhaustion outranks absorption.
    #[inline]
    pub fn tier(self) -> u8 {
        match self {
            Pattern::SellExhaustion | Pattern::BuyExhaustion => 2,
            Pattern::SellAbsorption | Pattern::BuyAbsorption => 1,
        }
    }

    /// Kind of swing the pattern compares.
    #[inline]
    pub fn swing_kind(self) -> SwingKind {
        if self.direction().is_buy() {
            SwingKind::Low
        } else {
            SwingKind::High
        }
    }

    /// Classify two consecutive same-kind swings. Conditions are mutually
    /// exclusive, so at most one pattern matches a pair.
    pub fn classify(first: &Swing, second: &Swing) -> Option<Pattern> {
        if first.kind != second.kind {
            return None;
        }
        let (p1, p2, c1, c2) = (first.price, second.price, first.cvd, second.cvd);
        match second.kind {
            SwingKind::Low if p2 < p1 && c2 > c1 => Some(Pattern::SellExhaustion),
            SwingKind::Low if p2 > p1 && c2 < c1 => Some(Pattern::SellAbsorption),
            SwingKind::High if p2 > p1 && c2 < c1 => Some(Pattern::BuyExhaustion),
            SwingKind::High if p2 < p1 && c2 > c1 => Some(Pattern::BuyAbsorption),
            _ => None,
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal strength bucket; `C < B < A < APlus`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    C,
    B,
    A,
    #[serde(rename = "A+")]
    APlus,
}

impl Grade {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================
// CANDIDATE
// ============================================================

/// A scored divergence between two consecutive same-kind swings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DivergenceCandidate {
    pub pattern: Pattern,
    pub direction: Direction,
    /// `[swing₁, swing₂]`, older first
    pub swing_pair: [Swing; 2],
    /// `cvd₂ - cvd₁`
    pub cvd_gap: f64,
    /// `|price₂ - price₁|`
    pub price_dist: f64,
    pub cvd_z: f64,
    pub price_atr_mult: f64,
    pub composite_score: f64,
    pub grade: Grade,
}

impl DivergenceCandidate {
    #[inline]
    pub fn tier(&self) -> u8 {
        self.pattern.tier()
    }
}

/// Why a structurally matching pair did not become a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// swing₂ is more than `max_pair_distance_bars` behind the current bar
    Stale,
    /// CVD standard deviation or ATR proxy undefined
    Undefined,
    /// `cvd_z < min_cvd_z`
    BelowMinZ,
}

// ============================================================
// SCANNER
// ============================================================

/// Swing-pair divergence scanner
#[derive(Debug, Clone, PartialEq)]
pub struct DivergenceScanner {
    pub min_cvd_z: f64,
    pub max_pair_distance_bars: u64,
    pub max_swing_age: u64,
    pub pair_lookback: usize,
    pub weights: ScoreWeights,
    pub grades: GradeThresholds,
}

impl Default for DivergenceScanner {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl DivergenceScanner {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            min_cvd_z: config.min_cvd_z,
            max_pair_distance_bars: config.max_pair_distance_bars.get() as u64,
            max_swing_age: config.max_swing_age.get() as u64,
            pair_lookback: config.pair_lookback.get(),
            weights: config.weights,
            grades: config.grades,
        }
    }

    /// All qualifying candidates at `current_index`, buy side first, each side
    /// ordered newest pair first.
    pub fn scan(
        &self,
        current_index: u64,
        swings: &[Swing],
        cvd_std: Option<f64>,
        price_atr: Option<f64>,
    ) -> Vec<DivergenceCandidate> {
        let mut out = Vec::new();
        for kind in [SwingKind::Low, SwingKind::High] {
            self.scan_side(kind, current_index, swings, cvd_std, price_atr, &mut out);
        }
        out
    }

    fn scan_side(
        &self,
        kind: SwingKind,
        current_index: u64,
        swings: &[Swing],
        cvd_std: Option<f64>,
        price_atr: Option<f64>,
        out: &mut Vec<DivergenceCandidate>,
    ) {
        let same_kind: Vec<&Swing> = swings
            .iter()
            .filter(|s| s.kind == kind)
            .filter(|s| current_index.saturating_sub(s.bar_index) <= self.max_swing_age)
            .collect();

        for pair in same_kind.windows(2).rev().take(self.pair_lookback) {
            let (first, second) = (pair[0], pair[1]);
            let Some(pattern) = Pattern::classify(first, second) else {
                continue;
            };
            match self.evaluate(pattern, first, second, current_index, cvd_std, price_atr) {
                Ok(candidate) => out.push(candidate),
                Err(reason) => debug!(
                    pattern = pattern.as_str(),
                    first = first.bar_index,
                    second = second.bar_index,
                    current_index,
                    ?reason,
                    "divergence rejected"
                ),
            }
        }
    }

    /// Score one classified pair.
    pub fn evaluate(
        &self,
        pattern: Pattern,
        first: &Swing,
        second: &Swing,
        current_index: u64,
        cvd_std: Option<f64>,
        price_atr: Option<f64>,
    ) -> Result<DivergenceCandidate, Rejection> {
        if current_index.saturating_sub(second.bar_index) > self.max_pair_distance_bars {
            return Err(Rejection::Stale);
        }

        let cvd_gap = second.cvd - first.cvd;
        let price_dist = (second.price - first.price).abs();
        let cvd_z = normalized(cvd_gap.abs(), cvd_std).ok_or(Rejection::Undefined)?;
        let price_atr_mult = normalized(price_dist, price_atr).ok_or(Rejection::Undefined)?;

        if cvd_z < self.min_cvd_z {
            return Err(Rejection::BelowMinZ);
        }

        let composite_score = self.weights.composite(cvd_z, price_atr_mult);
        Ok(DivergenceCandidate {
            pattern,
            direction: pattern.direction(),
            swing_pair: [*first, *second],
            cvd_gap,
            price_dist,
            cvd_z,
            price_atr_mult,
            composite_score,
            grade: self.grades.grade(composite_score),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn low(bar_index: u64, price: f64, cvd: f64) -> Swing {
        Swing { kind: SwingKind::Low, bar_index, price, cvd, volume: 0.0 }
    }

    fn high(bar_index: u64, price: f64, cvd: f64) -> Swing {
        Swing { kind: SwingKind::High, bar_index, price, cvd, volume: 0.0 }
    }

    #[test]
    fn test_classify_all_patterns() {
        assert_eq!(
            Pattern::classify(&low(1, 100.0, 500.0), &low(5, 98.0, 560.0)),
            Some(Pattern::SellExhaustion)
        );
        assert_eq!(
            Pattern::classify(&low(1, 100.0, 500.0), &low(5, 101.0, 440.0)),
            Some(Pattern::SellAbsorption)
        );
        assert_eq!(
            Pattern::classify(&high(1, 100.0, 500.0), &high(5, 102.0, 440.0)),
            Some(Pattern::BuyExhaustion)
        );
        assert_eq!(
            Pattern::classify(&high(1, 100.0, 500.0), &high(5, 99.0, 560.0)),
            Some(Pattern::BuyAbsorption)
        );
    }

    #[test]
    fn test_classify_requires_strict_disagreement() {
        // price and cvd agree
        assert_eq!(Pattern::classify(&low(1, 100.0, 500.0), &low(5, 98.0, 440.0)), None);
        // equal lows are neither higher nor lower
        assert_eq!(Pattern::classify(&low(1, 100.0, 500.0), &low(5, 100.0, 440.0)), None);
        // equal cvd
        assert_eq!(Pattern::classify(&high(1, 100.0, 500.0), &high(5, 102.0, 500.0)), None);
        // mixed kinds
        assert_eq!(Pattern::classify(&low(1, 100.0, 500.0), &high(5, 98.0, 560.0)), None);
    }

    #[test]
    fn test_pattern_metadata() {
        assert_eq!(Pattern::SellExhaustion.direction(), Direction::Buy);
        assert_eq!(Pattern::BuyAbsorption.direction(), Direction::Sell);
        assert!(Pattern::SellExhaustion.tier() > Pattern::SellAbsorption.tier());
        assert_eq!(Pattern::BuyExhaustion.tier(), Pattern::SellExhaustion.tier());
        assert_eq!(Pattern::BuyAbsorption.swing_kind(), SwingKind::High);
        assert_eq!(Pattern::SellAbsorption.to_string(), "sell_absorption");

        for pattern in Pattern::ALL {
            assert_eq!(pattern.swing_kind() == SwingKind::Low, pattern.direction().is_buy());
            let exhaustion = pattern.as_str().ends_with("exhaustion");
            assert_eq!(pattern.tier(), if exhaustion { 2 } else { 1 });
        }
    }

    #[test]
    fn test_sell_exhaustion_scores() {
        let scanner = DivergenceScanner::default();
        let swings = [low(10, 100.0, 500.0), high(18, 104.0, 600.0), low(25, 98.0, 560.0)];
        let found = scanner.scan(25, &swings, Some(20.0), Some(1.0));

        assert_eq!(found.len(), 1);
        let c = &found[0];
        assert_eq!(c.pattern, Pattern::SellExhaustion);
        assert_eq!(c.direction, Direction::Buy);
        assert_eq!(c.cvd_gap, 60.0);
        assert_eq!(c.cvd_z, 3.0);
        assert_eq!(c.price_dist, 2.0);
        assert_eq!(c.price_atr_mult, 2.0);
        assert_eq!(c.composite_score, 100.0);
        assert_eq!(c.grade, Grade::APlus);
        assert_eq!(c.swing_pair[0].bar_index, 10);
        assert_eq!(c.swing_pair[1].bar_index, 25);
    }

    #[test]
    fn test_low_score_still_detected_as_c() {
        let scanner = DivergenceScanner::default();
        let swings = [low(10, 100.0, 500.0), low(20, 100.1, 489.0)];
        let found = scanner.scan(22, &swings, Some(20.0), Some(1.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pattern, Pattern::SellAbsorption);
        assert_eq!(found[0].grade, Grade::C);
    }

    #[test]
    fn test_below_min_z_rejected() {
        let scanner = DivergenceScanner::default();
        let s1 = low(10, 100.0, 500.0);
        let s2 = low(20, 98.0, 505.0);
        assert_eq!(
            scanner.evaluate(Pattern::SellExhaustion, &s1, &s2, 22, Some(20.0), Some(1.0)),
            Err(Rejection::BelowMinZ)
        );
    }

    #[test]
    fn test_stale_pair_rejected() {
        let scanner = DivergenceScanner {
            max_swing_age: 100,
            ..DivergenceScanner::default()
        };
        let swings = [low(0, 100.0, 500.0), low(5, 98.0, 560.0)];
        assert!(scanner.scan(50, &swings, Some(20.0), Some(1.0)).is_empty());
        assert_eq!(
            scanner.evaluate(Pattern::SellExhaustion, &swings[0], &swings[1], 50, Some(20.0), Some(1.0)),
            Err(Rejection::Stale)
        );
        assert_eq!(scanner.scan(45, &swings, Some(20.0), Some(1.0)).len(), 1);
    }

    #[test]
    fn test_undefined_statistics_rejected() {
        let scanner = DivergenceScanner::default();
        let swings = [high(10, 100.0, 500.0), high(20, 102.0, 400.0)];
        assert!(scanner.scan(22, &swings, None, Some(1.0)).is_empty());
        assert!(scanner.scan(22, &swings, Some(20.0), None).is_empty());
        assert!(scanner.scan(22, &swings, Some(0.0), Some(1.0)).is_empty());
        assert_eq!(scanner.scan(22, &swings, Some(20.0), Some(1.0)).len(), 1);
    }

    #[test]
    fn test_aged_out_first_swing_ignored() {
        let scanner = DivergenceScanner::default();
        let swings = [low(0, 100.0, 500.0), low(40, 98.0, 560.0)];
        // first swing is 60 bars old with max_swing_age 50
        assert!(scanner.scan(60, &swings, Some(20.0), Some(1.0)).is_empty());
    }

    #[test]
    fn test_single_swing_side_skipped() {
        let scanner = DivergenceScanner::default();
        let swings = [low(10, 100.0, 500.0), high(15, 104.0, 520.0)];
        assert!(scanner.scan(20, &swings, Some(20.0), Some(1.0)).is_empty());
    }

    #[test]
    fn test_pair_lookback_reaches_older_pairs() {
        let swings = [
            low(10, 100.0, 500.0),
            low(20, 98.0, 560.0),  // exhaustion vs 10
            low(30, 97.0, 540.0),  // no divergence vs 20
        ];
        let newest_only = DivergenceScanner::default();
        assert!(newest_only.scan(32, &swings, Some(20.0), Some(1.0)).is_empty());

        let deeper = DivergenceScanner { pair_lookback: 2, ..DivergenceScanner::default() };
        let found = deeper.scan(32, &swings, Some(20.0), Some(1.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].swing_pair[1].bar_index, 20);
    }
}
