//! Integration tests for the streaming divergence engine.
//!
//! Bar sequences are built from a list of bar lows (high = low + 1, close at
//! mid) and an explicit CVD close path, so that pivots land on known indices.

use cvdiv::prelude::*;

const BASE_VOLUME: f64 = 1_000.0;

/// Build bars from lows and CVD closes. CVD high/low are close ± 5.
fn build(lows: &[f64], cvd: &[f64]) -> Vec<Bar> {
    assert_eq!(lows.len(), cvd.len());
    lows.iter()
        .zip(cvd)
        .enumerate()
        .map(|(i, (&low, &c))| {
            Bar::new(i as u64, low + 0.5, low + 1.0, low, low + 0.5, BASE_VOLUME)
                .with_cvd(c, c + 5.0, c - 5.0, c)
        })
        .collect()
}

/// Lows: descend to a swing low of 100 at bar 10, rise to a swing high at
/// bar 17 (high 107), descend to a lower swing low of 98 at bar 25, then
/// bars 26 and 27 confirm it.
fn lows_to_second_low() -> Vec<f64> {
    let mut lows = vec![108.0, 107.0, 106.0, 105.0, 104.0, 103.0, 102.0, 101.5, 101.0, 100.5, 100.0];
    lows.extend([100.5, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0]);
    lows.extend([105.0, 104.0, 103.0, 102.0, 101.0, 100.0, 99.0, 98.0]);
    lows.extend([98.5, 99.0]);
    lows
}

/// CVD closes matching [`lows_to_second_low`]: cvd_low is 500 at bar 10 and
/// 560 at bar 25.
fn cvd_to_second_low() -> Vec<f64> {
    let mut cvd: Vec<f64> = (0..=10).map(|i| 405.0 + 10.0 * i as f64).collect();
    cvd.extend((11..=17).map(|i| 505.0 + 15.0 * (i - 10) as f64));
    cvd.extend((18..=25).map(|i| 610.0 - 5.625 * (i - 17) as f64));
    cvd.extend([580.0, 575.0]);
    cvd
}

fn sell_exhaustion_bars(trigger_volume: f64) -> Vec<Bar> {
    let mut bars = build(&lows_to_second_low(), &cvd_to_second_low());
    bars.last_mut().unwrap().volume = trigger_volume;
    bars
}

/// Extends the sell exhaustion setup with a lower high at bar 31 carrying
/// higher CVD, confirmed at bar 33.
fn dual_divergence_bars() -> Vec<Bar> {
    let mut lows = lows_to_second_low();
    lows.truncate(26);
    lows.extend([99.0, 100.0, 101.0, 102.0, 103.0, 104.0, 103.0, 102.0]);

    let mut cvd = cvd_to_second_low();
    cvd.truncate(26);
    cvd.extend((26..=31).map(|i| 565.0 + 12.0 * (i - 25) as f64));
    cvd.extend([630.0, 625.0]);

    let mut bars = build(&lows, &cvd);
    bars.last_mut().unwrap().volume = 2_000.0;
    bars
}

// Initialise a test `Subscriber`, set RUST_LOG=cvdiv=debug to see swing updates
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_test_writer()
        .try_init();
}

fn run(engine: &mut DivergenceEngine, bars: &[Bar]) -> Vec<DetectionResult> {
    init_logging();
    engine.process_all(bars).unwrap()
}

// ============================================================
// SCENARIOS
// ============================================================

#[test]
fn test_sell_exhaustion_detected_on_volume_surge() {
    let bars = sell_exhaustion_bars(1_500.0);
    let mut engine = DivergenceEngine::default();
    let results = run(&mut engine, &bars);

    for r in &results[..results.len() - 1] {
        assert!(r.is_empty(), "unexpected detection at bar {}", r.bar_index);
    }

    let last = results.last().unwrap();
    assert_eq!(last.bar_index, 27);
    assert_eq!(last.volume_ratio, Some(1.5));

    let primary = last.primary.expect("sell exhaustion expected");
    assert_eq!(primary.pattern, Pattern::SellExhaustion);
    assert_eq!(primary.pattern.as_str(), "sell_exhaustion");
    assert_eq!(primary.direction, Direction::Buy);
    assert_eq!(primary.direction.as_str(), "BUY");
    assert_eq!(primary.swing_pair[0].bar_index, 10);
    assert_eq!(primary.swing_pair[1].bar_index, 25);
    assert_eq!(primary.swing_pair[0].cvd, 500.0);
    assert_eq!(primary.swing_pair[1].cvd, 560.0);
    assert_eq!(primary.cvd_gap, 60.0);
    assert_eq!(primary.price_dist, 2.0);

    let cvd_std = engine.stats().cvd_std().unwrap();
    let atr = engine.stats().price_atr_proxy().unwrap();
    assert!((primary.cvd_z - 60.0 / cvd_std).abs() < 1e-12);
    assert!((primary.price_atr_mult - 2.0 / atr).abs() < 1e-12);
    assert!(primary.cvd_z >= 0.5);

    assert!(last.rejected.is_none());
    assert_eq!(last.all_candidates.len(), 1);
}

#[test]
fn test_scenario_scores_with_given_statistics() {
    let swings = [
        Swing { kind: SwingKind::Low, bar_index: 10, price: 100.0, cvd: 500.0, volume: 0.0 },
        Swing { kind: SwingKind::High, bar_index: 17, price: 107.0, cvd: 615.0, volume: 0.0 },
        Swing { kind: SwingKind::Low, bar_index: 25, price: 98.0, cvd: 560.0, volume: 0.0 },
    ];
    let scanner = DivergenceScanner::default();
    let found = scanner.scan(25, &swings, Some(20.0), Some(1.0));
    let (primary, rejected) = resolve_candidates(&found);

    let primary = primary.unwrap();
    assert_eq!(primary.pattern, Pattern::SellExhaustion);
    assert_eq!(primary.direction, Direction::Buy);
    assert_eq!(primary.cvd_gap, 60.0);
    assert_eq!(primary.cvd_z, 3.0);
    assert_eq!(primary.price_dist, 2.0);
    assert_eq!(primary.price_atr_mult, 2.0);
    assert!(rejected.is_none());
}

#[test]
fn test_weak_volume_blocks_everything() {
    let bars = sell_exhaustion_bars(1_100.0);
    let mut engine = DivergenceEngine::default();
    let results = run(&mut engine, &bars);

    let last = results.last().unwrap();
    assert_eq!(last.volume_ratio, Some(1.1));
    assert!(last.primary.is_none());
    assert!(last.rejected.is_none());
    assert!(last.all_candidates.is_empty());
    // the swings are there; only the gate stopped it
    assert_eq!(engine.swings().len(), 3);
}

/// Strictly rising bars after the setup: no new pivots, swing at 25 ages.
fn stale_bars(trigger_index: u64) -> Vec<Bar> {
    let mut lows = lows_to_second_low();
    let mut cvd = cvd_to_second_low();
    for i in 28..=trigger_index {
        lows.push(99.0 + 0.5 * (i - 27) as f64);
        cvd.push(if i % 2 == 0 { 575.0 } else { 585.0 });
    }
    let mut bars = build(&lows, &cvd);
    bars.last_mut().unwrap().volume = 2_000.0;
    bars
}

#[test]
fn test_stale_pair_not_reported() {
    let config = EngineConfig {
        max_swing_age: Period::new(100).unwrap(),
        ..EngineConfig::default()
    };

    // swing 25 -> bar 66 is 41 bars, over the 40 bar limit
    let mut engine = DivergenceEngine::new(config.clone()).unwrap();
    let last = run(&mut engine, &stale_bars(66)).pop().unwrap();
    assert!(last.volume_ratio.unwrap() >= 1.4);
    assert!(last.primary.is_none());
    assert!(last.all_candidates.is_empty());

    // exactly 40 bars is still actionable
    let mut engine = DivergenceEngine::new(config).unwrap();
    let last = run(&mut engine, &stale_bars(65)).pop().unwrap();
    assert_eq!(last.primary.unwrap().pattern, Pattern::SellExhaustion);
}

#[test]
fn test_exhaustion_outranks_absorption_same_bar() {
    let bars = dual_divergence_bars();
    let mut engine = DivergenceEngine::default();
    let last = run(&mut engine, &bars).pop().unwrap();

    assert_eq!(last.bar_index, 33);
    assert_eq!(last.all_candidates.len(), 2);

    let primary = last.primary.unwrap();
    let rejected = last.rejected.unwrap();
    assert_eq!(primary.pattern, Pattern::SellExhaustion);
    assert_eq!(primary.direction, Direction::Buy);
    assert_eq!(rejected.pattern, Pattern::BuyAbsorption);
    assert_eq!(rejected.direction, Direction::Sell);
    assert_eq!(rejected.swing_pair[0].bar_index, 17);
    assert_eq!(rejected.swing_pair[1].bar_index, 31);
    assert_eq!(rejected.cvd_gap, 27.0);
}

#[test]
fn test_grade_never_suppresses() {
    // thresholds no real score can reach: everything is graded C but kept
    let grades = GradeThresholds { a_plus: 100.0, a: 99.9, b: 99.8 };
    let weights = ScoreWeights { atr_mult_cap: 0.5, ..ScoreWeights::default() };
    let mut engine = EngineBuilder::new().grades(grades).weights(weights).build().unwrap();

    let last = run(&mut engine, &sell_exhaustion_bars(1_500.0)).pop().unwrap();
    let primary = last.primary.unwrap();
    assert_eq!(primary.grade, Grade::C);
    assert!(primary.composite_score <= 50.0);
}

#[test]
fn test_min_z_filters() {
    let mut engine = EngineBuilder::new().min_cvd_z(50.0).build().unwrap();
    let last = run(&mut engine, &sell_exhaustion_bars(1_500.0)).pop().unwrap();
    assert!(last.is_empty());
}

// ============================================================
// STATE
// ============================================================

#[test]
fn test_state_round_trip_matches_unbroken_run() {
    let bars = dual_divergence_bars();

    let mut unbroken = DivergenceEngine::default();
    let expected = run(&mut unbroken, &bars);

    for split in 1..bars.len() {
        let mut first = DivergenceEngine::default();
        run(&mut first, &bars[..split]);

        let blob = serde_json::to_string(&first.export_state()).unwrap();
        let state: EngineState = serde_json::from_str(&blob).unwrap();

        let mut resumed = DivergenceEngine::default();
        resumed.import_state(state).unwrap();
        let tail = run(&mut resumed, &bars[split..]);

        assert_eq!(tail, expected[split..], "diverged after split at {split}");
        assert_eq!(resumed.export_state(), unbroken.export_state());
    }
}

#[test]
fn test_reset_starts_new_session() {
    let bars = dual_divergence_bars();
    let mut engine = DivergenceEngine::default();
    let first = run(&mut engine, &bars);

    engine.reset();
    let second = run(&mut engine, &bars);
    assert_eq!(first, second);
}

#[test]
fn test_out_of_order_is_rejected() {
    let bars = sell_exhaustion_bars(1_500.0);
    let mut engine = DivergenceEngine::default();
    run(&mut engine, &bars[..20]);

    let err = engine.process(&bars[10]).unwrap_err();
    assert!(matches!(err, DivergenceError::OutOfOrder { last: 19, got: 10 }));

    // stream continues normally afterwards
    let rest = run(&mut engine, &bars[20..]);
    assert_eq!(rest.last().unwrap().primary.unwrap().pattern, Pattern::SellExhaustion);
}
