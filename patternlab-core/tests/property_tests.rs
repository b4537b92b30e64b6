//! Property tests for detector, trailing-stop, and sizing invariants.
//!
//! Uses proptest to verify:
//! 1. Pattern aging: +1 per processed bar, nothing older than max age survives pruning
//! 2. Ratchet monotonicity: stops may only tighten, never loosen
//! 3. Sizer bounds: volume is 0 or inside [min, max]; refusals are exactly 0
//! 4. Gap fills are terminal: a filled gap never flaps back to active
//! 5. R-multiple round trip: stored value recomputes bit-for-bit

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;

use patternlab_core::components::signal::{FairValueGapDetector, FvgConfig, PatternDetector};
use patternlab_core::components::trailing::{
    ChandelierConfig, ChandelierExit, RatchetState, TrailingStop,
};
use patternlab_core::domain::{
    r_multiple, Bar, Direction, ExitReason, PatternBook, PatternInstance, PatternKind,
    PatternStatus, PriceSeries, Ticket, TradeRecord,
};
use patternlab_core::indicators::VolatilityEstimator;
use patternlab_core::sizers::{
    LotConstraints, PositionSizer, RiskParameters, SizingConfig, SizingContext,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn ts(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::hours(i as i64)
}

fn instance(direction: Direction) -> PatternInstance {
    PatternInstance::new(PatternKind::FairValueGap, direction, ts(0), 1.0, 2.0, 50.0)
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Long), Just(Direction::Short)]
}

/// `(low, high_extension, close_fraction)` for bars trading around 1.20.
fn arb_bar_shape() -> impl Strategy<Value = (f64, f64, f64)> {
    (1.1980..1.2140_f64, 0.0..0.0030_f64, 0.0..1.0_f64)
}

fn shaped_bar(i: usize, (low, ext, frac): (f64, f64, f64)) -> Bar {
    let high = low + ext;
    let close = low + ext * frac;
    Bar::new(ts(i), close, high, low, close, 100.0)
}

// ── 1. Pattern aging ─────────────────────────────────────────────────

proptest! {
    /// Every instance ages exactly one per advance; pruning removes
    /// everything older than `max_age`, and nothing at or past it is active.
    #[test]
    fn ages_increment_and_prune(
        births in prop::collection::vec(0usize..40, 1..20),
        bars in 1usize..60,
        max_age in 1usize..30,
    ) {
        let mut book = PatternBook::new();
        let mut born_at = Vec::new();
        for bar in 0..bars {
            for _ in births.iter().filter(|&&b| b == bar) {
                let id = book.insert(instance(Direction::Long));
                born_at.push((id, bar));
            }
            let before: Vec<(_, usize)> = book.iter().map(|i| (i.id, i.age)).collect();
            book.advance(max_age);
            for (id, age) in before {
                prop_assert_eq!(book.get(id).map(|i| i.age), Some(age + 1));
            }
            book.prune(max_age);
            for inst in book.iter() {
                prop_assert!(inst.age <= max_age);
            }
            for inst in book.active() {
                prop_assert!(inst.age < max_age);
            }
        }
        for (id, bar) in born_at {
            let expected_age = bars - bar;
            match book.get(id) {
                Some(inst) => prop_assert_eq!(inst.age, expected_age),
                None => prop_assert!(expected_age > max_age),
            }
        }
    }
}

// ── 2. Ratchet monotonicity ──────────────────────────────────────────

proptest! {
    /// Whatever levels are proposed, a long stop never falls and a short
    /// stop never rises.
    #[test]
    fn ratchet_only_tightens(
        direction in arb_direction(),
        initial in 90.0..110.0_f64,
        proposals in prop::collection::vec(80.0..120.0_f64, 1..50),
    ) {
        let mut ratchet = RatchetState::with_initial_level(direction, initial);
        let mut prev = initial;
        for p in proposals {
            let level = ratchet.apply(p).unwrap();
            match direction {
                Direction::Long => prop_assert!(level >= prev),
                Direction::Short => prop_assert!(level <= prev),
            }
            prev = level;
        }
    }

    /// The chandelier trail driven over arbitrary bars obeys the same rule.
    #[test]
    fn chandelier_trail_is_monotonic(
        direction in arb_direction(),
        shapes in prop::collection::vec(arb_bar_shape(), 10..60),
    ) {
        let exit = ChandelierExit::new(ChandelierConfig {
            atr_period: 3,
            lookback: 5,
            multiplier: 2.0,
        })
        .unwrap();
        let mut trail = TrailingStop::new(exit);
        let initial = match direction {
            Direction::Long => 1.1900,
            Direction::Short => 1.2250,
        };
        trail.open(Ticket(1), direction, initial);

        let mut series = PriceSeries::new("T");
        let mut prev = initial;
        for (i, shape) in shapes.into_iter().enumerate() {
            series.push(shaped_bar(i, shape));
            if let Some(step) = trail.update(&series).unwrap() {
                prop_assert_eq!(step.from, prev);
                prev = step.to;
            }
            let stop = trail.current_stop().unwrap();
            match direction {
                Direction::Long => prop_assert!(stop >= initial),
                Direction::Short => prop_assert!(stop <= initial),
            }
            prop_assert_eq!(stop, prev);
        }
    }
}

// ── 3. Sizer bounds ──────────────────────────────────────────────────

fn arb_risk() -> impl Strategy<Value = RiskParameters> {
    (
        0.1..5.0_f64,
        any::<bool>(),
        0.0..1.0_f64,
        0.0..4.0_f64,
        any::<bool>(),
        0.0005..0.01_f64,
        any::<bool>(),
        -1.0..2.0_f64,
        0.0..60.0_f64,
    )
        .prop_map(
            |(risk, kelly, win_rate, ratio, vol, baseline, throttle, expectancy, dd)| {
                RiskParameters {
                    risk_percent_per_trade: risk,
                    use_kelly_criterion: kelly,
                    win_rate,
                    win_loss_ratio: ratio,
                    use_volatility_adjust: vol,
                    baseline_atr: baseline,
                    use_drawdown_throttle: throttle,
                    system_expectancy: expectancy,
                    max_drawdown_percent: dd,
                    ..RiskParameters::default()
                }
            },
        )
}

proptest! {
    /// Volume is either exactly 0 or inside [min, max].
    #[test]
    fn sizer_respects_bounds(
        risk in arb_risk(),
        balance in 0.0..1_000_000.0_f64,
        risk_per_unit in -0.01..0.05_f64,
        atr in 0.0..0.02_f64,
        contract in prop_oneof![Just(1.0), Just(1_000.0), Just(100_000.0)],
    ) {
        let min = risk.min_position_size;
        let max = risk.max_position_size;
        let refuses = risk.use_drawdown_throttle && risk.system_expectancy < 0.0;
        let sizer = PositionSizer::new(SizingConfig {
            risk,
            lots: LotConstraints { lot_step: 0.01, contract_size: contract },
        })
        .unwrap();
        let ctx = SizingContext { account_balance: balance, current_atr: atr };
        let volume = sizer.size(risk_per_unit, &ctx);

        prop_assert!(volume == 0.0 || (volume >= min && volume <= max), "volume {}", volume);
        if risk_per_unit <= 0.0 || refuses {
            prop_assert_eq!(volume, 0.0);
        }
    }
}

// ── 4. Gap fills are terminal ────────────────────────────────────────

proptest! {
    /// Once a gap is filled it stays filled on every later bar.
    #[test]
    fn filled_gaps_never_reactivate(shapes in prop::collection::vec(arb_bar_shape(), 1..40)) {
        let mut detector = FairValueGapDetector::new(
            FvgConfig::default(),
            VolatilityEstimator::new(3).unwrap(),
        )
        .unwrap();
        let prefix = [
            (1.2010, 1.2040, 1.2000, 1.2030),
            (1.2030, 1.2050, 1.2020, 1.2045),
            (1.2045, 1.2120, 1.2040, 1.2115),
            (1.2115, 1.2140, 1.2100, 1.2130),
        ];

        let mut series = PriceSeries::new("T");
        let mut filled = HashSet::new();
        let bars = prefix
            .iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| Bar::new(ts(i), o, h, l, c, 100.0))
            .chain(
                shapes
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| shaped_bar(i + prefix.len(), s)),
            );
        for bar in bars {
            series.push(bar);
            detector.update(&series).unwrap();
            for inst in detector.book().iter() {
                if filled.contains(&inst.id) {
                    prop_assert_eq!(inst.status, PatternStatus::Filled);
                }
                if inst.status == PatternStatus::Filled {
                    filled.insert(inst.id);
                }
            }
        }
    }
}

// ── 5. R-multiple round trip ─────────────────────────────────────────

proptest! {
    #[test]
    fn stored_r_multiple_recomputes_exactly(
        profit in -10_000.0..10_000.0_f64,
        risk in 0.0..5_000.0_f64,
    ) {
        let mut trade = TradeRecord::open(
            Ticket(7), "pin_bar", 70.0, ts(0), Direction::Short,
            1.0, 1.2000, 1.2050, 1.1900, risk,
        );
        trade.close(ts(5), 1.1950, profit, ExitReason::Signal).unwrap();
        prop_assert_eq!(
            r_multiple(trade.profit, trade.initial_risk).to_bits(),
            trade.r_multiple.to_bits()
        );
    }
}
