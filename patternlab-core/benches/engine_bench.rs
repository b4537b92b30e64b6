//! Criterion benchmarks for PatternLab hot paths.
//!
//! Benchmarks:
//! 1. One engine cycle (all default detectors) on a warm series
//! 2. One aggregation cycle per detector, in isolation
//! 3. Position sizing with every adjustment enabled

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use patternlab_core::components::create_detector;
use patternlab_core::components::SignalAggregator;
use patternlab_core::config::EngineConfig;
use patternlab_core::domain::{Bar, PerformanceSnapshot, PriceSeries, Ticket, TradeRecord};
use patternlab_core::engine::{
    ExecutionError, OrderRequest, OrderSink, PerformanceTracker, StoreError, TradingEngine,
};
use patternlab_core::sizers::{PositionSizer, RiskParameters, SizingConfig, SizingContext};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..n)
        .map(|i| {
            let close = 1.2 + (i as f64 * 0.1).sin() * 0.01;
            let open = close - 0.0003;
            Bar::new(
                base + chrono::Duration::hours(i as i64),
                open,
                close + 0.0015,
                open - 0.0015,
                close,
                100.0 + (i % 7) as f64 * 10.0,
            )
        })
        .collect()
}

/// Accepts everything, remembers nothing.
struct NullSink(u64);

impl OrderSink for NullSink {
    fn submit(&mut self, _order: &OrderRequest) -> Result<Ticket, ExecutionError> {
        self.0 += 1;
        Ok(Ticket(self.0))
    }

    fn modify_stop(&mut self, _ticket: Ticket, _stop_loss: f64) -> Result<(), ExecutionError> {
        Ok(())
    }
}

struct NullTracker;

impl PerformanceTracker for NullTracker {
    fn record(&mut self, _trade: TradeRecord) -> Result<(), StoreError> {
        Ok(())
    }

    fn snapshot(&self) -> PerformanceSnapshot {
        PerformanceSnapshot::default()
    }
}

// ── 1. Engine cycle ──────────────────────────────────────────────────

fn bench_engine_cycle(c: &mut Criterion) {
    let config = EngineConfig::default();
    let bars = make_bars(600);
    let (warm, rest) = bars.split_at(500);

    c.bench_function("engine_on_bar_warm", |b| {
        b.iter_batched(
            || {
                let mut engine = TradingEngine::new(&config, NullSink(0), NullTracker).unwrap();
                for bar in warm {
                    engine.on_bar(*bar, 10_000.0).unwrap();
                }
                engine
            },
            |mut engine| {
                for bar in rest {
                    black_box(engine.on_bar(*bar, 10_000.0).unwrap());
                }
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

// ── 2. Per-detector cycle ────────────────────────────────────────────

fn bench_detectors(c: &mut Criterion) {
    let config = EngineConfig::default();
    let bars = make_bars(300);
    let mut group = c.benchmark_group("detector_cycle");

    for name in ["pin_bar", "fair_value_gap", "vwap_band", "smart_money"] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &name, |b, &name| {
            b.iter(|| {
                let mut aggregator = SignalAggregator::new();
                aggregator.register(create_detector(name, &config).unwrap());
                let mut series = PriceSeries::with_capacity("EURUSD", 500);
                for bar in &bars {
                    series.push(*bar);
                    black_box(aggregator.cycle(&series));
                }
            });
        });
    }
    group.finish();
}

// ── 3. Sizing ────────────────────────────────────────────────────────

fn bench_sizing(c: &mut Criterion) {
    let mut config = SizingConfig::default();
    config.risk = RiskParameters {
        use_kelly_criterion: true,
        win_rate: 0.55,
        win_loss_ratio: 1.8,
        use_volatility_adjust: true,
        baseline_atr: 0.0012,
        use_drawdown_throttle: true,
        system_expectancy: 0.3,
        max_drawdown_percent: 25.0,
        ..RiskParameters::default()
    };
    config.lots.contract_size = 100_000.0;
    let sizer = PositionSizer::new(config).unwrap();
    let ctx = SizingContext {
        account_balance: 25_000.0,
        current_atr: 0.0015,
    };

    c.bench_function("position_size_all_factors", |b| {
        b.iter(|| sizer.size(black_box(0.0042), black_box(&ctx)));
    });
}

criterion_group!(benches, bench_engine_cycle, bench_detectors, bench_sizing);
criterion_main!(benches);
