//! Replay runner: drives the trading engine over a bar vector.
//!
//! Per bar, the paper broker first checks the open position's stop and
//! target (exits happen inside the bar), then the engine processes the closed
//! bar with the balance realised so far. Sizing is refreshed after every
//! close and, when configured, re-throttled with a Monte Carlo drawdown
//! estimate.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use patternlab_core::config::ConfigError;
use patternlab_core::domain::{Bar, TradeRecord};
use patternlab_core::engine::{EngineError, EngineEvent, TradingEngine};
use patternlab_core::fingerprint::RunFingerprint;

use crate::config::RunnerConfig;
use crate::metrics::PerformanceMetrics;
use crate::monte_carlo::{simulate_drawdown, McResult};
use crate::paper::PaperBroker;
use crate::store::MemoryTradeStore;
use crate::tracker::TradeHistory;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("no bars to replay")]
    NoBars,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Event tallies over a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventCounts {
    pub orders_placed: usize,
    pub orders_rejected: usize,
    pub signals_skipped: usize,
    pub stops_moved: usize,
    pub stops_rejected: usize,
}

impl EventCounts {
    fn tally(&mut self, events: &[EngineEvent]) {
        for event in events {
            match event {
                EngineEvent::OrderPlaced { .. } => self.orders_placed += 1,
                EngineEvent::OrderRejected { .. } => self.orders_rejected += 1,
                EngineEvent::SignalSkipped { .. } => self.signals_skipped += 1,
                EngineEvent::StopMoved { .. } => self.stops_moved += 1,
                EngineEvent::StopRejected { .. } => self.stops_rejected += 1,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    pub fingerprint: RunFingerprint,
    pub trades: Vec<TradeRecord>,
    /// Running balance after each close, starting from the initial balance.
    pub balances: Vec<f64>,
    pub final_balance: f64,
    pub metrics: PerformanceMetrics,
    pub events: EventCounts,
    /// Drawdown distribution of the finished history; `None` without trades.
    pub monte_carlo: Option<McResult>,
}

impl ReplayResult {
    /// Pretty JSON for result files.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Replay `bars` (oldest first) through a freshly built engine.
pub fn run_replay(config: &RunnerConfig, bars: &[Bar]) -> Result<ReplayResult, ReplayError> {
    config.validate()?;
    let last = bars.last().ok_or(ReplayError::NoBars)?;
    let fingerprint = RunFingerprint::new(&config.engine, bars)?;
    info!(
        symbol = %fingerprint.symbol,
        bars = bars.len(),
        config = %fingerprint.config_hash.short(12),
        "replay started"
    );

    let history = TradeHistory::new(MemoryTradeStore::new(), config.replay.initial_balance);
    let mut engine = TradingEngine::new(&config.engine, PaperBroker::new(), history)?;
    let mut events = EventCounts::default();
    let mut closed = 0usize;

    for bar in bars {
        if let Some(close) = engine.sink_mut().on_bar(bar) {
            engine.on_position_closed(close)?;
            closed += 1;
            if config.replay.refresh_every > 0 && closed % config.replay.refresh_every == 0 {
                rethrottle(&mut engine, config);
            }
        }
        let balance = engine.tracker().balance();
        let bar_events = engine.on_bar(*bar, balance)?;
        events.tally(&bar_events);
    }

    if config.replay.close_open_at_end {
        if let Some(close) = engine.sink_mut().close_at(last) {
            engine.on_position_closed(close)?;
        }
    }

    let (_, history) = engine.into_parts();
    let trades = history.trades().to_vec();
    let balances = history.balances();
    let monte_carlo = if trades.is_empty() {
        None
    } else {
        simulate_drawdown(&history.r_multiples(), &config.monte_carlo).ok()
    };
    let metrics = history.metrics();
    info!(
        trades = metrics.trade_count,
        win_rate = metrics.win_rate,
        expectancy = metrics.expectancy,
        total_return = metrics.total_return,
        "replay finished"
    );

    Ok(ReplayResult {
        fingerprint,
        final_balance: history.balance(),
        trades,
        balances,
        metrics,
        events,
        monte_carlo,
    })
}

fn rethrottle(
    engine: &mut TradingEngine<PaperBroker, TradeHistory<MemoryTradeStore>>,
    config: &RunnerConfig,
) {
    match simulate_drawdown(&engine.tracker().r_multiples(), &config.monte_carlo) {
        Ok(mc) => engine.refresh_risk(Some(mc.p95_max_drawdown)),
        Err(e) => warn!(error = %e, "Monte Carlo refresh skipped"),
    }
}
