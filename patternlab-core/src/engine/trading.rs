//! The single-symbol trading engine.
//!
//! Holds at most one open position. Signals that arrive while a position is
//! open are still computed (detectors keep their state current) but not acted
//! on. Order failures are surfaced as [`EngineEvent::OrderRejected`] and never
//! retried; the next signal gets a fresh attempt.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::components::aggregator::{AggregatedSignal, SignalAggregator};
use crate::components::factory::{build_aggregator, FactoryError};
use crate::components::signal::DetectorError;
use crate::components::trailing::{ChandelierExit, TrailingStop};
use crate::config::{ConfigError, EngineConfig};
use crate::domain::{Bar, Direction, ExitReason, PriceSeries, Ticket, TradeError, TradeRecord};
use crate::indicators::{IndicatorError, VolatilityEstimator};
use crate::sizers::{PositionSizer, SizingContext, SizingError};

use super::ports::{ExecutionError, OrderRequest, OrderSink, PerformanceTracker, StoreError};

// ─── Errors and events ───────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Factory(#[from] FactoryError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Sizing(#[from] SizingError),
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Trade(#[from] TradeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one bar (or one close) did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    StopMoved {
        ticket: Ticket,
        from: f64,
        to: f64,
    },
    /// The sink refused a stop modification; the last accepted stop stays in force.
    StopRejected {
        ticket: Ticket,
        stop: f64,
        reason: String,
    },
    OrderPlaced {
        ticket: Ticket,
        order: OrderRequest,
    },
    OrderRejected {
        order: OrderRequest,
        reason: String,
    },
    /// A signal won the cycle but sizing produced zero volume.
    SignalSkipped {
        detector: String,
        direction: Direction,
        strength: f64,
    },
}

/// Broker-side close of the open position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionClose {
    pub ticket: Ticket,
    pub close_time: NaiveDateTime,
    pub close_price: f64,
    pub reason: ExitReason,
}

// ─── Engine ──────────────────────────────────────────────────────────

pub struct TradingEngine<S: OrderSink, P: PerformanceTracker> {
    symbol: String,
    reward_risk_ratio: f64,
    series: PriceSeries,
    aggregator: SignalAggregator,
    volatility: VolatilityEstimator,
    sizer: PositionSizer,
    trailing: TrailingStop,
    open: Option<TradeRecord>,
    sink: S,
    tracker: P,
}

impl<S: OrderSink, P: PerformanceTracker> TradingEngine<S, P> {
    /// Build every component from `config`.
    pub fn new(config: &EngineConfig, sink: S, tracker: P) -> Result<Self, EngineError> {
        config.validate()?;
        let aggregator = build_aggregator(config)?;
        Self::with_aggregator(config, aggregator, sink, tracker)
    }

    /// Build with a caller-assembled aggregator; everything else from `config`.
    pub fn with_aggregator(
        config: &EngineConfig,
        aggregator: SignalAggregator,
        sink: S,
        tracker: P,
    ) -> Result<Self, EngineError> {
        let symbol = config.engine.symbol.clone();
        Ok(Self {
            series: PriceSeries::with_capacity(symbol.clone(), config.engine.series_capacity),
            symbol,
            reward_risk_ratio: config.engine.reward_risk_ratio,
            aggregator,
            volatility: VolatilityEstimator::new(config.volatility.atr_period)?,
            sizer: PositionSizer::new(config.sizing.clone())?,
            trailing: TrailingStop::new(ChandelierExit::new(config.chandelier.clone())?),
            open: None,
            sink,
            tracker,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn sizer(&self) -> &PositionSizer {
        &self.sizer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn tracker(&self) -> &P {
        &self.tracker
    }

    pub fn open_position(&self) -> Option<&TradeRecord> {
        self.open.as_ref()
    }

    /// The last stop the sink accepted for the open position.
    pub fn current_stop(&self) -> Option<f64> {
        self.trailing.current_stop()
    }

    pub fn into_parts(self) -> (S, P) {
        (self.sink, self.tracker)
    }

    /// Process one closed bar.
    pub fn on_bar(&mut self, bar: Bar, account_balance: f64) -> Result<Vec<EngineEvent>, EngineError> {
        let mut events = Vec::new();
        if !bar.is_sane() {
            warn!(timestamp = %bar.timestamp, "malformed bar ignored");
            return Ok(events);
        }
        self.series.push(bar);

        if let Some(step) = self.trailing.propose(&self.series)? {
            match self.sink.modify_stop(step.ticket, step.to) {
                Ok(()) => {
                    self.trailing.commit(step);
                    events.push(EngineEvent::StopMoved {
                        ticket: step.ticket,
                        from: step.from,
                        to: step.to,
                    });
                }
                Err(e) => {
                    warn!(ticket = %step.ticket, stop = step.to, error = %e, "stop modification rejected");
                    events.push(EngineEvent::StopRejected {
                        ticket: step.ticket,
                        stop: step.to,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let Some(winner) = self.aggregator.cycle(&self.series) else {
            return Ok(events);
        };
        if self.open.is_some() {
            debug!(detector = %winner.signal.detector, "position open, signal ignored");
            return Ok(events);
        }
        events.push(self.enter(&winner, bar.timestamp, account_balance));
        Ok(events)
    }

    fn enter(&mut self, winner: &AggregatedSignal, timestamp: NaiveDateTime, balance: f64) -> EngineEvent {
        let ctx = SizingContext {
            account_balance: balance,
            current_atr: self.volatility.atr_or_zero(&self.series),
        };
        let risk_per_unit = winner.risk_per_unit();
        let volume = self.sizer.size(risk_per_unit, &ctx);
        if volume <= 0.0 {
            debug!(detector = %winner.signal.detector, "sized to zero, no trade");
            return EngineEvent::SignalSkipped {
                detector: winner.signal.detector.clone(),
                direction: winner.direction(),
                strength: winner.signal.strength,
            };
        }

        let order = OrderRequest {
            symbol: self.symbol.clone(),
            direction: winner.direction(),
            volume,
            price: winner.entry,
            stop_loss: winner.stop_loss,
            take_profit: winner.take_profit(self.reward_risk_ratio),
            strategy_id: winner.signal.detector.clone(),
            confidence: winner.signal.strength,
        };
        let submitted = order.validate().and_then(|()| self.sink.submit(&order));
        let ticket = match submitted {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(detector = %order.strategy_id, error = %e, "order rejected");
                return EngineEvent::OrderRejected {
                    reason: e.to_string(),
                    order,
                };
            }
        };

        let contract_size = self.sizer.lot_constraints().contract_size;
        let record = TradeRecord::open(
            ticket,
            order.strategy_id.clone(),
            order.confidence,
            timestamp,
            order.direction,
            order.volume,
            order.price,
            order.stop_loss,
            order.take_profit,
            risk_per_unit * order.volume * contract_size,
        );
        self.trailing.open(ticket, order.direction, order.stop_loss);
        self.open = Some(record);
        info!(
            %ticket,
            detector = %order.strategy_id,
            direction = ?order.direction,
            volume = order.volume,
            entry = order.price,
            stop = order.stop_loss,
            target = order.take_profit,
            "order placed"
        );
        EngineEvent::OrderPlaced { ticket, order }
    }

    /// Close the open position, record it, and refresh sizing statistics.
    pub fn on_position_closed(&mut self, close: PositionClose) -> Result<TradeRecord, EngineError> {
        let mut record = match self.open.take() {
            Some(r) if r.ticket == close.ticket => r,
            other => {
                self.open = other;
                return Err(TradeError::UnknownTicket(close.ticket).into());
            }
        };
        let contract_size = self.sizer.lot_constraints().contract_size;
        let profit = (close.close_price - record.open_price)
            * record.direction.sign()
            * record.volume
            * contract_size;
        record.close(close.close_time, close.close_price, profit, close.reason)?;
        self.trailing.close();
        info!(
            ticket = %record.ticket,
            profit,
            r = record.r_multiple,
            reason = ?close.reason,
            "position closed"
        );

        self.tracker.record(record.clone())?;
        self.sizer.refresh(&self.tracker.snapshot(), None);
        Ok(record)
    }

    /// Re-derive risk statistics, optionally with a simulated drawdown estimate.
    pub fn refresh_risk(&mut self, expected_max_drawdown: Option<f64>) {
        self.sizer.refresh(&self.tracker.snapshot(), expected_max_drawdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::signal::{DetectorError, PatternDetector, Signal};
    use crate::domain::{make_bar, PerformanceSnapshot};

    #[derive(Default)]
    struct RecordingSink {
        next: u64,
        submitted: Vec<OrderRequest>,
        stops: Vec<(Ticket, f64)>,
        reject: bool,
        reject_stops: bool,
    }

    impl OrderSink for RecordingSink {
        fn submit(&mut self, order: &OrderRequest) -> Result<Ticket, ExecutionError> {
            if self.reject {
                return Err(ExecutionError::Rejected("market closed".into()));
            }
            self.next += 1;
            self.submitted.push(order.clone());
            Ok(Ticket(self.next))
        }

        fn modify_stop(&mut self, ticket: Ticket, stop_loss: f64) -> Result<(), ExecutionError> {
            if self.reject_stops {
                return Err(ExecutionError::Rejected("stops frozen".into()));
            }
            self.stops.push((ticket, stop_loss));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Trades(Vec<TradeRecord>);

    impl PerformanceTracker for Trades {
        fn record(&mut self, trade: TradeRecord) -> Result<(), StoreError> {
            self.0.push(trade);
            Ok(())
        }

        fn snapshot(&self) -> PerformanceSnapshot {
            PerformanceSnapshot {
                trade_count: self.0.len(),
                ..PerformanceSnapshot::default()
            }
        }
    }

    /// Long signal on every bar, stop 0.0050 below the close.
    struct AlwaysLong;

    impl PatternDetector for AlwaysLong {
        fn id(&self) -> &str {
            "always_long"
        }

        fn warmup_bars(&self) -> usize {
            1
        }

        fn update(&mut self, _series: &PriceSeries) -> Result<(), DetectorError> {
            Ok(())
        }

        fn check_for_signal(&self, series: &PriceSeries) -> Result<Option<Signal>, DetectorError> {
            Ok(series
                .latest()
                .map(|b| Signal::new("always_long", Direction::Long, 80.0, b.close)))
        }

        fn calculate_stop_loss(
            &self,
            _direction: Direction,
            series: &PriceSeries,
        ) -> Result<Option<f64>, DetectorError> {
            Ok(series.latest().map(|b| b.close - 0.0050))
        }
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.sizing.lots.contract_size = 100_000.0;
        config
    }

    fn engine(sink: RecordingSink) -> TradingEngine<RecordingSink, Trades> {
        let mut aggregator = SignalAggregator::new();
        aggregator.register(Box::new(AlwaysLong));
        TradingEngine::with_aggregator(&config(), aggregator, sink, Trades::default()).unwrap()
    }

    fn bar() -> Bar {
        make_bar(1.2000, 1.2010, 1.1990, 1.2000, 100.0)
    }

    #[test]
    fn signal_sized_and_submitted() {
        let mut engine = engine(RecordingSink::default());
        let events = engine.on_bar(bar(), 10_000.0).unwrap();
        assert_eq!(events.len(), 1);
        let EngineEvent::OrderPlaced { ticket, order } = &events[0] else {
            panic!("expected an order, got {events:?}");
        };
        assert_eq!(*ticket, Ticket(1));
        assert_eq!(order.volume, 0.2);
        assert!((order.take_profit - 1.2100).abs() < 1e-9);
        let open = engine.open_position().unwrap();
        assert!((open.initial_risk - 100.0).abs() < 1e-6);
        assert!((engine.current_stop().unwrap() - 1.1950).abs() < 1e-12);
    }

    #[test]
    fn open_position_blocks_new_entries() {
        let mut engine = engine(RecordingSink::default());
        engine.on_bar(bar(), 10_000.0).unwrap();
        let events = engine.on_bar(bar(), 10_000.0).unwrap();
        assert!(events
            .iter()
            .all(|e| !matches!(e, EngineEvent::OrderPlaced { .. })));
        assert_eq!(engine.sink().submitted.len(), 1);
    }

    #[test]
    fn rejection_surfaces_without_retry() {
        let mut engine = engine(RecordingSink {
            reject: true,
            ..RecordingSink::default()
        });
        let events = engine.on_bar(bar(), 10_000.0).unwrap();
        assert!(matches!(&events[0], EngineEvent::OrderRejected { reason, .. } if reason.contains("market closed")));
        assert!(engine.open_position().is_none());
        assert!(engine.sink().submitted.is_empty());
    }

    #[test]
    fn zero_balance_skips_signal() {
        let mut engine = engine(RecordingSink::default());
        let events = engine.on_bar(bar(), 0.0).unwrap();
        assert!(matches!(&events[0], EngineEvent::SignalSkipped { detector, .. } if detector == "always_long"));
    }

    #[test]
    fn close_records_trade_and_frees_slot() {
        let mut engine = engine(RecordingSink::default());
        engine.on_bar(bar(), 10_000.0).unwrap();
        let close = PositionClose {
            ticket: Ticket(1),
            close_time: bar().timestamp + chrono::Duration::hours(3),
            close_price: 1.2100,
            reason: ExitReason::TakeProfit,
        };
        let record = engine.on_position_closed(close).unwrap();
        assert!((record.profit - 200.0).abs() < 1e-6);
        assert!((record.r_multiple - 2.0).abs() < 1e-9);
        assert_eq!(engine.tracker().0.len(), 1);
        assert!(engine.open_position().is_none());
        assert!(engine.current_stop().is_none());

        let events = engine.on_bar(bar(), 10_000.0).unwrap();
        assert!(matches!(&events[0], EngineEvent::OrderPlaced { ticket, .. } if *ticket == Ticket(2)));
    }

    #[test]
    fn drawdown_estimate_survives_later_closes() {
        let mut engine = engine(RecordingSink::default());
        engine.refresh_risk(Some(30.0));
        assert_eq!(engine.sizer().params().max_drawdown_percent, 30.0);

        engine.on_bar(bar(), 10_000.0).unwrap();
        let close = PositionClose {
            ticket: Ticket(1),
            close_time: bar().timestamp,
            close_price: 1.1950,
            reason: ExitReason::StopLoss,
        };
        engine.on_position_closed(close).unwrap();
        assert_eq!(engine.sizer().params().max_drawdown_percent, 30.0);
    }

    #[test]
    fn closing_unknown_ticket_keeps_position() {
        let mut engine = engine(RecordingSink::default());
        engine.on_bar(bar(), 10_000.0).unwrap();
        let close = PositionClose {
            ticket: Ticket(9),
            close_time: bar().timestamp,
            close_price: 1.0,
            reason: ExitReason::Manual,
        };
        assert!(matches!(
            engine.on_position_closed(close),
            Err(EngineError::Trade(TradeError::UnknownTicket(Ticket(9))))
        ));
        assert!(engine.open_position().is_some());
    }

    #[test]
    fn malformed_bar_ignored() {
        let mut engine = engine(RecordingSink::default());
        let broken = make_bar(1.0, 0.5, 2.0, 1.0, 1.0);
        assert!(engine.on_bar(broken, 10_000.0).unwrap().is_empty());
        assert!(engine.series().is_empty());
    }

    #[test]
    fn refused_stop_move_keeps_accepted_stop() {
        let mut config = config();
        config.chandelier.atr_period = 1;
        config.chandelier.lookback = 1;
        config.chandelier.multiplier = 1.0;
        let mut aggregator = SignalAggregator::new();
        aggregator.register(Box::new(AlwaysLong));
        let sink = RecordingSink {
            reject_stops: true,
            ..RecordingSink::default()
        };
        let mut engine =
            TradingEngine::with_aggregator(&config, aggregator, sink, Trades::default()).unwrap();
        let entry = bar();
        let hour = chrono::Duration::hours(1);
        engine.on_bar(entry, 10_000.0).unwrap();
        assert_eq!(engine.current_stop(), Some(1.1950));

        // Gap up: true range 0.0300, chandelier 1.2300 - 0.0300.
        let gap = Bar::new(entry.timestamp + hour, 1.2295, 1.2300, 1.2290, 1.2295, 100.0);
        let events = engine.on_bar(gap, 10_000.0).unwrap();
        match events.as_slice() {
            [EngineEvent::StopRejected { ticket, stop, reason }] => {
                assert_eq!(*ticket, Ticket(1));
                assert!((stop - 1.2000).abs() < 1e-9);
                assert!(reason.contains("stops frozen"));
            }
            other => panic!("expected a refused stop move, got {other:?}"),
        }
        assert_eq!(engine.current_stop(), Some(1.1950));

        // Once the sink accepts, the move starts from the stop it still holds.
        engine.sink_mut().reject_stops = false;
        let quiet = Bar::new(entry.timestamp + hour * 2, 1.2295, 1.2300, 1.2290, 1.2295, 100.0);
        let events = engine.on_bar(quiet, 10_000.0).unwrap();
        match events.as_slice() {
            [EngineEvent::StopMoved { from, to, .. }] => {
                assert_eq!(*from, 1.1950);
                assert!((to - 1.2290).abs() < 1e-9);
            }
            other => panic!("expected a stop move, got {other:?}"),
        }
        assert_eq!(engine.sink().stops.len(), 1);
        assert!((engine.current_stop().unwrap() - 1.2290).abs() < 1e-9);
    }

    #[test]
    fn invalid_chandelier_surfaces_as_detector_error() {
        let mut config = config();
        config.chandelier.multiplier = 0.0;
        let result = TradingEngine::with_aggregator(
            &config,
            SignalAggregator::new(),
            RecordingSink::default(),
            Trades::default(),
        );
        assert!(matches!(result, Err(EngineError::Detector(_))));
    }

    #[test]
    fn configured_engine_builds() {
        let engine = TradingEngine::new(&config(), RecordingSink::default(), Trades::default()).unwrap();
        assert_eq!(engine.symbol(), "EURUSD");
    }
}
