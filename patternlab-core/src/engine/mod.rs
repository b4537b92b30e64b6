//! Trading engine: bar-driven orchestration of detectors, sizing, and exits.
//!
//! Each new bar runs one cycle:
//!
//! 1. Append the bar to the rolling series
//! 2. Ratchet the trailing stop of the open position, if any
//! 3. Update every detector and pick the strongest signal
//! 4. When flat: size the signal, submit the order, start trailing
//!
//! Brokers and storage sit behind the traits in [`ports`].

pub mod ports;
pub mod trading;

pub use ports::{
    ExecutionError, OrderRequest, OrderSink, PerformanceTracker, StoreError, TradeStore,
};
pub use trading::{EngineError, EngineEvent, PositionClose, TradingEngine};
