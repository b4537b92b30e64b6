//! Trade history: the performance tracker behind position sizing.

use tracing::debug;

use patternlab_core::domain::{PerformanceSnapshot, TradeRecord};
use patternlab_core::engine::{PerformanceTracker, StoreError, TradeStore};

use crate::metrics::{self, PerformanceMetrics};

/// Closed trades in close order, persisted through a [`TradeStore`].
///
/// Drawdown is measured on the running balance that starts at
/// `initial_balance` and accumulates each trade's profit.
#[derive(Debug, Clone)]
pub struct TradeHistory<T: TradeStore> {
    store: T,
    initial_balance: f64,
    trades: Vec<TradeRecord>,
}

impl<T: TradeStore> TradeHistory<T> {
    pub fn new(store: T, initial_balance: f64) -> Self {
        Self {
            store,
            initial_balance,
            trades: Vec::new(),
        }
    }

    /// Rebuild the in-memory history from whatever the store already holds.
    pub fn from_store(store: T, initial_balance: f64) -> Result<Self, StoreError> {
        let trades = store.all()?.into_iter().filter(|t| t.is_closed()).collect();
        Ok(Self {
            store,
            initial_balance,
            trades,
        })
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn r_multiples(&self) -> Vec<f64> {
        metrics::r_multiples(&self.trades)
    }

    pub fn balance(&self) -> f64 {
        self.initial_balance + self.trades.iter().map(|t| t.profit).sum::<f64>()
    }

    /// Running balance after each close, starting from the initial balance.
    pub fn balances(&self) -> Vec<f64> {
        metrics::balances(self.initial_balance, &self.trades)
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics::from_trades(self.initial_balance, &self.trades)
    }
}

impl<T: TradeStore> PerformanceTracker for TradeHistory<T> {
    fn record(&mut self, trade: TradeRecord) -> Result<(), StoreError> {
        if self.trades.iter().any(|t| t.ticket == trade.ticket) {
            return Err(StoreError::Duplicate(trade.ticket));
        }
        self.store.save(&trade)?;
        debug!(ticket = %trade.ticket, r = trade.r_multiple, "trade recorded");
        self.trades.push(trade);
        Ok(())
    }

    fn snapshot(&self) -> PerformanceSnapshot {
        self.metrics().snapshot()
    }
}
