//! Aggregate statistics over closed trades, as consumed by position sizing.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub trade_count: usize,
    /// Winners / closed trades, in [0, 1].
    pub win_rate: f64,
    /// Mean R-multiple per trade.
    pub expectancy: f64,
    /// Mean profit of winning trades (money).
    pub avg_win: f64,
    /// Mean loss of losing trades, as a positive amount.
    pub avg_loss: f64,
    pub profit_factor: f64,
    /// Worst peak-to-trough decline of the running balance, in percent.
    pub max_drawdown_pct: f64,
}

impl PerformanceSnapshot {
    /// avg_win / avg_loss, or 0 when either side has no trades.
    pub fn win_loss_ratio(&self) -> f64 {
        if self.avg_loss > 0.0 && self.avg_win > 0.0 {
            self.avg_win / self.avg_loss
        } else {
            0.0
        }
    }
}
