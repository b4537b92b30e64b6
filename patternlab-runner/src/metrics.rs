//! Trade statistics over closed trade records.
//!
//! R-multiples drive expectancy, money drives payoff and profit factor, and the
//! running balance (initial balance plus each close in order) drives drawdown.
//! Open records are skipped everywhere.

use serde::{Deserialize, Serialize};

use patternlab_core::domain::{PerformanceSnapshot, TradeRecord};
use patternlab_core::indicators::stats::{mean, safe_ratio};

/// Ceiling for the profit factor of a history without losses.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Everything a replay reports; the sizer sees the [`PerformanceSnapshot`] subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub trade_count: usize,
    pub win_rate: f64,
    /// Mean R-multiple per trade.
    pub expectancy: f64,
    pub avg_win: f64,
    /// Mean loss, as a positive amount.
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub net_profit: f64,
    /// Net profit as a fraction of the initial balance.
    pub total_return: f64,
    /// Worst peak-to-trough fall of the running balance, in percent.
    pub max_drawdown_pct: f64,
    pub max_consecutive_losses: usize,
}

impl PerformanceMetrics {
    pub fn from_trades(initial_balance: f64, trades: &[TradeRecord]) -> Self {
        let closed: Vec<&TradeRecord> = trades.iter().filter(|t| t.is_closed()).collect();
        let payoff = Payoff::of(&closed);
        let net_profit = payoff.gross_profit - payoff.gross_loss;
        Self {
            trade_count: closed.len(),
            win_rate: safe_ratio(payoff.wins as f64, closed.len() as f64, 0.0),
            expectancy: expectancy(&closed),
            avg_win: safe_ratio(payoff.gross_profit, payoff.wins as f64, 0.0),
            avg_loss: safe_ratio(payoff.gross_loss, payoff.losses as f64, 0.0),
            profit_factor: payoff.profit_factor(),
            net_profit,
            total_return: safe_ratio(net_profit, initial_balance, 0.0),
            max_drawdown_pct: max_drawdown_pct(&balances(initial_balance, trades)),
            max_consecutive_losses: max_consecutive_losses(&closed),
        }
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        PerformanceSnapshot {
            trade_count: self.trade_count,
            win_rate: self.win_rate,
            expectancy: self.expectancy,
            avg_win: self.avg_win,
            avg_loss: self.avg_loss,
            profit_factor: self.profit_factor,
            max_drawdown_pct: self.max_drawdown_pct,
        }
    }
}

/// Money totals split by outcome. Break-even trades count on neither side.
#[derive(Debug, Clone, Copy, Default)]
struct Payoff {
    wins: usize,
    losses: usize,
    gross_profit: f64,
    gross_loss: f64,
}

impl Payoff {
    fn of(trades: &[&TradeRecord]) -> Self {
        trades.iter().fold(Self::default(), |mut acc, t| {
            if t.profit > 0.0 {
                acc.wins += 1;
                acc.gross_profit += t.profit;
            } else if t.profit < 0.0 {
                acc.losses += 1;
                acc.gross_loss -= t.profit;
            }
            acc
        })
    }

    fn profit_factor(&self) -> f64 {
        if self.gross_loss > 0.0 {
            (self.gross_profit / self.gross_loss).min(PROFIT_FACTOR_CAP)
        } else if self.gross_profit > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        }
    }
}

/// R-multiples of the closed trades, in close order.
pub fn r_multiples(trades: &[TradeRecord]) -> Vec<f64> {
    trades
        .iter()
        .filter(|t| t.is_closed())
        .map(|t| t.r_multiple)
        .collect()
}

fn expectancy(closed: &[&TradeRecord]) -> f64 {
    let rs: Vec<f64> = closed.iter().map(|t| t.r_multiple).collect();
    mean(&rs)
}

/// Running balance: `initial_balance`, then once more after each close.
pub fn balances(initial_balance: f64, trades: &[TradeRecord]) -> Vec<f64> {
    std::iter::once(initial_balance)
        .chain(
            trades
                .iter()
                .filter(|t| t.is_closed())
                .scan(initial_balance, |balance, t| {
                    *balance += t.profit;
                    Some(*balance)
                }),
        )
        .collect()
}

/// Worst fall from a running peak, as a positive percent of that peak.
/// Peaks at or below zero are skipped.
pub fn max_drawdown_pct(balances: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    balances.iter().fold(0.0, |worst: f64, &balance| {
        peak = peak.max(balance);
        if peak > 0.0 {
            worst.max((peak - balance) / peak * 100.0)
        } else {
            worst
        }
    })
}

/// Longest run of closes that were not winners.
fn max_consecutive_losses(closed: &[&TradeRecord]) -> usize {
    closed
        .iter()
        .scan(0usize, |run, t| {
            *run = if t.is_winner() { 0 } else { *run + 1 };
            Some(*run)
        })
        .max()
        .unwrap_or(0)
}
