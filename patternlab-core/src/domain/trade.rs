//! TradeRecord: one trade from fill to close.
//!
//! Created when the order fills, mutated exactly once when the position
//! closes (close price, close time, profit, exit reason, R-multiple), and
//! never touched afterwards.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Direction, Ticket};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeError {
    #[error("trade {0} is already closed")]
    AlreadyClosed(Ticket),
    #[error("no open trade with ticket {0}")]
    UnknownTicket(Ticket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    Signal,
    Manual,
}

/// Profit expressed in units of initial risk.
///
/// Pure: the same `(profit, initial_risk)` always yields the same bits.
/// Zero or negative risk yields 0 rather than an error.
pub fn r_multiple(profit: f64, initial_risk: f64) -> f64 {
    if initial_risk > 0.0 {
        profit / initial_risk
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Identification ──
    pub ticket: Ticket,
    pub strategy_id: String,
    pub strategy_confidence: f64,

    // ── Entry ──
    pub open_time: NaiveDateTime,
    pub direction: Direction,
    pub volume: f64,
    pub open_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Money at risk at fill time (|open - stop| × volume × contract size).
    pub initial_risk: f64,

    // ── Exit ──
    pub close_time: Option<NaiveDateTime>,
    pub close_price: Option<f64>,
    pub profit: f64,
    pub r_multiple: f64,
    pub exit_reason: Option<ExitReason>,
}

impl TradeRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        ticket: Ticket,
        strategy_id: impl Into<String>,
        strategy_confidence: f64,
        open_time: NaiveDateTime,
        direction: Direction,
        volume: f64,
        open_price: f64,
        stop_loss: f64,
        take_profit: f64,
        initial_risk: f64,
    ) -> Self {
        Self {
            ticket,
            strategy_id: strategy_id.into(),
            strategy_confidence,
            open_time,
            direction,
            volume,
            open_price,
            stop_loss,
            take_profit,
            initial_risk,
            close_time: None,
            close_price: None,
            profit: 0.0,
            r_multiple: 0.0,
            exit_reason: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.close_time.is_some()
    }

    pub fn is_winner(&self) -> bool {
        self.is_closed() && self.profit > 0.0
    }

    /// The one-time close mutation.
    pub fn close(
        &mut self,
        close_time: NaiveDateTime,
        close_price: f64,
        profit: f64,
        exit_reason: ExitReason,
    ) -> Result<(), TradeError> {
        if self.is_closed() {
            return Err(TradeError::AlreadyClosed(self.ticket));
        }
        self.close_time = Some(close_time);
        self.close_price = Some(close_price);
        self.profit = profit;
        self.exit_reason = Some(exit_reason);
        self.r_multiple = r_multiple(profit, self.initial_risk);
        Ok(())
    }

    /// Wall-clock holding time, once closed.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.close_time.map(|t| t - self.open_time)
    }
}
