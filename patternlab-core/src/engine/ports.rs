//! Collaborator ports: the engine's only view of brokers and storage.
//!
//! All calls are synchronous and return success or failure. The engine never
//! retries; retry policy belongs to the implementation behind the port.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Direction, PerformanceSnapshot, Ticket, TradeRecord};

/// Order intent handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    /// Lots.
    pub volume: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub strategy_id: String,
    pub confidence: f64,
}

impl OrderRequest {
    /// Basic sanity: positive volume and finite prices on the right sides.
    pub fn validate(&self) -> Result<(), ExecutionError> {
        if self.volume.is_nan() || self.volume <= 0.0 {
            return Err(ExecutionError::InvalidOrder(format!(
                "volume must be > 0, got {}",
                self.volume
            )));
        }
        let ordered = match self.direction {
            Direction::Long => self.stop_loss < self.price && self.price < self.take_profit,
            Direction::Short => self.take_profit < self.price && self.price < self.stop_loss,
        };
        if !ordered {
            return Err(ExecutionError::InvalidOrder(format!(
                "{:?} order with stop {} / price {} / target {}",
                self.direction, self.stop_loss, self.price, self.take_profit
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("order rejected: {0}")]
    Rejected(String),
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error("unknown ticket {0}")]
    UnknownTicket(Ticket),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("trade store failure: {0}")]
    Backend(String),
    #[error("duplicate trade record {0}")]
    Duplicate(Ticket),
}

/// Order-execution sink.
pub trait OrderSink {
    fn submit(&mut self, order: &OrderRequest) -> Result<Ticket, ExecutionError>;

    /// Move the protective stop of an open order.
    fn modify_stop(&mut self, ticket: Ticket, stop_loss: f64) -> Result<(), ExecutionError>;
}

/// Key/value persistence for trade records, keyed by ticket.
pub trait TradeStore {
    /// Insert or overwrite the record for `record.ticket`.
    fn save(&mut self, record: &TradeRecord) -> Result<(), StoreError>;

    fn load(&self, ticket: Ticket) -> Result<Option<TradeRecord>, StoreError>;

    /// Every stored record, ordered by ticket.
    fn all(&self) -> Result<Vec<TradeRecord>, StoreError>;
}

/// Closed-trade statistics fed back into sizing.
pub trait PerformanceTracker {
    fn record(&mut self, trade: TradeRecord) -> Result<(), StoreError>;

    fn snapshot(&self) -> PerformanceSnapshot;
}
