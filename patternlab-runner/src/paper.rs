//! Paper broker: a simulated order sink with stop and target fills.
//!
//! Orders fill immediately at their requested price. On each later bar the
//! open position is checked against its stop first and its target second, so a
//! bar that touches both counts as a loss. Exits fill exactly at the level.

use tracing::debug;

use patternlab_core::domain::{Bar, Direction, ExitReason, Ticket};
use patternlab_core::engine::{ExecutionError, OrderRequest, OrderSink, PositionClose};

#[derive(Debug, Clone, PartialEq)]
struct PaperPosition {
    ticket: Ticket,
    order: OrderRequest,
    stop: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PaperBroker {
    next_ticket: u64,
    open: Option<PaperPosition>,
    submitted: usize,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders accepted so far.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    pub fn open_ticket(&self) -> Option<Ticket> {
        self.open.as_ref().map(|p| p.ticket)
    }

    /// The stop the broker currently holds for the open position.
    pub fn open_stop(&self) -> Option<f64> {
        self.open.as_ref().map(|p| p.stop)
    }

    /// Check the open position against a new bar; returns the close if hit.
    pub fn on_bar(&mut self, bar: &Bar) -> Option<PositionClose> {
        let pos = self.open.as_ref()?;
        let (stop_hit, target_hit) = match pos.order.direction {
            Direction::Long => (bar.low <= pos.stop, bar.high >= pos.order.take_profit),
            Direction::Short => (bar.high >= pos.stop, bar.low <= pos.order.take_profit),
        };

        let (close_price, reason) = if stop_hit {
            let reason = if pos.stop == pos.order.stop_loss {
                ExitReason::StopLoss
            } else {
                ExitReason::TrailingStop
            };
            (pos.stop, reason)
        } else if target_hit {
            (pos.order.take_profit, ExitReason::TakeProfit)
        } else {
            return None;
        };

        let close = PositionClose {
            ticket: pos.ticket,
            close_time: bar.timestamp,
            close_price,
            reason,
        };
        debug!(ticket = %close.ticket, price = close_price, reason = ?reason, "paper position closed");
        self.open = None;
        Some(close)
    }

    /// Close the open position at `bar`'s close.
    pub fn close_at(&mut self, bar: &Bar) -> Option<PositionClose> {
        let pos = self.open.take()?;
        Some(PositionClose {
            ticket: pos.ticket,
            close_time: bar.timestamp,
            close_price: bar.close,
            reason: ExitReason::Manual,
        })
    }
}

impl OrderSink for PaperBroker {
    fn submit(&mut self, order: &OrderRequest) -> Result<Ticket, ExecutionError> {
        if self.open.is_some() {
            return Err(ExecutionError::Rejected("a position is already open".into()));
        }
        order.validate()?;
        self.next_ticket += 1;
        self.submitted += 1;
        let ticket = Ticket(self.next_ticket);
        self.open = Some(PaperPosition {
            ticket,
            order: order.clone(),
            stop: order.stop_loss,
        });
        Ok(ticket)
    }

    fn modify_stop(&mut self, ticket: Ticket, stop_loss: f64) -> Result<(), ExecutionError> {
        match self.open.as_mut() {
            Some(pos) if pos.ticket == ticket => {
                pos.stop = stop_loss;
                Ok(())
            }
            _ => Err(ExecutionError::UnknownTicket(ticket)),
        }
    }
}
