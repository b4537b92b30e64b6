//! Trailing exits for open positions.
//!
//! [`TrailingStop`] recomputes the chandelier level on every bar and passes it
//! through the position's [`RatchetState`], so the effective stop only ever
//! tightens, whether or not a new signal fired.

pub mod chandelier;
pub mod ratchet;

pub use chandelier::{ChandelierConfig, ChandelierExit, ChandelierLevels};
pub use ratchet::RatchetState;

use tracing::debug;

use crate::domain::{Direction, PriceSeries, Ticket};
use crate::indicators::IndicatorError;

#[derive(Debug, Clone)]
struct Trail {
    ticket: Ticket,
    ratchet: RatchetState,
}

/// Stop movement produced by one update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopMove {
    pub ticket: Ticket,
    pub from: f64,
    pub to: f64,
}

/// Chandelier trailing stop for the single open position.
#[derive(Debug, Clone)]
pub struct TrailingStop {
    exit: ChandelierExit,
    open: Option<Trail>,
}

impl TrailingStop {
    pub fn new(exit: ChandelierExit) -> Self {
        Self { exit, open: None }
    }

    pub fn exit(&self) -> &ChandelierExit {
        &self.exit
    }

    /// Start trailing a freshly opened position from its initial stop.
    pub fn open(&mut self, ticket: Ticket, direction: Direction, initial_stop: f64) {
        self.open = Some(Trail {
            ticket,
            ratchet: RatchetState::with_initial_level(direction, initial_stop),
        });
    }

    pub fn close(&mut self) {
        self.open = None;
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn current_stop(&self) -> Option<f64> {
        self.open.as_ref().and_then(|t| t.ratchet.current_level())
    }

    /// The tightened stop this bar's chandelier level would produce.
    ///
    /// Nothing is committed: the caller hands the move to the broker first and
    /// calls [`commit`](Self::commit) only once it is accepted. Warm-up (too
    /// little history for the ATR or lookback) proposes nothing.
    pub fn propose(&self, series: &PriceSeries) -> Result<Option<StopMove>, IndicatorError> {
        let trail = match self.open.as_ref() {
            Some(t) => t,
            None => return Ok(None),
        };
        let levels = match self.exit.levels(series) {
            Ok(levels) => levels,
            Err(IndicatorError::InsufficientData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let proposed = levels.for_direction(trail.ratchet.direction());
        match (trail.ratchet.current_level(), trail.ratchet.preview(proposed)) {
            (Some(from), Some(to)) if to != from => Ok(Some(StopMove {
                ticket: trail.ticket,
                from,
                to,
            })),
            _ => Ok(None),
        }
    }

    /// Apply an accepted move. Moves for another ticket are ignored.
    pub fn commit(&mut self, step: StopMove) {
        if let Some(trail) = self.open.as_mut().filter(|t| t.ticket == step.ticket) {
            let to = trail.ratchet.apply(step.to);
            debug!(ticket = %trail.ticket, from = step.from, ?to, "trailing stop tightened");
        }
    }

    /// Propose and commit in one step, for callers without a broker in between.
    pub fn update(&mut self, series: &PriceSeries) -> Result<Option<StopMove>, IndicatorError> {
        let step = self.propose(series)?;
        if let Some(step) = step {
            self.commit(step);
        }
        Ok(step)
    }
}
