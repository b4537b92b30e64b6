//! Ratchet invariant enforcement
//!
//! **Core Rule:** Stops may tighten, never loosen (even if ATR expands).
//!
//! A chandelier level recomputed from a widening ATR would otherwise drag the
//! stop away from price after a favourable move.

use crate::domain::Direction;

/// Ratchet state for one open position's stop.
///
/// - Long positions: stop can only rise
/// - Short positions: stop can only fall
#[derive(Debug, Clone, PartialEq)]
pub struct RatchetState {
    /// Current stop level (high-water mark for longs, low-water mark for shorts)
    current_level: Option<f64>,

    direction: Direction,
}

impl RatchetState {
    pub fn new(direction: Direction) -> Self {
        Self {
            current_level: None,
            direction,
        }
    }

    /// Create a ratchet seeded with the position's initial stop.
    pub fn with_initial_level(direction: Direction, initial_level: f64) -> Self {
        Self {
            current_level: Some(initial_level),
            direction,
        }
    }

    /// Apply ratchet to a proposed stop level and return the effective level.
    ///
    /// # Rules
    /// - Long: max(current, proposed)
    /// - Short: min(current, proposed)
    /// - No current level: the proposal becomes the level
    /// - Non-finite proposals are ignored
    ///
    /// # Example
    /// ```
    /// use patternlab_core::components::trailing::RatchetState;
    /// use patternlab_core::domain::Direction;
    ///
    /// let mut ratchet = RatchetState::with_initial_level(Direction::Long, 95.0);
    /// assert_eq!(ratchet.apply(100.0), Some(100.0));
    /// // Loosening is blocked.
    /// assert_eq!(ratchet.apply(90.0), Some(100.0));
    /// ```
    pub fn apply(&mut self, proposed: f64) -> Option<f64> {
        self.current_level = self.preview(proposed);
        self.current_level
    }

    /// The level `apply(proposed)` would produce, without committing it.
    pub fn preview(&self, proposed: f64) -> Option<f64> {
        if !proposed.is_finite() {
            return self.current_level;
        }
        Some(match self.current_level {
            None => proposed,
            Some(current) => match self.direction {
                Direction::Long => current.max(proposed),
                Direction::Short => current.min(proposed),
            },
        })
    }

    pub fn current_level(&self) -> Option<f64> {
        self.current_level
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}
