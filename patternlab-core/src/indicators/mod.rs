//! Indicators computed on demand from a [`PriceSeries`](crate::domain::PriceSeries).
//!
//! Unlike precomputed series, these are evaluated fresh on every call so a
//! detector never compares against a stale volatility estimate.

pub mod atr;
pub mod sma;
pub mod stats;

pub use atr::{true_range, VolatilityEstimator};
pub use sma::sma_tail;

use thiserror::Error;

use crate::domain::SeriesError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndicatorError {
    #[error("insufficient data: need {needed} bars, have {available}")]
    InsufficientData { needed: usize, available: usize },
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
}

impl From<SeriesError> for IndicatorError {
    fn from(err: SeriesError) -> Self {
        match err {
            SeriesError::InsufficientHistory {
                requested,
                available,
            } => IndicatorError::InsufficientData {
                needed: requested,
                available,
            },
        }
    }
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
