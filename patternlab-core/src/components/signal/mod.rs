//! Pattern detectors: scan the price series and emit directional signals.
//!
//! Every detector owns its pattern state privately and is driven through the
//! same three calls per bar: `update` (advance state with the newest closed
//! bar), `check_for_signal` and `calculate_stop_loss`. Detectors never see
//! account or position state.

pub mod fair_value_gap;
pub mod pin_bar;
pub mod smart_money;
pub mod vwap_band;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Direction, PriceSeries, SeriesError};
use crate::indicators::IndicatorError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// A directional signal for the current bar. Recomputed every bar, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    /// Confidence in [0, 100].
    pub strength: f64,
    pub detector: String,
    /// Close of the bar the signal was evaluated on.
    pub reference_price: f64,
    /// Filled in by the aggregator from the originating detector.
    pub suggested_stop_loss: Option<f64>,
    /// Pattern levels and scoring inputs (gap bounds, z-score, ...).
    pub metadata: HashMap<String, f64>,
}

impl Signal {
    pub fn new(
        detector: impl Into<String>,
        direction: Direction,
        strength: f64,
        reference_price: f64,
    ) -> Self {
        Self {
            direction,
            strength: clamp_score(strength),
            detector: detector.into(),
            reference_price,
            suggested_stop_loss: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: f64) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Clamp a score into [0, 100]; NaN collapses to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// Common interface of every pattern detector.
pub trait PatternDetector: Send + Sync {
    /// Stable identifier (e.g., "pin_bar"), used as the trade's strategy id.
    fn id(&self) -> &str;

    /// Bars needed before the detector can produce output.
    fn warmup_bars(&self) -> usize;

    /// Advance internal state with the most recent closed bar.
    ///
    /// Called exactly once per new bar, before `check_for_signal`.
    fn update(&mut self, series: &PriceSeries) -> Result<(), DetectorError>;

    /// Strongest signal this detector sees on the current bar, if any.
    fn check_for_signal(&self, series: &PriceSeries) -> Result<Option<Signal>, DetectorError>;

    /// Protective stop for a trade in `direction` based on this detector's pattern.
    fn calculate_stop_loss(
        &self,
        direction: Direction,
        series: &PriceSeries,
    ) -> Result<Option<f64>, DetectorError>;
}

/// Never signals.
#[cfg(test)]
pub(crate) struct NullDetector;

#[cfg(test)]
impl PatternDetector for NullDetector {
    fn id(&self) -> &str {
        "null"
    }

    fn warmup_bars(&self) -> usize {
        0
    }

    fn update(&mut self, _series: &PriceSeries) -> Result<(), DetectorError> {
        Ok(())
    }

    fn check_for_signal(&self, _series: &PriceSeries) -> Result<Option<Signal>, DetectorError> {
        Ok(None)
    }

    fn calculate_stop_loss(
        &self,
        _direction: Direction,
        _series: &PriceSeries,
    ) -> Result<Option<f64>, DetectorError> {
        Ok(None)
    }
}

pub use fair_value_gap::{FairValueGapDetector, FvgConfig};
pub use pin_bar::{PinBarConfig, PinBarDetector};
pub use smart_money::{SmartMoneyConfig, SmartMoneyDetector};
pub use vwap_band::{VwapBandDetector, VwapConfig};
