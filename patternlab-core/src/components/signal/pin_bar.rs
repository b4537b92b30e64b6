//! Pin bar: a long-nosed rejection candle evaluated on the latest closed bar.
//!
//! Shape test on the bar at offset 0:
//! - bullish: lower_wick > body × nose_factor, lower_wick > upper_wick × 2,
//!   body < range × 0.4
//! - bearish: the mirror with the upper wick as the nose
//!
//! Quality (0–100) = nose points (≤50) + size-vs-ATR points (≤30) +
//! close-position points (≤20). No pattern state survives between bars.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Bar, Direction, PriceSeries};
use crate::indicators::VolatilityEstimator;

use super::{DetectorError, PatternDetector, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinBarConfig {
    /// Minimum nose/body multiple.
    pub nose_factor: f64,
    /// Signals below this quality are discarded.
    pub min_quality_score: f64,
    /// Require the pin bar's volume to exceed the previous bar's.
    pub use_volume_confirm: bool,
    /// Require a preceding move against the pattern direction.
    pub use_market_context: bool,
    /// Bars averaged for the market-context check.
    pub context_bars: usize,
}

impl Default for PinBarConfig {
    fn default() -> Self {
        Self {
            nose_factor: 2.0,
            min_quality_score: 65.0,
            use_volume_confirm: false,
            use_market_context: false,
            context_bars: 10,
        }
    }
}

impl PinBarConfig {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.nose_factor.is_nan() || self.nose_factor <= 0.0 {
            return Err(DetectorError::InvalidParameter(
                "pin_bar.nose_factor must be > 0".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.min_quality_score) {
            return Err(DetectorError::InvalidParameter(
                "pin_bar.min_quality_score must be in [0, 100]".into(),
            ));
        }
        if self.use_market_context && self.context_bars == 0 {
            return Err(DetectorError::InvalidParameter(
                "pin_bar.context_bars must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Direction of `bar` if it passes the pin bar shape test.
pub fn classify(bar: &Bar, nose_factor: f64) -> Option<Direction> {
    let body = bar.body();
    let upper = bar.upper_wick();
    let lower = bar.lower_wick();
    let range = bar.range();
    if range <= 0.0 {
        return None;
    }

    if lower > body * nose_factor && lower > upper * 2.0 && body < range * 0.4 {
        Some(Direction::Long)
    } else if upper > body * nose_factor && upper > lower * 2.0 && body < range * 0.4 {
        Some(Direction::Short)
    } else {
        None
    }
}

/// Quality score for a bar already classified as a pin bar in `direction`.
///
/// A zero body counts as the maximal nose ratio; a missing ATR contributes
/// no size points.
pub fn quality_score(bar: &Bar, direction: Direction, atr: f64) -> f64 {
    let range = bar.range();
    if range <= 0.0 {
        return 0.0;
    }
    let body = bar.body();
    let nose = match direction {
        Direction::Long => bar.lower_wick(),
        Direction::Short => bar.upper_wick(),
    };

    let nose_points = if body > 0.0 {
        ((nose / body) * 10.0).min(50.0)
    } else {
        50.0
    };
    let size_points = if atr > 0.0 {
        ((range / atr) * 15.0).min(30.0)
    } else {
        0.0
    };
    let close_fraction = match direction {
        Direction::Long => (bar.close - bar.low) / range,
        Direction::Short => (bar.high - bar.close) / range,
    };
    let close_points = 20.0 * close_fraction.clamp(0.0, 1.0);

    nose_points + size_points + close_points
}

#[derive(Debug, Clone)]
pub struct PinBarDetector {
    config: PinBarConfig,
    volatility: VolatilityEstimator,
}

impl PinBarDetector {
    pub fn new(config: PinBarConfig, volatility: VolatilityEstimator) -> Result<Self, DetectorError> {
        config.validate()?;
        Ok(Self { config, volatility })
    }

    pub fn config(&self) -> &PinBarConfig {
        &self.config
    }

    fn volume_confirms(&self, series: &PriceSeries) -> bool {
        match (series.bar(0), series.bar(1)) {
            (Some(cur), Some(prev)) => cur.volume > prev.volume,
            _ => false,
        }
    }

    /// Bullish pin bars need the preceding average close above the current
    /// close (a downtrend into the rejection); bearish the mirror.
    fn context_confirms(
        &self,
        series: &PriceSeries,
        direction: Direction,
    ) -> Result<bool, DetectorError> {
        let close = match series.bar(0) {
            Some(b) => b.close,
            None => return Ok(false),
        };
        let avg = series.average_close(1, self.config.context_bars)?;
        Ok(match direction {
            Direction::Long => avg > close,
            Direction::Short => avg < close,
        })
    }
}

impl PatternDetector for PinBarDetector {
    fn id(&self) -> &str {
        "pin_bar"
    }

    fn warmup_bars(&self) -> usize {
        let context = if self.config.use_market_context {
            self.config.context_bars + 1
        } else {
            2
        };
        context.max(self.volatility.period() + 1)
    }

    fn update(&mut self, _series: &PriceSeries) -> Result<(), DetectorError> {
        Ok(())
    }

    fn check_for_signal(&self, series: &PriceSeries) -> Result<Option<Signal>, DetectorError> {
        if series.len() < self.warmup_bars() {
            return Ok(None);
        }
        let bar = match series.bar(0) {
            Some(b) => *b,
            None => return Ok(None),
        };
        let direction = match classify(&bar, self.config.nose_factor) {
            Some(d) => d,
            None => return Ok(None),
        };

        let atr = self.volatility.atr_or_zero(series);
        let quality = quality_score(&bar, direction, atr);
        if quality < self.config.min_quality_score {
            debug!(quality, min = self.config.min_quality_score, "pin bar below quality threshold");
            return Ok(None);
        }
        if self.config.use_volume_confirm && !self.volume_confirms(series) {
            debug!("pin bar rejected: volume not confirming");
            return Ok(None);
        }
        if self.config.use_market_context && !self.context_confirms(series, direction)? {
            debug!("pin bar rejected: no preceding counter-move");
            return Ok(None);
        }

        Ok(Some(
            Signal::new(self.id(), direction, quality, bar.close)
                .with_meta("pin_high", bar.high)
                .with_meta("pin_low", bar.low)
                .with_meta("atr", atr),
        ))
    }

    fn calculate_stop_loss(
        &self,
        direction: Direction,
        series: &PriceSeries,
    ) -> Result<Option<f64>, DetectorError> {
        Ok(series.bar(0).map(|bar| match direction {
            Direction::Long => bar.low,
            Direction::Short => bar.high,
        }))
    }
}
