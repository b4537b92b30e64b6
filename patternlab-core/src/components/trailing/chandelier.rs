//! Chandelier exit: ATR-based stop hung from the recent extreme.
//!
//! long_exit  = highest_high(lookback) - ATR(atr_period) * multiplier
//! short_exit = lowest_low(lookback)  + ATR(atr_period) * multiplier
//!
//! Never a directional signal source. As a [`PatternDetector`] it only answers
//! `calculate_stop_loss`.

use serde::{Deserialize, Serialize};

use crate::components::signal::{DetectorError, PatternDetector, Signal};
use crate::domain::{Direction, PriceSeries};
use crate::indicators::{IndicatorError, VolatilityEstimator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChandelierConfig {
    pub atr_period: usize,
    pub lookback: usize,
    pub multiplier: f64,
}

impl Default for ChandelierConfig {
    fn default() -> Self {
        Self {
            atr_period: 22,
            lookback: 22,
            multiplier: 3.0,
        }
    }
}

impl ChandelierConfig {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.atr_period == 0 || self.lookback == 0 {
            return Err(DetectorError::InvalidParameter(
                "chandelier.atr_period and lookback must be >= 1".into(),
            ));
        }
        if self.multiplier.is_nan() || self.multiplier <= 0.0 {
            return Err(DetectorError::InvalidParameter(
                "chandelier.multiplier must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChandelierLevels {
    pub long_exit: f64,
    pub short_exit: f64,
    pub atr: f64,
}

impl ChandelierLevels {
    pub fn for_direction(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.long_exit,
            Direction::Short => self.short_exit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChandelierExit {
    config: ChandelierConfig,
    volatility: VolatilityEstimator,
}

impl ChandelierExit {
    pub fn new(config: ChandelierConfig) -> Result<Self, DetectorError> {
        config.validate()?;
        let volatility = VolatilityEstimator::new(config.atr_period)?;
        Ok(Self { config, volatility })
    }

    pub fn config(&self) -> &ChandelierConfig {
        &self.config
    }

    /// Exit levels as of the newest bar.
    pub fn levels(&self, series: &PriceSeries) -> Result<ChandelierLevels, IndicatorError> {
        let atr = self.volatility.atr(series)?;
        let offset = atr * self.config.multiplier;
        Ok(ChandelierLevels {
            long_exit: series.highest_high(0, self.config.lookback)? - offset,
            short_exit: series.lowest_low(0, self.config.lookback)? + offset,
            atr,
        })
    }
}

impl PatternDetector for ChandelierExit {
    fn id(&self) -> &str {
        "chandelier"
    }

    fn warmup_bars(&self) -> usize {
        self.config.atr_period.max(self.config.lookback)
    }

    fn update(&mut self, _series: &PriceSeries) -> Result<(), DetectorError> {
        Ok(())
    }

    fn check_for_signal(&self, _series: &PriceSeries) -> Result<Option<Signal>, DetectorError> {
        Ok(None)
    }

    fn calculate_stop_loss(
        &self,
        direction: Direction,
        series: &PriceSeries,
    ) -> Result<Option<f64>, DetectorError> {
        match self.levels(series) {
            Ok(levels) => Ok(Some(levels.for_direction(direction))),
            Err(IndicatorError::InsufficientData { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series_of;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    fn small() -> ChandelierExit {
        ChandelierExit::new(ChandelierConfig {
            atr_period: 3,
            lookback: 3,
            multiplier: 2.0,
        })
        .unwrap()
    }

    #[test]
    fn levels_hang_from_extremes() {
        let series = series_of(&[
            (10.0, 11.0, 9.0, 10.0, 1.0),
            (10.0, 12.0, 9.5, 11.5, 1.0),
            (11.5, 13.0, 11.0, 12.5, 1.0),
            (12.5, 12.8, 11.8, 12.0, 1.0),
        ]);
        let chandelier = small();
        let atr = VolatilityEstimator::new(3).unwrap().atr(&series).unwrap();
        let levels = chandelier.levels(&series).unwrap();
        assert_approx(levels.long_exit, 13.0 - 2.0 * atr, DEFAULT_EPSILON);
        assert_approx(levels.short_exit, 9.5 + 2.0 * atr, DEFAULT_EPSILON);
    }

    #[test]
    fn never_signals_but_supplies_stops() {
        let series = series_of(&[
            (10.0, 11.0, 9.0, 10.0, 1.0),
            (10.0, 12.0, 9.5, 11.5, 1.0),
            (11.5, 13.0, 11.0, 12.5, 1.0),
        ]);
        let chandelier = small();
        assert!(chandelier.check_for_signal(&series).unwrap().is_none());
        assert!(chandelier
            .calculate_stop_loss(Direction::Long, &series)
            .unwrap()
            .is_some());
    }

    #[test]
    fn warmup_yields_no_stop() {
        let series = series_of(&[(10.0, 11.0, 9.0, 10.0, 1.0)]);
        assert!(small()
            .calculate_stop_loss(Direction::Short, &series)
            .unwrap()
            .is_none());
    }

    #[test]
    fn rejects_zero_multiplier() {
        let config = ChandelierConfig {
            multiplier: 0.0,
            ..ChandelierConfig::default()
        };
        assert!(ChandelierExit::new(config).is_err());
    }
}
