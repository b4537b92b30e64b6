//! Average True Range (ATR): the volatility yardstick every detector
//! normalises its thresholds against.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR here is the simple rolling mean of TR over the `period` most recently
//! closed bars. It is recomputed on every call; nothing is cached across bars.

use crate::domain::{Bar, PriceSeries};

use super::IndicatorError;

/// True range of `bar` given the previous bar's close (if any).
pub fn true_range(bar: &Bar, prev_close: Option<f64>) -> f64 {
    let high_low = bar.high - bar.low;
    match prev_close {
        Some(pc) => high_low
            .max((bar.high - pc).abs())
            .max((bar.low - pc).abs()),
        None => high_low,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityEstimator {
    period: usize,
}

impl VolatilityEstimator {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        if period == 0 {
            return Err(IndicatorError::InvalidParameter("ATR period must be >= 1"));
        }
        Ok(Self { period })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// ATR ending at the most recent bar.
    pub fn atr(&self, series: &PriceSeries) -> Result<f64, IndicatorError> {
        self.atr_at(series, 0)
    }

    /// ATR over the `period` bars ending `offset` bars back.
    ///
    /// The oldest bar in the window uses the close just outside the window as
    /// its previous close when it exists, and plain high-low otherwise.
    pub fn atr_at(&self, series: &PriceSeries, offset: usize) -> Result<f64, IndicatorError> {
        let needed = offset + self.period;
        if series.len() < needed {
            return Err(IndicatorError::InsufficientData {
                needed,
                available: series.len(),
            });
        }

        let mut sum = 0.0;
        for i in offset..offset + self.period {
            let bar = match series.bar(i) {
                Some(b) => b,
                None => break,
            };
            let prev_close = series.bar(i + 1).map(|b| b.close);
            sum += true_range(bar, prev_close);
        }
        Ok((sum / self.period as f64).max(0.0))
    }

    /// ATR or 0.0 during warm-up.
    pub fn atr_or_zero(&self, series: &PriceSeries) -> f64 {
        self.atr(series).unwrap_or(0.0)
    }
}
