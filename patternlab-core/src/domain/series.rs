//! PriceSeries: rolling OHLCV history for one symbol/timeframe.
//!
//! Storage is chronological, but every accessor is addressed by *offset*:
//! offset 0 is the most recently closed bar, offset 1 the bar before it, and
//! so on. Detectors only ever see the series through `&PriceSeries`, so all of
//! them observe the same snapshot within one cycle.

use std::collections::VecDeque;

use thiserror::Error;

use super::Bar;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeriesError {
    #[error("insufficient history: requested {requested} bars, {available} available")]
    InsufficientHistory { requested: usize, available: usize },
}

#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    symbol: String,
    bars: VecDeque<Bar>,
    capacity: Option<usize>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bars: VecDeque::new(),
            capacity: None,
        }
    }

    /// Rolling series that keeps at most `capacity` bars (oldest dropped first).
    pub fn with_capacity(symbol: impl Into<String>, capacity: usize) -> Self {
        Self {
            symbol: symbol.into(),
            bars: VecDeque::with_capacity(capacity),
            capacity: Some(capacity.max(1)),
        }
    }

    /// Build from bars given oldest-first.
    pub fn from_bars(symbol: impl Into<String>, bars: impl IntoIterator<Item = Bar>) -> Self {
        let mut series = Self::new(symbol);
        for bar in bars {
            series.push(bar);
        }
        series
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Append a newly closed bar. It becomes offset 0.
    pub fn push(&mut self, bar: Bar) {
        self.bars.push_back(bar);
        if let Some(cap) = self.capacity {
            while self.bars.len() > cap {
                self.bars.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Bar at `offset` bars back (0 = most recent).
    pub fn bar(&self, offset: usize) -> Option<&Bar> {
        let len = self.bars.len();
        if offset >= len {
            return None;
        }
        self.bars.get(len - 1 - offset)
    }

    pub fn latest(&self) -> Option<&Bar> {
        self.bar(0)
    }

    /// Fail with `InsufficientHistory` unless at least `needed` bars exist.
    pub fn require(&self, needed: usize) -> Result<(), SeriesError> {
        if self.bars.len() < needed {
            return Err(SeriesError::InsufficientHistory {
                requested: needed,
                available: self.bars.len(),
            });
        }
        Ok(())
    }

    /// `count` bars ending `offset` bars back, newest first.
    pub fn get(&self, offset: usize, count: usize) -> Result<Vec<Bar>, SeriesError> {
        Ok(self.window(offset, count)?.copied().collect())
    }

    /// Borrowing variant of [`get`](Self::get).
    pub fn window(
        &self,
        offset: usize,
        count: usize,
    ) -> Result<impl Iterator<Item = &Bar> + '_, SeriesError> {
        self.require(offset + count)?;
        let newest = self.bars.len() - 1 - offset;
        Ok((0..count).map(move |i| &self.bars[newest - i]))
    }

    /// Bars oldest-first, for resampling.
    pub fn iter_chronological(&self) -> impl DoubleEndedIterator<Item = &Bar> + '_ {
        self.bars.iter()
    }

    pub fn highest_high(&self, offset: usize, count: usize) -> Result<f64, SeriesError> {
        Ok(self
            .window(offset, count)?
            .map(|b| b.high)
            .fold(f64::NEG_INFINITY, f64::max))
    }

    pub fn lowest_low(&self, offset: usize, count: usize) -> Result<f64, SeriesError> {
        Ok(self
            .window(offset, count)?
            .map(|b| b.low)
            .fold(f64::INFINITY, f64::min))
    }

    /// Mean volume over the window. Zero-length windows average to 0.
    pub fn average_volume(&self, offset: usize, count: usize) -> Result<f64, SeriesError> {
        if count == 0 {
            return Ok(0.0);
        }
        let sum: f64 = self.window(offset, count)?.map(|b| b.volume).sum();
        Ok(sum / count as f64)
    }

    /// Mean close over the window. Zero-length windows average to 0.
    pub fn average_close(&self, offset: usize, count: usize) -> Result<f64, SeriesError> {
        if count == 0 {
            return Ok(0.0);
        }
        let sum: f64 = self.window(offset, count)?.map(|b| b.close).sum();
        Ok(sum / count as f64)
    }
}
