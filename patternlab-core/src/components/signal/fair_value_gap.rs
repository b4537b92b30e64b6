//! Fair value gap: a three-bar price discontinuity tracked until it fills.
//!
//! For the window whose newest bar sits at `offset`:
//! - bullish: `low[offset] > high[offset + 2]`, gap `[high[offset+2], low[offset]]`
//! - bearish: `high[offset] < low[offset + 2]`, gap `[high[offset], low[offset+2]]`
//!
//! A gap is accepted when its size is at least `ATR × min_gap_factor`.
//! Significance is stored on the instance at formation. A bullish gap fills
//! the first time a later bar's low reaches its lower boundary; a bearish gap
//! fills when a later high reaches its upper boundary. Filled gaps stay in the
//! book for inspection until they age past `max_gap_age`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    Bar, Direction, PatternBook, PatternInstance, PatternKind, PatternStatus, PriceSeries,
};
use crate::indicators::stats::z_score;
use crate::indicators::VolatilityEstimator;

use super::{clamp_score, DetectorError, PatternDetector, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FvgConfig {
    /// Minimum gap size as a multiple of ATR.
    pub min_gap_factor: f64,
    /// Bars after which a gap is expired and pruned.
    pub max_gap_age: usize,
    /// Score gaps by z-score against recent gap sizes instead of plain ATR ratio.
    pub use_statistical_test: bool,
    /// Bars searched for historical gaps when scoring statistically.
    pub stat_lookback: usize,
    /// Scale significance by the gap bars' relative volume.
    pub use_volume_confirm: bool,
    /// Trailing bars for the volume baseline.
    pub volume_period: usize,
}

impl Default for FvgConfig {
    fn default() -> Self {
        Self {
            min_gap_factor: 0.5,
            max_gap_age: 50,
            use_statistical_test: false,
            stat_lookback: 100,
            use_volume_confirm: false,
            volume_period: 20,
        }
    }
}

impl FvgConfig {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.min_gap_factor.is_nan() || self.min_gap_factor < 0.0 {
            return Err(DetectorError::InvalidParameter(
                "fvg.min_gap_factor must be >= 0".into(),
            ));
        }
        if self.max_gap_age == 0 {
            return Err(DetectorError::InvalidParameter(
                "fvg.max_gap_age must be >= 1".into(),
            ));
        }
        if self.use_statistical_test && self.stat_lookback < 3 {
            return Err(DetectorError::InvalidParameter(
                "fvg.stat_lookback must be >= 3".into(),
            ));
        }
        if self.use_volume_confirm && self.volume_period == 0 {
            return Err(DetectorError::InvalidParameter(
                "fvg.volume_period must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// A raw gap found in a three-bar window, before acceptance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapCandidate {
    pub direction: Direction,
    pub lower: f64,
    pub upper: f64,
    pub formed_at: NaiveDateTime,
}

impl GapCandidate {
    pub fn size(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn mid(&self) -> f64 {
        self.lower + self.size() / 2.0
    }
}

/// Any gap in the window whose newest bar is `offset` bars back.
pub fn find_gap(series: &PriceSeries, offset: usize) -> Option<GapCandidate> {
    let newest = series.bar(offset)?;
    let oldest = series.bar(offset + 2)?;
    if newest.low > oldest.high {
        Some(GapCandidate {
            direction: Direction::Long,
            lower: oldest.high,
            upper: newest.low,
            formed_at: newest.timestamp,
        })
    } else if newest.high < oldest.low {
        Some(GapCandidate {
            direction: Direction::Short,
            lower: newest.high,
            upper: oldest.low,
            formed_at: newest.timestamp,
        })
    } else {
        None
    }
}

/// A gap at `offset` that clears `atr × min_gap_factor`.
pub fn scan_gap(
    series: &PriceSeries,
    offset: usize,
    atr: f64,
    min_gap_factor: f64,
) -> Option<GapCandidate> {
    find_gap(series, offset).filter(|gap| gap.size() >= atr * min_gap_factor)
}

/// `100 × (gap / ATR) / 2`, capped at 100. Neutral 50 without a usable ATR.
pub fn atr_ratio_score(gap_size: f64, atr: f64) -> f64 {
    if atr <= 0.0 {
        return 50.0;
    }
    clamp_score(100.0 * (gap_size / atr) / 2.0)
}

/// True once `bar` trades back to the gap's far boundary.
pub fn gap_filled(direction: Direction, lower: f64, upper: f64, bar: &Bar) -> bool {
    match direction {
        Direction::Long => bar.low <= lower,
        Direction::Short => bar.high >= upper,
    }
}

#[derive(Debug, Clone)]
pub struct FairValueGapDetector {
    config: FvgConfig,
    volatility: VolatilityEstimator,
    book: PatternBook,
    last_processed: Option<NaiveDateTime>,
}

impl FairValueGapDetector {
    pub fn new(config: FvgConfig, volatility: VolatilityEstimator) -> Result<Self, DetectorError> {
        config.validate()?;
        Ok(Self {
            config,
            volatility,
            book: PatternBook::new(),
            last_processed: None,
        })
    }

    pub fn config(&self) -> &FvgConfig {
        &self.config
    }

    /// Every tracked gap, including filled and expired ones not yet pruned.
    pub fn book(&self) -> &PatternBook {
        &self.book
    }

    /// Gap-to-ATR ratios of every gap in the lookback window whose three bars
    /// all predate the window at `offset`.
    fn historical_ratios(&self, series: &PriceSeries, offset: usize) -> Vec<f64> {
        let first = offset + 3;
        let last = (offset + 2 + self.config.stat_lookback).min(series.len().saturating_sub(3));
        (first..=last)
            .filter_map(|j| {
                let gap = find_gap(series, j)?;
                let atr = self.volatility.atr_at(series, j).ok()?;
                (atr > 0.0).then(|| gap.size() / atr)
            })
            .collect()
    }

    fn significance(&self, series: &PriceSeries, offset: usize, gap: &GapCandidate, atr: f64) -> f64 {
        let mut score = atr_ratio_score(gap.size(), atr);

        if self.config.use_statistical_test && atr > 0.0 {
            let history = self.historical_ratios(series, offset);
            if let Some(z) = z_score(gap.size() / atr, &history) {
                score = clamp_score(50.0 + z * 10.0);
            }
        }

        if self.config.use_volume_confirm {
            let window = series.average_volume(offset, 3);
            let baseline = series.average_volume(offset + 3, self.config.volume_period);
            if let (Ok(window), Ok(baseline)) = (window, baseline) {
                if baseline > 0.0 {
                    score *= if window > baseline { 1.2 } else { 0.8 };
                }
            }
        }

        clamp_score(score)
    }

    /// Register the gap whose newest bar is `offset` bars back, aged to match.
    fn register_gap(&mut self, series: &PriceSeries, offset: usize) {
        let atr = match self.volatility.atr_at(series, offset) {
            Ok(atr) => atr,
            Err(_) => return,
        };
        let gap = match scan_gap(series, offset, atr, self.config.min_gap_factor) {
            Some(gap) => gap,
            None => return,
        };
        if self
            .book
            .contains_level(PatternKind::FairValueGap, gap.direction, gap.lower, gap.upper)
        {
            return;
        }

        let significance = self.significance(series, offset, &gap, atr);
        let mut instance = PatternInstance::new(
            PatternKind::FairValueGap,
            gap.direction,
            gap.formed_at,
            gap.lower,
            gap.upper,
            significance,
        );
        instance.age = offset;
        let id = self.book.insert(instance);
        debug!(
            %id,
            direction = ?gap.direction,
            lower = gap.lower,
            upper = gap.upper,
            significance,
            "fair value gap registered"
        );
    }

    fn check_fills(&mut self, bar: &Bar) {
        for inst in self.book.iter_mut().filter(|i| i.status.is_active()) {
            if gap_filled(inst.direction, inst.lower, inst.upper, bar)
                && inst.resolve(PatternStatus::Filled)
            {
                debug!(id = %inst.id, "fair value gap filled");
            }
        }
    }

    /// Seed the book from history on the first update, replaying fills for
    /// every bar newer than each gap.
    fn backfill(&mut self, series: &PriceSeries) {
        let oldest = series
            .len()
            .saturating_sub(3)
            .min(self.config.max_gap_age.saturating_sub(1));
        for offset in (1..=oldest).rev() {
            let before = self.book.len();
            self.register_gap(series, offset);
            if self.book.len() == before {
                continue;
            }
            for newer in (0..offset).rev() {
                if let Some(bar) = series.bar(newer).copied() {
                    self.check_fills(&bar);
                }
            }
        }
    }

    fn best_active(&self, direction: Option<Direction>) -> Option<&PatternInstance> {
        let mut best: Option<&PatternInstance> = None;
        for inst in self
            .book
            .active()
            .filter(|i| direction.map_or(true, |d| i.direction == d))
        {
            if best.map_or(true, |b| inst.strength > b.strength) {
                best = Some(inst);
            }
        }
        best
    }
}

impl PatternDetector for FairValueGapDetector {
    fn id(&self) -> &str {
        "fair_value_gap"
    }

    fn warmup_bars(&self) -> usize {
        self.volatility.period().max(3)
    }

    fn update(&mut self, series: &PriceSeries) -> Result<(), DetectorError> {
        let bar = match series.bar(0) {
            Some(b) => *b,
            None => return Ok(()),
        };
        if self.last_processed == Some(bar.timestamp) {
            return Ok(());
        }

        if self.last_processed.is_none() {
            self.backfill(series);
        } else {
            self.book.advance(self.config.max_gap_age);
            self.check_fills(&bar);
        }
        self.register_gap(series, 0);

        let pruned = self.book.prune(self.config.max_gap_age);
        if pruned > 0 {
            debug!(pruned, "fair value gaps pruned");
        }
        self.last_processed = Some(bar.timestamp);
        Ok(())
    }

    fn check_for_signal(&self, series: &PriceSeries) -> Result<Option<Signal>, DetectorError> {
        let close = match series.bar(0) {
            Some(b) => b.close,
            None => return Ok(None),
        };
        Ok(self.best_active(None).map(|gap| {
            Signal::new(self.id(), gap.direction, gap.strength, close)
                .with_meta("gap_lower", gap.lower)
                .with_meta("gap_upper", gap.upper)
                .with_meta("gap_mid", gap.mid())
                .with_meta("gap_age", gap.age as f64)
        }))
    }

    fn calculate_stop_loss(
        &self,
        direction: Direction,
        _series: &PriceSeries,
    ) -> Result<Option<f64>, DetectorError> {
        Ok(self.best_active(Some(direction)).map(|gap| match direction {
            Direction::Long => gap.lower,
            Direction::Short => gap.upper,
        }))
    }
}
