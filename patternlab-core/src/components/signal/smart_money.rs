//! Smart-money structure: order blocks, liquidity zones and internal fair
//! value gaps kept in one book.
//!
//! Each bar the detector resolves existing patterns against the newest bar,
//! then scans for new ones:
//! - order block: newest three bars, strong candle → smaller counter candle →
//!   continuation closing beyond the counter candle's body. The counter
//!   candle's body is the zone. `Active → Tested` on the first revisit.
//! - liquidity zone: strict five-bar swing extreme centred at offset 2, padded
//!   by `zone_buffer_atr × ATR`. Entering the zone counts a touch; trading
//!   beyond its outer bound sweeps it.
//! - fair value gap: same shape as the standalone gap detector, filled on
//!   retrace.
//!
//! Setups, strongest wins (earlier rule on ties):
//! 1. order block tested on this bar
//! 2. liquidity zone swept within `sweep_recency` bars plus a reversal candle
//! 3. close approaching an unfilled gap from the correct side, within
//!    `fvg_approach_ratio` of the gap size

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    Bar, Direction, PatternBook, PatternId, PatternInstance, PatternKind, PatternStatus,
    PriceSeries,
};
use crate::indicators::{sma_tail, VolatilityEstimator};

use super::fair_value_gap::{atr_ratio_score, gap_filled, scan_gap};
use super::{clamp_score, DetectorError, PatternDetector, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartMoneyConfig {
    pub use_order_blocks: bool,
    pub use_liquidity_zones: bool,
    pub use_fvg: bool,
    /// Minimum body/range ratio of the impulse candle.
    pub impulse_body_ratio: f64,
    /// Zone padding and stop buffer, in ATR.
    pub zone_buffer_atr: f64,
    /// Relative volume above which strength is boosted 20%.
    pub volume_factor: f64,
    pub volume_period: usize,
    pub max_age: usize,
    /// A sweep stays tradable for this many bars.
    pub sweep_recency: u64,
    pub fvg_min_gap_factor: f64,
    /// Approach band above/below a gap, as a fraction of its size.
    pub fvg_approach_ratio: f64,
    pub use_mtf_confirm: bool,
    /// Base bars per higher-timeframe bar.
    pub htf_factor: usize,
    /// Higher-timeframe bars in the trend moving average.
    pub htf_ma_period: usize,
}

impl Default for SmartMoneyConfig {
    fn default() -> Self {
        Self {
            use_order_blocks: true,
            use_liquidity_zones: true,
            use_fvg: true,
            impulse_body_ratio: 0.5,
            zone_buffer_atr: 0.1,
            volume_factor: 1.5,
            volume_period: 20,
            max_age: 100,
            sweep_recency: 3,
            fvg_min_gap_factor: 0.5,
            fvg_approach_ratio: 0.3,
            use_mtf_confirm: false,
            htf_factor: 4,
            htf_ma_period: 20,
        }
    }
}

impl SmartMoneyConfig {
    pub fn validate(&self) -> Result<(), DetectorError> {
        let invalid = |msg: &str| Err(DetectorError::InvalidParameter(msg.to_string()));
        if !(0.0..1.0).contains(&self.impulse_body_ratio) {
            return invalid("smart_money.impulse_body_ratio must be in [0, 1)");
        }
        if self.zone_buffer_atr.is_nan() || self.zone_buffer_atr < 0.0 {
            return invalid("smart_money.zone_buffer_atr must be >= 0");
        }
        if self.volume_period == 0 {
            return invalid("smart_money.volume_period must be >= 1");
        }
        if self.max_age == 0 {
            return invalid("smart_money.max_age must be >= 1");
        }
        if self.fvg_approach_ratio.is_nan() || self.fvg_approach_ratio < 0.0 {
            return invalid("smart_money.fvg_approach_ratio must be >= 0");
        }
        if self.use_mtf_confirm && (self.htf_factor == 0 || self.htf_ma_period == 0) {
            return invalid("smart_money.htf_factor and htf_ma_period must be >= 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupKind {
    OrderBlock,
    LiquiditySweep,
    FvgApproach,
}

/// A tradable configuration found on the current bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setup {
    pub kind: SetupKind,
    pub direction: Direction,
    pub strength: f64,
    pub stop: f64,
    pub pattern: PatternId,
}

#[derive(Debug, Clone, Copy)]
struct Resolution {
    bar: u64,
    /// Price that resolved the pattern (sweep high/low).
    extreme: f64,
}

/// Higher-timeframe trend: the close of each `factor`-bar block, newest
/// first, compared against their mean over `ma_period` blocks. `None` when
/// history is too short or price sits exactly on the average.
pub fn htf_trend(series: &PriceSeries, factor: usize, ma_period: usize) -> Option<Direction> {
    if factor == 0 || ma_period == 0 {
        return None;
    }
    let closes: Option<Vec<f64>> = (0..ma_period)
        .map(|k| series.bar(k * factor).map(|b| b.close))
        .collect();
    let closes = closes?;
    let average = sma_tail(&closes, ma_period)?;
    let last = closes[0];
    if last > average {
        Some(Direction::Long)
    } else if last < average {
        Some(Direction::Short)
    } else {
        None
    }
}

/// Order block in the newest three bars: `(direction, lower, upper)`.
pub fn scan_order_block(
    impulse: &Bar,
    counter: &Bar,
    confirm: &Bar,
    body_ratio: f64,
) -> Option<(Direction, f64, f64)> {
    let strong = impulse.range() > 0.0 && impulse.body() > impulse.range() * body_ratio;
    if !strong || counter.body() >= impulse.body() {
        return None;
    }
    let zone_low = counter.open.min(counter.close);
    let zone_high = counter.open.max(counter.close);

    if impulse.is_bullish() && counter.is_bearish() && confirm.is_bullish() && confirm.close > zone_high
    {
        Some((Direction::Long, zone_low, zone_high))
    } else if impulse.is_bearish()
        && counter.is_bullish()
        && confirm.is_bearish()
        && confirm.close < zone_low
    {
        Some((Direction::Short, zone_low, zone_high))
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct SmartMoneyDetector {
    config: SmartMoneyConfig,
    volatility: VolatilityEstimator,
    book: PatternBook,
    bar_count: u64,
    last_processed: Option<NaiveDateTime>,
    resolutions: HashMap<PatternId, Resolution>,
    zone_boost: HashMap<PatternId, f64>,
}

impl SmartMoneyDetector {
    pub fn new(
        config: SmartMoneyConfig,
        volatility: VolatilityEstimator,
    ) -> Result<Self, DetectorError> {
        config.validate()?;
        Ok(Self {
            config,
            volatility,
            book: PatternBook::new(),
            bar_count: 0,
            last_processed: None,
            resolutions: HashMap::new(),
            zone_boost: HashMap::new(),
        })
    }

    pub fn config(&self) -> &SmartMoneyConfig {
        &self.config
    }

    pub fn book(&self) -> &PatternBook {
        &self.book
    }

    fn buffer(&self, series: &PriceSeries) -> f64 {
        self.volatility.atr_or_zero(series) * self.config.zone_buffer_atr
    }

    /// 1.2 when `volume` beats `volume_factor` × the trailing average ending
    /// `offset` bars back, else 1.0.
    fn volume_boost(&self, series: &PriceSeries, volume: f64, offset: usize) -> f64 {
        match series.average_volume(offset, self.config.volume_period) {
            Ok(avg) if avg > 0.0 && volume > avg * self.config.volume_factor => 1.2,
            _ => 1.0,
        }
    }

    fn resolve_against(&mut self, bar: &Bar) {
        let now = self.bar_count;
        let mut resolved = Vec::new();
        for inst in self.book.iter_mut().filter(|i| i.status.is_active()) {
            match inst.kind {
                PatternKind::OrderBlock => {
                    if inst.overlaps(bar.low, bar.high) && inst.resolve(PatternStatus::Tested) {
                        resolved.push((inst.id, bar.close));
                    }
                }
                PatternKind::LiquidityZone => {
                    let (swept, touched, extreme) = match inst.direction {
                        Direction::Short => (bar.high > inst.upper, bar.high >= inst.lower, bar.high),
                        Direction::Long => (bar.low < inst.lower, bar.low <= inst.upper, bar.low),
                    };
                    if swept {
                        if inst.resolve(PatternStatus::Swept) {
                            resolved.push((inst.id, extreme));
                        }
                    } else if touched {
                        inst.touches += 1;
                        let boost = self.zone_boost.get(&inst.id).copied().unwrap_or(1.0);
                        inst.strength = clamp_score((50.0 + f64::from(inst.touches) * 10.0) * boost);
                    }
                }
                PatternKind::FairValueGap => {
                    if gap_filled(inst.direction, inst.lower, inst.upper, bar) {
                        inst.resolve(PatternStatus::Filled);
                    }
                }
            }
        }
        for (id, extreme) in resolved {
            debug!(%id, extreme, "smart-money pattern resolved");
            self.resolutions.insert(id, Resolution { bar: now, extreme });
        }
    }

    fn scan_order_block(&mut self, series: &PriceSeries, atr: f64) {
        let (confirm, counter, impulse) = match (series.bar(0), series.bar(1), series.bar(2)) {
            (Some(a), Some(b), Some(c)) => (*a, *b, *c),
            _ => return,
        };
        let (direction, lower, upper) =
            match scan_order_block(&impulse, &counter, &confirm, self.config.impulse_body_ratio) {
                Some(found) => found,
                None => return,
            };
        if self
            .book
            .contains_level(PatternKind::OrderBlock, direction, lower, upper)
        {
            return;
        }

        let size_points = if atr > 0.0 {
            (impulse.range() / atr * 12.5).min(25.0)
        } else {
            0.0
        };
        let pattern_volume = (impulse.volume + counter.volume + confirm.volume) / 3.0;
        let strength = (50.0 + size_points) * self.volume_boost(series, pattern_volume, 3);

        let id = self.book.insert(PatternInstance::new(
            PatternKind::OrderBlock,
            direction,
            counter.timestamp,
            lower,
            upper,
            strength,
        ));
        debug!(%id, ?direction, lower, upper, strength, "order block formed");
    }

    fn scan_liquidity_zone(&mut self, series: &PriceSeries, atr: f64) {
        let window: Vec<Bar> = match series.get(0, 5) {
            Ok(w) => w,
            Err(_) => return,
        };
        let pivot = window[2];
        let neighbours = [window[0], window[1], window[3], window[4]];
        let swing_high = neighbours.iter().all(|b| pivot.high > b.high);
        let swing_low = neighbours.iter().all(|b| pivot.low < b.low);
        let pad = atr * self.config.zone_buffer_atr;
        let boost = self.volume_boost(series, pivot.volume, 3);

        let mut zones = Vec::new();
        if swing_high {
            zones.push((Direction::Short, pivot.high - pad, pivot.high + pad));
        }
        if swing_low {
            zones.push((Direction::Long, pivot.low - pad, pivot.low + pad));
        }
        for (direction, lower, upper) in zones {
            if self
                .book
                .contains_level(PatternKind::LiquidityZone, direction, lower, upper)
            {
                continue;
            }
            let mut zone = PatternInstance::new(
                PatternKind::LiquidityZone,
                direction,
                pivot.timestamp,
                lower,
                upper,
                50.0 * boost,
            );
            zone.age = 2;
            let id = self.book.insert(zone);
            self.zone_boost.insert(id, boost);
            debug!(%id, ?direction, lower, upper, "liquidity zone formed");
        }
    }

    fn scan_gap(&mut self, series: &PriceSeries, atr: f64) {
        let gap = match scan_gap(series, 0, atr, self.config.fvg_min_gap_factor) {
            Some(g) => g,
            None => return,
        };
        if self
            .book
            .contains_level(PatternKind::FairValueGap, gap.direction, gap.lower, gap.upper)
        {
            return;
        }
        self.book.insert(PatternInstance::new(
            PatternKind::FairValueGap,
            gap.direction,
            gap.formed_at,
            gap.lower,
            gap.upper,
            atr_ratio_score(gap.size(), atr),
        ));
    }

    /// Every setup available on the current bar, in rule order.
    pub fn setups(&self, series: &PriceSeries) -> Vec<Setup> {
        let bar = match series.bar(0) {
            Some(b) => *b,
            None => return Vec::new(),
        };
        if self.last_processed != Some(bar.timestamp) {
            return Vec::new();
        }
        let buffer = self.buffer(series);
        let mut found = Vec::new();

        for inst in self.book.iter().filter(|i| i.kind == PatternKind::OrderBlock) {
            let tested_now = inst.status == PatternStatus::Tested
                && self
                    .resolutions
                    .get(&inst.id)
                    .is_some_and(|r| r.bar == self.bar_count);
            if tested_now {
                let stop = match inst.direction {
                    Direction::Long => inst.lower - buffer,
                    Direction::Short => inst.upper + buffer,
                };
                found.push(Setup {
                    kind: SetupKind::OrderBlock,
                    direction: inst.direction,
                    strength: inst.strength,
                    stop,
                    pattern: inst.id,
                });
            }
        }

        for inst in self.book.iter().filter(|i| {
            i.kind == PatternKind::LiquidityZone && i.status == PatternStatus::Swept
        }) {
            let res = match self.resolutions.get(&inst.id) {
                Some(r) if self.bar_count - r.bar <= self.config.sweep_recency => r,
                _ => continue,
            };
            let (reversal, stop) = match inst.direction {
                Direction::Short => (
                    bar.is_bearish() && bar.close < inst.upper,
                    res.extreme + buffer,
                ),
                Direction::Long => (
                    bar.is_bullish() && bar.close > inst.lower,
                    res.extreme - buffer,
                ),
            };
            if reversal {
                found.push(Setup {
                    kind: SetupKind::LiquiditySweep,
                    direction: inst.direction,
                    strength: inst.strength,
                    stop,
                    pattern: inst.id,
                });
            }
        }

        for gap in self
            .book
            .active()
            .filter(|i| i.kind == PatternKind::FairValueGap)
        {
            let band = gap.size() * self.config.fvg_approach_ratio;
            let (approaching, stop) = match gap.direction {
                Direction::Long => (bar.close > gap.upper && bar.close - gap.upper <= band, gap.lower),
                Direction::Short => (bar.close < gap.lower && gap.lower - bar.close <= band, gap.upper),
            };
            if approaching {
                found.push(Setup {
                    kind: SetupKind::FvgApproach,
                    direction: gap.direction,
                    strength: gap.strength,
                    stop,
                    pattern: gap.id,
                });
            }
        }

        if self.config.use_mtf_confirm {
            if let Some(trend) = htf_trend(series, self.config.htf_factor, self.config.htf_ma_period)
            {
                for setup in &mut found {
                    let factor = if setup.direction == trend { 1.2 } else { 0.8 };
                    setup.strength = clamp_score(setup.strength * factor);
                }
            }
        }
        found
    }

    fn best_setup(&self, series: &PriceSeries, direction: Option<Direction>) -> Option<Setup> {
        let mut best: Option<Setup> = None;
        for setup in self
            .setups(series)
            .into_iter()
            .filter(|s| direction.map_or(true, |d| s.direction == d))
        {
            if best.map_or(true, |b| setup.strength > b.strength) {
                best = Some(setup);
            }
        }
        best
    }
}

impl PatternDetector for SmartMoneyDetector {
    fn id(&self) -> &str {
        "smart_money"
    }

    fn warmup_bars(&self) -> usize {
        (self.volatility.period() + 1).max(5)
    }

    fn update(&mut self, series: &PriceSeries) -> Result<(), DetectorError> {
        let bar = match series.bar(0) {
            Some(b) => *b,
            None => return Ok(()),
        };
        if self.last_processed == Some(bar.timestamp) {
            return Ok(());
        }
        self.bar_count += 1;
        self.book.advance(self.config.max_age);
        self.resolve_against(&bar);

        let atr = self.volatility.atr_or_zero(series);
        if self.config.use_order_blocks {
            self.scan_order_block(series, atr);
        }
        if self.config.use_liquidity_zones {
            self.scan_liquidity_zone(series, atr);
        }
        if self.config.use_fvg {
            self.scan_gap(series, atr);
        }

        if self.book.prune(self.config.max_age) > 0 {
            let book = &self.book;
            self.resolutions.retain(|id, _| book.get(*id).is_some());
            self.zone_boost.retain(|id, _| book.get(*id).is_some());
        }
        self.last_processed = Some(bar.timestamp);
        Ok(())
    }

    fn check_for_signal(&self, series: &PriceSeries) -> Result<Option<Signal>, DetectorError> {
        if series.len() < self.warmup_bars() {
            return Ok(None);
        }
        let close = match series.bar(0) {
            Some(b) => b.close,
            None => return Ok(None),
        };
        Ok(self.best_setup(series, None).map(|setup| {
            let rule = match setup.kind {
                SetupKind::OrderBlock => 1.0,
                SetupKind::LiquiditySweep => 2.0,
                SetupKind::FvgApproach => 3.0,
            };
            Signal::new(self.id(), setup.direction, setup.strength, close)
                .with_meta("setup", rule)
                .with_meta("setup_stop", setup.stop)
        }))
    }

    fn calculate_stop_loss(
        &self,
        direction: Direction,
        series: &PriceSeries,
    ) -> Result<Option<f64>, DetectorError> {
        Ok(self.best_setup(series, Some(direction)).map(|s| s.stop))
    }
}
