//! VWAP deviation bands.
//!
//! The running VWAP accumulates `typical × volume` either continuously or per
//! session (reset at `session_start_hour`). Bands sit at
//! `vwap ± std_dev(typical − vwap) × band_multiplier` over the last
//! `deviation_period` bars.
//!
//! Two signal shapes:
//! - close beyond a band: mean reversion against the excursion, strength
//!   `min(100, |z| × 25)`
//! - close crossing VWAP after an excursion beyond a band: continuation in the
//!   crossing direction, strength `50 + volume_ratio × 10`

use std::collections::VecDeque;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Bar, Direction, PriceSeries};
use crate::indicators::stats::{safe_ratio, std_dev};
use crate::indicators::VolatilityEstimator;

use super::{DetectorError, PatternDetector, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VwapConfig {
    pub session_reset: bool,
    /// Hour (0-23) at which a new session starts.
    pub session_start_hour: u32,
    pub band_multiplier: f64,
    /// Bars in the rolling deviation window.
    pub deviation_period: usize,
    /// Trailing bars for the volume baseline.
    pub volume_period: usize,
    /// Scale strength up 20% on above-average volume, down 20% otherwise.
    pub use_volume_adjust: bool,
    /// Stop distance beyond the signal bar's extreme, in ATR.
    pub stop_atr_buffer: f64,
}

impl Default for VwapConfig {
    fn default() -> Self {
        Self {
            session_reset: false,
            session_start_hour: 0,
            band_multiplier: 2.0,
            deviation_period: 20,
            volume_period: 20,
            use_volume_adjust: false,
            stop_atr_buffer: 0.5,
        }
    }
}

impl VwapConfig {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.session_start_hour > 23 {
            return Err(DetectorError::InvalidParameter(
                "vwap.session_start_hour must be in 0..=23".into(),
            ));
        }
        if self.band_multiplier.is_nan() || self.band_multiplier <= 0.0 {
            return Err(DetectorError::InvalidParameter(
                "vwap.band_multiplier must be > 0".into(),
            ));
        }
        if self.deviation_period < 2 {
            return Err(DetectorError::InvalidParameter(
                "vwap.deviation_period must be >= 2".into(),
            ));
        }
        if self.volume_period == 0 {
            return Err(DetectorError::InvalidParameter(
                "vwap.volume_period must be >= 1".into(),
            ));
        }
        if self.stop_atr_buffer.is_nan() || self.stop_atr_buffer < 0.0 {
            return Err(DetectorError::InvalidParameter(
                "vwap.stop_atr_buffer must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Excursion {
    Above,
    Below,
}

/// Band levels as of the last ingested bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VwapSnapshot {
    pub timestamp: NaiveDateTime,
    pub vwap: f64,
    pub deviation: f64,
    pub upper_band: f64,
    pub lower_band: f64,
    pub close: f64,
    /// Set on the bar that crossed VWAP after a band excursion.
    pub crossed: Option<Direction>,
}

impl VwapSnapshot {
    /// Distance of the close from VWAP in deviations; 0 without dispersion.
    pub fn z_score(&self) -> f64 {
        safe_ratio(self.close - self.vwap, self.deviation, 0.0)
    }
}

#[derive(Debug, Clone)]
pub struct VwapBandDetector {
    config: VwapConfig,
    volatility: VolatilityEstimator,
    session: Option<NaiveDate>,
    cum_pv: f64,
    cum_volume: f64,
    deviations: VecDeque<f64>,
    excursion: Option<Excursion>,
    snapshot: Option<VwapSnapshot>,
}

impl VwapBandDetector {
    pub fn new(config: VwapConfig, volatility: VolatilityEstimator) -> Result<Self, DetectorError> {
        config.validate()?;
        Ok(Self {
            deviations: VecDeque::with_capacity(config.deviation_period),
            config,
            volatility,
            session: None,
            cum_pv: 0.0,
            cum_volume: 0.0,
            excursion: None,
            snapshot: None,
        })
    }

    pub fn config(&self) -> &VwapConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Option<&VwapSnapshot> {
        self.snapshot.as_ref()
    }

    /// Session a bar belongs to: its date after shifting back by the start hour.
    fn session_of(&self, ts: NaiveDateTime) -> NaiveDate {
        (ts - Duration::hours(i64::from(self.config.session_start_hour))).date()
    }

    fn reset_session(&mut self) {
        self.cum_pv = 0.0;
        self.cum_volume = 0.0;
        self.deviations.clear();
        self.excursion = None;
    }

    fn ingest(&mut self, bar: &Bar) {
        if self.config.session_reset {
            let session = self.session_of(bar.timestamp);
            if self.session.is_some_and(|s| s != session) {
                debug!(%session, "vwap session reset");
                self.reset_session();
            }
            self.session = Some(session);
        }

        let typical = bar.typical_price();
        self.cum_pv += typical * bar.volume;
        self.cum_volume += bar.volume;
        let vwap = safe_ratio(self.cum_pv, self.cum_volume, typical);

        self.deviations.push_back(typical - vwap);
        while self.deviations.len() > self.config.deviation_period {
            self.deviations.pop_front();
        }
        let window: Vec<f64> = self.deviations.iter().copied().collect();
        let deviation = std_dev(&window);
        let width = deviation * self.config.band_multiplier;
        let (upper_band, lower_band) = (vwap + width, vwap - width);

        let crossed = match self.excursion {
            Some(Excursion::Above) if bar.close < vwap => Some(Direction::Short),
            Some(Excursion::Below) if bar.close > vwap => Some(Direction::Long),
            _ => None,
        };
        if crossed.is_some() {
            self.excursion = None;
        }
        if deviation > 0.0 {
            if bar.close > upper_band {
                self.excursion = Some(Excursion::Above);
            } else if bar.close < lower_band {
                self.excursion = Some(Excursion::Below);
            }
        }

        self.snapshot = Some(VwapSnapshot {
            timestamp: bar.timestamp,
            vwap,
            deviation,
            upper_band,
            lower_band,
            close: bar.close,
            crossed,
        });
    }

    fn volume_ratio(&self, series: &PriceSeries) -> f64 {
        let current = match series.bar(0) {
            Some(b) => b.volume,
            None => return 1.0,
        };
        let baseline = series
            .average_volume(1, self.config.volume_period)
            .unwrap_or(0.0);
        safe_ratio(current, baseline, 1.0)
    }
}

impl PatternDetector for VwapBandDetector {
    fn id(&self) -> &str {
        "vwap_band"
    }

    fn warmup_bars(&self) -> usize {
        self.config.deviation_period
    }

    fn update(&mut self, series: &PriceSeries) -> Result<(), DetectorError> {
        let bar = match series.bar(0) {
            Some(b) => *b,
            None => return Ok(()),
        };
        match self.snapshot {
            Some(s) if s.timestamp == bar.timestamp => {}
            Some(_) => self.ingest(&bar),
            None => {
                let history: Vec<Bar> = series.iter_chronological().copied().collect();
                for b in &history {
                    self.ingest(b);
                }
            }
        }
        Ok(())
    }

    fn check_for_signal(&self, series: &PriceSeries) -> Result<Option<Signal>, DetectorError> {
        let snap = match (self.snapshot, series.bar(0)) {
            (Some(s), Some(b)) if s.timestamp == b.timestamp => s,
            _ => return Ok(None),
        };
        if self.deviations.len() < self.config.deviation_period.min(series.len()).max(2) {
            return Ok(None);
        }

        let z = snap.z_score();
        let volume_ratio = self.volume_ratio(series);
        let (direction, mut strength, kind) = if snap.deviation > 0.0 && snap.close > snap.upper_band {
            (Direction::Short, (z.abs() * 25.0).min(100.0), 0.0)
        } else if snap.deviation > 0.0 && snap.close < snap.lower_band {
            (Direction::Long, (z.abs() * 25.0).min(100.0), 0.0)
        } else if let Some(direction) = snap.crossed {
            (direction, 50.0 + volume_ratio * 10.0, 1.0)
        } else {
            return Ok(None);
        };

        if self.config.use_volume_adjust {
            strength *= if volume_ratio > 1.0 { 1.2 } else { 0.8 };
        }
        debug!(?direction, strength, z, "vwap band signal");

        Ok(Some(
            Signal::new(self.id(), direction, strength, snap.close)
                .with_meta("vwap", snap.vwap)
                .with_meta("upper_band", snap.upper_band)
                .with_meta("lower_band", snap.lower_band)
                .with_meta("z_score", z)
                .with_meta("continuation", kind),
        ))
    }

    fn calculate_stop_loss(
        &self,
        direction: Direction,
        series: &PriceSeries,
    ) -> Result<Option<f64>, DetectorError> {
        let bar = match series.bar(0) {
            Some(b) => b,
            None => return Ok(None),
        };
        let buffer = self.volatility.atr_or_zero(series) * self.config.stop_atr_buffer;
        Ok(Some(match direction {
            Direction::Long => bar.low - buffer,
            Direction::Short => bar.high + buffer,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series_of;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    fn estimator() -> VolatilityEstimator {
        VolatilityEstimator::new(3).unwrap()
    }

    fn flat(close: f64, volume: f64) -> (f64, f64, f64, f64, f64) {
        (close, close + 0.2, close - 0.2, close, volume)
    }

    /// Twenty bars oscillating around 100.
    fn ranging() -> Vec<(f64, f64, f64, f64, f64)> {
        (0..20)
            .map(|i| match i % 3 {
                0 => flat(100.0, 100.0),
                1 => flat(100.4, 100.0),
                _ => flat(99.6, 100.0),
            })
            .collect()
    }

    fn detector() -> VwapBandDetector {
        VwapBandDetector::new(VwapConfig::default(), estimator()).unwrap()
    }

    #[test]
    fn vwap_is_volume_weighted_typical_price() {
        let mut det = detector();
        let series = series_of(&[flat(100.0, 100.0), flat(103.0, 300.0)]);
        det.update(&series).unwrap();
        let snap = det.snapshot().unwrap();
        assert_approx(snap.vwap, (100.0 * 100.0 + 103.0 * 300.0) / 400.0, DEFAULT_EPSILON);
    }

    #[test]
    fn spike_above_band_is_short_reversion() {
        let mut det = detector();
        let mut bars = ranging();
        bars.push(flat(103.0, 100.0));
        let series = series_of(&bars);
        det.update(&series).unwrap();
        let snap = *det.snapshot().unwrap();
        assert!(snap.close > snap.upper_band);

        let sig = det.check_for_signal(&series).unwrap().expect("reversion");
        assert_eq!(sig.direction, Direction::Short);
        assert_approx(sig.strength, (snap.z_score().abs() * 25.0).min(100.0), 1e-9);
        assert_eq!(sig.metadata["continuation"], 0.0);
    }

    #[test]
    fn crossing_back_through_vwap_is_continuation() {
        let mut det = detector();
        let mut bars = ranging();
        bars.push(flat(103.0, 100.0));
        let mut series = series_of(&bars);
        det.update(&series).unwrap();

        let ts = series.bar(0).unwrap().timestamp + Duration::hours(1);
        series.push(Bar::new(ts, 99.6, 99.8, 99.4, 99.6, 100.0));
        det.update(&series).unwrap();
        let snap = *det.snapshot().unwrap();
        assert_eq!(snap.crossed, Some(Direction::Short));
        assert!(snap.close > snap.lower_band);

        let sig = det.check_for_signal(&series).unwrap().expect("continuation");
        assert_eq!(sig.direction, Direction::Short);
        assert_approx(sig.strength, 60.0, 1e-9);
        assert_eq!(sig.metadata["continuation"], 1.0);
    }

    /// Continuation strength after a spike and a cross on `cross_volume`.
    fn continuation_strength(config: VwapConfig, cross_volume: f64) -> f64 {
        let mut det = VwapBandDetector::new(config, estimator()).unwrap();
        let mut bars = ranging();
        bars.push(flat(103.0, 100.0));
        bars.push((99.6, 99.8, 99.4, 99.6, cross_volume));
        let series = series_of(&bars);
        det.update(&series).unwrap();
        let sig = det.check_for_signal(&series).unwrap().expect("continuation");
        assert_eq!(sig.metadata["continuation"], 1.0);
        sig.strength
    }

    #[test]
    fn volume_adjust_scales_strength() {
        let adjust = VwapConfig {
            use_volume_adjust: true,
            ..VwapConfig::default()
        };
        assert_approx(continuation_strength(VwapConfig::default(), 100.0), 60.0, 1e-9);
        // Average volume: ratio 1 is not above average.
        assert_approx(continuation_strength(adjust.clone(), 100.0), 48.0, 1e-9);
        // Triple volume: 50 + 3 × 10, then +20 %.
        assert_approx(continuation_strength(VwapConfig::default(), 300.0), 80.0, 1e-9);
        assert_approx(continuation_strength(adjust, 300.0), 96.0, 1e-9);
    }

    #[test]
    fn quiet_market_is_silent() {
        let mut det = detector();
        let series = series_of(&ranging());
        det.update(&series).unwrap();
        assert!(det.check_for_signal(&series).unwrap().is_none());
    }

    #[test]
    fn session_reset_restarts_accumulation() {
        let config = VwapConfig {
            session_reset: true,
            session_start_hour: 0,
            ..VwapConfig::default()
        };
        let mut det = VwapBandDetector::new(config, estimator()).unwrap();
        // 24 hourly bars on day one, then the first bar of day two.
        let mut bars: Vec<_> = (0..24).map(|_| flat(100.0, 100.0)).collect();
        bars.push(flat(110.0, 50.0));
        let series = series_of(&bars);
        det.update(&series).unwrap();
        assert_approx(det.snapshot().unwrap().vwap, 110.0, DEFAULT_EPSILON);
    }

    #[test]
    fn stop_sits_beyond_bar_extreme() {
        let mut det = detector();
        let series = series_of(&ranging());
        det.update(&series).unwrap();
        let bar = *series.bar(0).unwrap();
        let atr = estimator().atr(&series).unwrap();
        let long = det
            .calculate_stop_loss(Direction::Long, &series)
            .unwrap()
            .unwrap();
        assert_approx(long, bar.low - 0.5 * atr, DEFAULT_EPSILON);
        let short = det
            .calculate_stop_loss(Direction::Short, &series)
            .unwrap()
            .unwrap();
        assert_approx(short, bar.high + 0.5 * atr, DEFAULT_EPSILON);
    }

    #[test]
    fn rejects_invalid_config() {
        let config = VwapConfig {
            session_start_hour: 24,
            ..VwapConfig::default()
        };
        assert!(VwapBandDetector::new(config, estimator()).is_err());
    }
}
