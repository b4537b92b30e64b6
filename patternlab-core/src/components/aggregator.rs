//! Signal aggregation across registered detectors.
//!
//! One `cycle` per new bar: every detector is updated against the same
//! series snapshot, then queried. The strictly strongest signal wins, so on
//! equal strength the detector registered first keeps the slot. A detector
//! that errors counts as "no signal" for the cycle and never halts the others.

use tracing::{debug, warn};

use crate::domain::{Direction, PriceSeries};

use super::signal::{PatternDetector, Signal};

/// Winning signal with its stop resolved through the originating detector.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedSignal {
    pub signal: Signal,
    pub entry: f64,
    pub stop_loss: f64,
}

impl AggregatedSignal {
    pub fn direction(&self) -> Direction {
        self.signal.direction
    }

    /// |entry − stop|, the price distance at risk per unit.
    pub fn risk_per_unit(&self) -> f64 {
        (self.entry - self.stop_loss).abs()
    }

    /// Target placed `reward_risk_ratio` risk-distances beyond entry.
    pub fn take_profit(&self, reward_risk_ratio: f64) -> f64 {
        self.entry + self.direction().sign() * self.risk_per_unit() * reward_risk_ratio
    }
}

/// True if `stop` sits on the losing side of `entry` for `direction`.
pub fn stop_on_correct_side(direction: Direction, entry: f64, stop: f64) -> bool {
    stop.is_finite()
        && match direction {
            Direction::Long => stop < entry,
            Direction::Short => stop > entry,
        }
}

#[derive(Default)]
pub struct SignalAggregator {
    detectors: Vec<Box<dyn PatternDetector>>,
}

impl SignalAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a detector. Registration order is the tie-break order.
    pub fn register(&mut self, detector: Box<dyn PatternDetector>) {
        self.detectors.push(detector);
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Detector ids in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.id()).collect()
    }

    /// Bars needed before every registered detector is warmed up.
    pub fn warmup_bars(&self) -> usize {
        self.detectors
            .iter()
            .map(|d| d.warmup_bars())
            .max()
            .unwrap_or(0)
    }

    /// Run one aggregation cycle for the newest bar in `series`.
    pub fn cycle(&mut self, series: &PriceSeries) -> Option<AggregatedSignal> {
        for detector in &mut self.detectors {
            if let Err(e) = detector.update(series) {
                warn!(detector = %detector.id(), error = %e, "detector update failed");
            }
        }

        let mut best: Option<(usize, Signal)> = None;
        for (idx, detector) in self.detectors.iter().enumerate() {
            let signal = match detector.check_for_signal(series) {
                Ok(Some(signal)) => signal,
                Ok(None) => continue,
                Err(e) => {
                    warn!(detector = %detector.id(), error = %e, "detector check failed");
                    continue;
                }
            };
            debug!(
                detector = %detector.id(),
                direction = ?signal.direction,
                strength = signal.strength,
                "candidate signal"
            );
            let stronger = best
                .as_ref()
                .map_or(true, |(_, b)| signal.strength > b.strength);
            if stronger {
                best = Some((idx, signal));
            }
        }

        let (idx, mut signal) = best?;
        let detector = &self.detectors[idx];
        let stop = match detector.calculate_stop_loss(signal.direction, series) {
            Ok(Some(stop)) => stop,
            Ok(None) => {
                debug!(detector = %detector.id(), "winning signal has no stop, skipped");
                return None;
            }
            Err(e) => {
                warn!(detector = %detector.id(), error = %e, "stop-loss resolution failed");
                return None;
            }
        };
        if !stop_on_correct_side(signal.direction, signal.reference_price, stop) {
            debug!(
                detector = %detector.id(),
                entry = signal.reference_price,
                stop,
                "stop on wrong side of entry, skipped"
            );
            return None;
        }

        signal.suggested_stop_loss = Some(stop);
        Some(AggregatedSignal {
            entry: signal.reference_price,
            stop_loss: stop,
            signal,
        })
    }
}
