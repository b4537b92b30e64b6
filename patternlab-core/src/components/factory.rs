//! Factory system: converts `EngineConfig` sections into runtime detectors.
//!
//! Detectors are selected by name from `[engine].detectors`; the list order
//! becomes the aggregator's registration (tie-break) order.

use crate::config::EngineConfig;
use crate::indicators::{IndicatorError, VolatilityEstimator};

use super::aggregator::SignalAggregator;
use super::signal::{
    DetectorError, FairValueGapDetector, PatternDetector, PinBarDetector, SmartMoneyDetector,
    VwapBandDetector,
};
use super::trailing::ChandelierExit;

// ─── Error type ──────────────────────────────────────────────────────

/// Errors that can occur during detector construction.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("Unknown detector type: {0}")]
    UnknownDetector(String),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
}

/// Every name `create_detector` understands.
pub const DETECTOR_NAMES: &[&str] = &[
    "pin_bar",
    "fair_value_gap",
    "vwap_band",
    "smart_money",
    "chandelier",
];

// ─── Detector factory ────────────────────────────────────────────────

/// Create one detector from its config section.
pub fn create_detector(
    name: &str,
    config: &EngineConfig,
) -> Result<Box<dyn PatternDetector>, FactoryError> {
    let volatility = VolatilityEstimator::new(config.volatility.atr_period)?;
    match name {
        "pin_bar" => Ok(Box::new(PinBarDetector::new(
            config.pin_bar.clone(),
            volatility,
        )?)),
        "fair_value_gap" => Ok(Box::new(FairValueGapDetector::new(
            config.fvg.clone(),
            volatility,
        )?)),
        "vwap_band" => Ok(Box::new(VwapBandDetector::new(
            config.vwap.clone(),
            volatility,
        )?)),
        "smart_money" => Ok(Box::new(SmartMoneyDetector::new(
            config.smart_money.clone(),
            volatility,
        )?)),
        "chandelier" => Ok(Box::new(ChandelierExit::new(config.chandelier.clone())?)),
        other => Err(FactoryError::UnknownDetector(other.to_string())),
    }
}

/// Build an aggregator with every enabled detector, in configured order.
pub fn build_aggregator(config: &EngineConfig) -> Result<SignalAggregator, FactoryError> {
    let mut aggregator = SignalAggregator::new();
    for name in &config.engine.detectors {
        aggregator.register(create_detector(name, config)?);
    }
    Ok(aggregator)
}

// ─── Tests ───────────────────────────────────────────────────────────
