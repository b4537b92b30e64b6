//! Risk parameters and broker lot constraints.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingError {
    #[error("invalid sizing parameter: {0}")]
    InvalidParameter(&'static str),
}

/// Inputs to the sizing chain.
///
/// Set from configuration at startup; the statistical fields (`win_rate`,
/// `win_loss_ratio`, `system_expectancy`, `max_drawdown_percent`) are
/// refreshed between cycles from the performance tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParameters {
    pub risk_percent_per_trade: f64,
    /// Largest volume ever returned, in lots.
    pub max_position_size: f64,
    /// Smallest non-zero volume, in lots.
    pub min_position_size: f64,

    pub use_volatility_adjust: bool,
    /// Reference ATR; the volatility factor is `baseline_atr / current_atr`.
    pub baseline_atr: f64,

    pub use_kelly_criterion: bool,
    pub win_rate: f64,
    pub win_loss_ratio: f64,
    pub kelly_cap: f64,

    pub use_drawdown_throttle: bool,
    /// Mean R-multiple of the system.
    pub system_expectancy: f64,
    /// Expected maximum drawdown, in percent.
    pub max_drawdown_percent: f64,
    pub drawdown_threshold_pct: f64,
    pub expectancy_boost_factor: f64,
    pub max_expectancy_boost: f64,

    /// Closed trades required before refreshed statistics replace the
    /// configured ones.
    pub min_trades_for_refresh: usize,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            risk_percent_per_trade: 1.0,
            max_position_size: 100.0,
            min_position_size: 0.01,
            use_volatility_adjust: false,
            baseline_atr: 0.0,
            use_kelly_criterion: false,
            win_rate: 0.5,
            win_loss_ratio: 1.0,
            kelly_cap: 0.25,
            use_drawdown_throttle: false,
            system_expectancy: 0.0,
            max_drawdown_percent: 0.0,
            drawdown_threshold_pct: 20.0,
            expectancy_boost_factor: 0.5,
            max_expectancy_boost: 1.5,
            min_trades_for_refresh: 20,
        }
    }
}

impl RiskParameters {
    pub fn validate(&self) -> Result<(), SizingError> {
        let risk = self.risk_percent_per_trade;
        if risk.is_nan() || risk <= 0.0 || risk > 100.0 {
            return Err(SizingError::InvalidParameter(
                "risk_percent_per_trade must be in (0, 100]",
            ));
        }
        if self.min_position_size.is_nan() || self.min_position_size < 0.0 {
            return Err(SizingError::InvalidParameter("min_position_size must be >= 0"));
        }
        let max = self.max_position_size;
        if max.is_nan() || max <= 0.0 || max < self.min_position_size {
            return Err(SizingError::InvalidParameter(
                "max_position_size must be > 0 and >= min_position_size",
            ));
        }
        if !(0.0..=1.0).contains(&self.kelly_cap) {
            return Err(SizingError::InvalidParameter("kelly_cap must be in [0, 1]"));
        }
        if self.drawdown_threshold_pct.is_nan() || self.drawdown_threshold_pct <= 0.0 {
            return Err(SizingError::InvalidParameter("drawdown_threshold_pct must be > 0"));
        }
        if self.max_expectancy_boost.is_nan() || self.max_expectancy_boost < 1.0 {
            return Err(SizingError::InvalidParameter("max_expectancy_boost must be >= 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LotConstraints {
    /// Volumes are floored to a multiple of this.
    pub lot_step: f64,
    /// Units per lot.
    pub contract_size: f64,
}

impl Default for LotConstraints {
    fn default() -> Self {
        Self {
            lot_step: 0.01,
            contract_size: 1.0,
        }
    }
}

impl LotConstraints {
    pub fn validate(&self) -> Result<(), SizingError> {
        if self.lot_step.is_nan() || self.lot_step <= 0.0 {
            return Err(SizingError::InvalidParameter("lot_step must be > 0"));
        }
        if self.contract_size.is_nan() || self.contract_size <= 0.0 {
            return Err(SizingError::InvalidParameter("contract_size must be > 0"));
        }
        Ok(())
    }

    /// Floor `lots` to a whole number of steps, tolerating float noise just
    /// below a step boundary.
    pub fn floor_to_step(&self, lots: f64) -> f64 {
        let steps = (lots / self.lot_step + 1e-9).floor();
        steps * self.lot_step
    }
}

/// The `[sizing]` configuration section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    #[serde(flatten)]
    pub risk: RiskParameters,
    #[serde(flatten)]
    pub lots: LotConstraints,
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), SizingError> {
        self.risk.validate()?;
        self.lots.validate()
    }
}
