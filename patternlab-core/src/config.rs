//! Engine configuration, loaded from TOML.
//!
//! One section per component. Every field carries a serde default equal to
//! its documented default, so an empty document is a complete config:
//!
//! ```toml
//! [engine]
//! symbol = "EURUSD"
//! reward_risk_ratio = 2.0
//! detectors = ["smart_money", "fair_value_gap", "pin_bar", "vwap_band"]
//!
//! [volatility]
//! atr_period = 14
//!
//! [fvg]
//! min_gap_factor = 0.5
//! use_statistical_test = true
//!
//! [sizing]
//! risk_percent_per_trade = 1.0
//! contract_size = 100000.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::factory::DETECTOR_NAMES;
use crate::components::signal::{FvgConfig, PinBarConfig, SmartMoneyConfig, VwapConfig};
use crate::components::trailing::ChandelierConfig;
use crate::domain::ConfigHash;
use crate::fingerprint::config_fingerprint;
use crate::sizers::SizingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub symbol: String,
    /// Take-profit distance as a multiple of the stop distance.
    pub reward_risk_ratio: f64,
    /// Enabled detectors, in registration (tie-break) order.
    pub detectors: Vec<String>,
    /// Bars kept in the rolling series.
    pub series_capacity: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            symbol: "EURUSD".to_string(),
            reward_risk_ratio: 2.0,
            detectors: vec![
                "smart_money".to_string(),
                "fair_value_gap".to_string(),
                "pin_bar".to_string(),
                "vwap_band".to_string(),
            ],
            series_capacity: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    /// ATR period shared by every detector and the sizer.
    pub atr_period: usize,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self { atr_period: 14 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSection,
    pub volatility: VolatilityConfig,
    pub pin_bar: PinBarConfig,
    pub fvg: FvgConfig,
    pub chandelier: ChandelierConfig,
    pub vwap: VwapConfig,
    pub smart_money: SmartMoneyConfig,
    pub sizing: SizingConfig,
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Check every section; the first problem found is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |e: &dyn std::fmt::Display| ConfigError::Invalid(e.to_string());

        if self.engine.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("engine.symbol must not be empty".into()));
        }
        if self.engine.reward_risk_ratio.is_nan() || self.engine.reward_risk_ratio <= 0.0 {
            return Err(ConfigError::Invalid(
                "engine.reward_risk_ratio must be > 0".into(),
            ));
        }
        if self.engine.series_capacity < 10 {
            return Err(ConfigError::Invalid(
                "engine.series_capacity must be >= 10".into(),
            ));
        }
        for name in &self.engine.detectors {
            if !DETECTOR_NAMES.contains(&name.as_str()) {
                return Err(ConfigError::Invalid(format!("unknown detector: {name}")));
            }
        }
        if self.volatility.atr_period == 0 {
            return Err(ConfigError::Invalid(
                "volatility.atr_period must be >= 1".into(),
            ));
        }

        self.pin_bar.validate().map_err(|e| invalid(&e))?;
        self.fvg.validate().map_err(|e| invalid(&e))?;
        self.chandelier.validate().map_err(|e| invalid(&e))?;
        self.vwap.validate().map_err(|e| invalid(&e))?;
        self.smart_money.validate().map_err(|e| invalid(&e))?;
        self.sizing.validate().map_err(|e| invalid(&e))?;
        Ok(())
    }

    /// Stable identity of this parameter set.
    pub fn fingerprint(&self) -> Result<ConfigHash, ConfigError> {
        config_fingerprint(self)
    }
}
