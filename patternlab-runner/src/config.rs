//! Replay configuration: the engine sections plus `[replay]` and `[monte_carlo]`.
//!
//! The engine's own sections (`[engine]`, `[fvg]`, `[sizing]`, ...) sit at the
//! top level, so any engine config file is also a valid runner config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use patternlab_core::config::{ConfigError, EngineConfig};

use crate::monte_carlo::McConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub initial_balance: f64,
    /// Re-estimate drawdown by Monte Carlo and refresh sizing after every
    /// `refresh_every` closed trades; 0 disables.
    pub refresh_every: usize,
    /// Close a still-open position at the last bar's close.
    pub close_open_at_end: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            refresh_every: 0,
            close_open_at_end: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,
    pub replay: ReplayConfig,
    pub monte_carlo: McConfig,
}

impl RunnerConfig {
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

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.replay.initial_balance.is_nan() || self.replay.initial_balance <= 0.0 {
            return Err(ConfigError::Invalid(
                "replay.initial_balance must be > 0".into(),
            ));
        }
        self.monte_carlo
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
