//! Run fingerprinting: deterministic identification of configurations and data.
//!
//! - `config_fingerprint`: exact identity (every parameter value).
//! - `detector_set_fingerprint`: structural identity (enabled detectors in
//!   order, no parameter values), for grouping runs.
//! - `dataset_fingerprint`: identity of the bar data a run consumed.
//! - `RunFingerprint`: the complete record attached to a replay result.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, EngineConfig};
use crate::domain::{Bar, ConfigHash};

/// BLAKE3 over the canonical JSON form of the config.
///
/// Struct fields serialize in declaration order and the config holds no
/// unordered maps, so equal configs always hash equally.
pub fn config_fingerprint(config: &EngineConfig) -> Result<ConfigHash, ConfigError> {
    let json = serde_json::to_string(config).map_err(|e| ConfigError::Serialize(e.to_string()))?;
    Ok(ConfigHash::from_bytes(json.as_bytes()))
}

/// Hash of the enabled detector list only.
pub fn detector_set_fingerprint(config: &EngineConfig) -> ConfigHash {
    ConfigHash::from_bytes(config.engine.detectors.join("+").as_bytes())
}

/// Hash of the bars' timestamps and OHLCV values.
pub fn dataset_fingerprint(bars: &[Bar]) -> ConfigHash {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(bar.timestamp.to_string().as_bytes());
        for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
            hasher.update(&v.to_le_bytes());
        }
    }
    ConfigHash(hasher.finalize().to_hex().to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFingerprint {
    // ── Identity ──
    pub schema_version: u32,
    pub symbol: String,

    // ── Data ──
    pub bar_count: usize,
    pub first_bar: Option<NaiveDateTime>,
    pub last_bar: Option<NaiveDateTime>,
    pub dataset_hash: ConfigHash,

    // ── Configuration ──
    pub config_hash: ConfigHash,
    pub detector_set_hash: ConfigHash,
}

impl RunFingerprint {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn new(config: &EngineConfig, bars: &[Bar]) -> Result<Self, ConfigError> {
        Ok(Self {
            schema_version: Self::SCHEMA_VERSION,
            symbol: config.engine.symbol.clone(),
            bar_count: bars.len(),
            first_bar: bars.first().map(|b| b.timestamp),
            last_bar: bars.last().map(|b| b.timestamp),
            dataset_hash: dataset_fingerprint(bars),
            config_hash: config_fingerprint(config)?,
            detector_set_hash: detector_set_fingerprint(config),
        })
    }
}
