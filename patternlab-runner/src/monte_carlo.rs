//! Monte Carlo drawdown estimation from a trade history.
//!
//! Resamples realised R-multiples with replacement into synthetic trade
//! sequences, compounds each at a fixed risk per trade, and reports the
//! distribution of maximum drawdowns. The p95 figure is what the sizer's
//! drawdown throttle consumes as `expected_max_drawdown`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McConfig {
    /// Number of synthetic sequences.
    pub simulations: usize,
    /// Trades per sequence; 0 uses the history length.
    pub trades_per_simulation: usize,
    /// Percent of balance risked per trade (1R).
    pub risk_percent: f64,
    /// A sequence whose drawdown reaches this percent counts as ruin.
    pub ruin_threshold_pct: f64,
    /// RNG seed for reproducibility.
    pub seed: u64,
}

impl Default for McConfig {
    fn default() -> Self {
        Self {
            simulations: 1000,
            trades_per_simulation: 0,
            risk_percent: 1.0,
            ruin_threshold_pct: 50.0,
            seed: 42,
        }
    }
}

impl McConfig {
    pub fn validate(&self) -> Result<(), McError> {
        if self.simulations == 0 {
            return Err(McError::InvalidConfig("simulations must be >= 1".into()));
        }
        if self.risk_percent.is_nan() || self.risk_percent <= 0.0 || self.risk_percent >= 100.0 {
            return Err(McError::InvalidConfig(
                "risk_percent must be in (0, 100)".into(),
            ));
        }
        if self.ruin_threshold_pct.is_nan()
            || self.ruin_threshold_pct <= 0.0
            || self.ruin_threshold_pct > 100.0
        {
            return Err(McError::InvalidConfig(
                "ruin_threshold_pct must be in (0, 100]".into(),
            ));
        }
        Ok(())
    }
}

// ─── Result types ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McResult {
    pub simulations: usize,
    pub trades_per_simulation: usize,
    /// Max drawdowns in percent, one per simulation, sorted ascending.
    pub drawdowns: Vec<f64>,
    pub mean_max_drawdown: f64,
    pub median_max_drawdown: f64,
    pub p95_max_drawdown: f64,
    pub worst_max_drawdown: f64,
    /// Fraction of sequences that reached the ruin threshold.
    pub ruin_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum McError {
    #[error("no closed trades to resample")]
    NoTrades,
    #[error("invalid Monte Carlo config: {0}")]
    InvalidConfig(String),
}

// ─── Simulation ──────────────────────────────────────────────────────

/// Bootstrap the drawdown distribution of `r_multiples`.
///
/// Non-finite R values are dropped before resampling.
pub fn simulate_drawdown(r_multiples: &[f64], config: &McConfig) -> Result<McResult, McError> {
    config.validate()?;
    let pool: Vec<f64> = r_multiples.iter().copied().filter(|r| r.is_finite()).collect();
    if pool.is_empty() {
        return Err(McError::NoTrades);
    }

    let length = if config.trades_per_simulation == 0 {
        pool.len()
    } else {
        config.trades_per_simulation
    };
    let risk = config.risk_percent / 100.0;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut drawdowns = Vec::with_capacity(config.simulations);
    for _ in 0..config.simulations {
        let mut balance = 1.0_f64;
        let mut peak = 1.0_f64;
        let mut max_dd = 0.0_f64;
        for _ in 0..length {
            let r = pool[rng.gen_range(0..pool.len())];
            balance = (balance * (1.0 + r * risk)).max(0.0);
            peak = peak.max(balance);
            if peak > 0.0 {
                max_dd = max_dd.max((peak - balance) / peak * 100.0);
            }
        }
        drawdowns.push(max_dd);
    }
    drawdowns.sort_by(|a, b| a.total_cmp(b));

    let n = drawdowns.len();
    let ruined = drawdowns
        .iter()
        .filter(|&&dd| dd >= config.ruin_threshold_pct)
        .count();
    Ok(McResult {
        simulations: n,
        trades_per_simulation: length,
        mean_max_drawdown: drawdowns.iter().sum::<f64>() / n as f64,
        median_max_drawdown: percentile(&drawdowns, 0.50),
        p95_max_drawdown: percentile(&drawdowns, 0.95),
        worst_max_drawdown: drawdowns[n - 1],
        ruin_probability: ruined as f64 / n as f64,
        drawdowns,
    })
}

/// Nearest-rank percentile of an ascending, non-empty slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
