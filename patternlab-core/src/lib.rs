//! PatternLab Core: price series, pattern detectors, signal aggregation, sizing.
//!
//! This crate contains the decision-making half of the trading system:
//! - Domain types (bars, the rolling price series, pattern instances, trades)
//! - Volatility and statistics helpers
//! - Pattern detectors behind one trait, plus the chandelier trailing exit
//! - Signal aggregation (strongest wins, stop resolved by the winner)
//! - Position sizing with Kelly, volatility, and drawdown adjustments
//! - The bar-driven trading engine and its broker/storage ports

pub mod components;
pub mod config;
pub mod domain;
pub mod engine;
pub mod fingerprint;
pub mod indicators;
pub mod sizers;
