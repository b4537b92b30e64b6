//! PatternLab Runner: concrete collaborators and replay orchestration.
//!
//! This crate builds on `patternlab-core` to provide:
//! - `TradeHistory`, the performance tracker that feeds sizing
//! - An in-memory trade store
//! - A paper broker that fills stops and targets bar by bar
//! - Pure performance metrics
//! - Monte Carlo drawdown estimation
//! - The replay runner and its configuration
//! - Tracing initialisation

pub mod config;
pub mod logging;
pub mod metrics;
pub mod monte_carlo;
pub mod paper;
pub mod replay;
pub mod store;
pub mod tracker;

pub use config::{ReplayConfig, RunnerConfig};
pub use logging::init_tracing;
pub use metrics::PerformanceMetrics;
pub use monte_carlo::{simulate_drawdown, McConfig, McError, McResult};
pub use paper::PaperBroker;
pub use replay::{run_replay, EventCounts, ReplayError, ReplayResult};
pub use store::MemoryTradeStore;
pub use tracker::TradeHistory;
