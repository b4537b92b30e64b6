//! Detection and trade-management components.
//!
//! - [`signal`]: the pattern detector family behind one trait
//! - [`aggregator`]: picks the strongest signal per bar and resolves its stop
//! - [`trailing`]: chandelier exit with the stop ratchet
//! - [`factory`]: builds detectors from configuration

pub mod aggregator;
pub mod factory;
pub mod signal;
pub mod trailing;

pub use aggregator::{AggregatedSignal, SignalAggregator};
pub use factory::{build_aggregator, create_detector, FactoryError};
pub use signal::{DetectorError, PatternDetector, Signal};
pub use trailing::{ChandelierExit, RatchetState, TrailingStop};
