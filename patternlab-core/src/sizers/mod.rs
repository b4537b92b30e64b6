//! Position sizing: account risk, volatility and track record → lots.
//!
//! The sizer is signal-agnostic. It only sees the price distance to the stop
//! and the account/market context; detectors never touch its parameters.

pub mod kelly;
pub mod position_sizer;
pub mod risk;

pub use kelly::kelly_fraction;
pub use position_sizer::{PositionSizer, SizingBreakdown, SizingContext};
pub use risk::{LotConstraints, RiskParameters, SizingConfig, SizingError};
