// Trading strategy module
pub mod vwap_reversion;

use crate::models::{IndicatorFrame, Position, Signal};

pub use vwap_reversion::VwapReversionStrategy;

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Decide on the latest frame given the current position
    ///
    /// Returns `None` when the frame cannot support a decision.
    fn generate_signal(&self, frame: &IndicatorFrame, position: &Position) -> Option<Signal>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum bars required before a frame can be decided on
    fn min_bars_required(&self) -> usize;
}
