use crate::models::{IndicatorFrame, Position, Signal};
use crate::strategy::Strategy;

/// VWAP band mean reversion strategy
///
/// Fades moves outside the volatility bands and exits once price returns to VWAP.
///
/// Entry:
/// - Close below the lower band opens a long
/// - Close above the upper band opens a short
///
/// Exit (overrides entry on the same bar):
/// - Long position and close at or above VWAP
/// - Short position and close at or below VWAP
///
/// An entry in the direction already held is suppressed to Hold.
#[derive(Debug, Clone)]
pub struct VwapReversionStrategy {
    window: usize,
}

impl VwapReversionStrategy {
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl Default for VwapReversionStrategy {
    fn default() -> Self {
        Self::new(20)
    }
}

impl Strategy for VwapReversionStrategy {
    fn generate_signal(&self, frame: &IndicatorFrame, position: &Position) -> Option<Signal> {
        let bands = frame.bands?;
        let close = frame.close();
        let quantity = position.quantity();

        let entry = if close < bands.lower {
            Signal::Long
        } else if close > bands.upper {
            Signal::Short
        } else {
            Signal::Hold
        };

        let exit = (quantity > 0.0 && close >= frame.vwap) || (quantity < 0.0 && close <= frame.vwap);

        let signal = match entry {
            _ if exit => Signal::Exit,
            Signal::Long if quantity > 0.0 => Signal::Hold,
            Signal::Short if quantity < 0.0 => Signal::Hold,
            other => other,
        };

        tracing::debug!(
            "VWAP reversion: close={:.2} vwap={:.2} lower={:.2} upper={:.2} qty={} entry={} -> {}",
            close,
            frame.vwap,
            bands.lower,
            bands.upper,
            quantity,
            entry,
            signal
        );

        Some(signal)
    }

    fn name(&self) -> &str {
        "VWAP Reversion"
    }

    fn min_bars_required(&self) -> usize {
        self.window
    }
}
