// Technical indicators module
// Session VWAP, rolling volatility and the bands built from them

pub mod bands;
pub mod moving_average;
pub mod vwap;

pub use bands::{compute_frames, latest_frame, validate_bars, IndicatorConfig};
pub use moving_average::{calculate_sma, calculate_std_dev, rolling_std_dev, StdDevEstimator};
pub use vwap::{calculate_session_vwap, SessionReset, VwapPoint};
