use crate::error::InputError;
use crate::indicators::moving_average::{rolling_std_dev, StdDevEstimator};
use crate::indicators::vwap::{calculate_session_vwap, SessionReset};
use crate::models::{Bands, Bar, IndicatorFrame};

/// Parameters for the VWAP band calculation
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    /// Trailing close window for the standard deviation
    pub window: usize,

    /// Band width in standard deviations
    pub multiplier: f64,

    pub estimator: StdDevEstimator,

    pub session_reset: SessionReset,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            window: 20,
            multiplier: 2.0,
            estimator: StdDevEstimator::Sample,
            session_reset: SessionReset::UtcDate,
        }
    }
}

/// Check the series contract: non-empty, strictly ascending, sane values
pub fn validate_bars(bars: &[Bar]) -> Result<(), InputError> {
    if bars.is_empty() {
        return Err(InputError::EmptySeries);
    }

    for (index, bar) in bars.iter().enumerate() {
        let prices = [bar.open, bar.high, bar.low, bar.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(InputError::InvalidBar {
                index,
                reason: "non-finite price".to_string(),
            });
        }
        if !bar.volume.is_finite() || bar.volume < 0.0 {
            return Err(InputError::InvalidBar {
                index,
                reason: format!("invalid volume {}", bar.volume),
            });
        }
        if bar.high < bar.low {
            return Err(InputError::InvalidBar {
                index,
                reason: format!("high {} below low {}", bar.high, bar.low),
            });
        }
    }

    if let Some(pos) = bars.windows(2).position(|w| w[1].timestamp <= w[0].timestamp) {
        return Err(InputError::NotAscending { index: pos + 1 });
    }

    Ok(())
}

/// Augment a bar series with session VWAP and volatility bands
///
/// VWAP restarts at each session boundary; the standard deviation of closes runs
/// across the whole series. Frames whose window is not yet full carry no bands.
pub fn compute_frames(bars: &[Bar], config: &IndicatorConfig) -> Result<Vec<IndicatorFrame>, InputError> {
    validate_bars(bars)?;

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let std_devs = rolling_std_dev(&closes, config.window, config.estimator);
    let vwaps = calculate_session_vwap(bars, config.session_reset);

    let frames = bars
        .iter()
        .zip(vwaps)
        .zip(std_devs)
        .map(|((bar, point), std_dev)| IndicatorFrame {
            bar: bar.clone(),
            typical_price: point.typical_price,
            dollar_volume: point.dollar_volume,
            cumulative_dollar_volume: point.cumulative_dollar_volume,
            cumulative_volume: point.cumulative_volume,
            vwap: point.vwap,
            bands: std_dev.map(|sd| Bands {
                std_dev: sd,
                upper: point.vwap + config.multiplier * sd,
                lower: point.vwap - config.multiplier * sd,
            }),
        })
        .collect();

    Ok(frames)
}

/// Most recent frame of the series
pub fn latest_frame(bars: &[Bar], config: &IndicatorConfig) -> Result<IndicatorFrame, InputError> {
    compute_frames(bars, config)?
        .pop()
        .ok_or(InputError::EmptySeries)
}
