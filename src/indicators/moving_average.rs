use serde::{Deserialize, Serialize};

/// Divisor used for the rolling standard deviation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StdDevEstimator {
    /// n - 1 degrees of freedom
    #[default]
    Sample,
    /// n degrees of freedom
    Population,
}

/// Calculate Simple Moving Average (SMA) over the last `period` values
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Standard deviation of the last `period` values
pub fn calculate_std_dev(prices: &[f64], period: usize, estimator: StdDevEstimator) -> Option<f64> {
    let divisor = match estimator {
        StdDevEstimator::Sample if period < 2 => return None,
        StdDevEstimator::Sample => (period - 1) as f64,
        StdDevEstimator::Population => period as f64,
    };

    let mean = calculate_sma(prices, period)?;
    let sum_sq: f64 = prices
        .iter()
        .rev()
        .take(period)
        .map(|p| (p - mean).powi(2))
        .sum();

    Some((sum_sq / divisor).sqrt())
}

/// Trailing standard deviation at every index
///
/// Entries before the window fills are `None`.
pub fn rolling_std_dev(prices: &[f64], period: usize, estimator: StdDevEstimator) -> Vec<Option<f64>> {
    (0..prices.len())
        .map(|i| calculate_std_dev(&prices[..=i], period, estimator))
        .collect()
}
