use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::models::Bar;

/// When the cumulative VWAP sums start over
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum SessionReset {
    /// Reset whenever the UTC calendar date changes
    #[default]
    UtcDate,
    /// Reset whenever the calendar date changes in the exchange timezone
    ExchangeDate(Tz),
    /// Anchor at the first bar and never reset
    Never,
}

impl SessionReset {
    /// Session key for a bar timestamp; bars with equal keys share a VWAP
    pub fn session_of(&self, timestamp: DateTime<Utc>) -> Option<NaiveDate> {
        match self {
            SessionReset::UtcDate => Some(timestamp.date_naive()),
            SessionReset::ExchangeDate(tz) => Some(timestamp.with_timezone(tz).date_naive()),
            SessionReset::Never => None,
        }
    }
}

/// Running VWAP state at one bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VwapPoint {
    pub typical_price: f64,
    pub dollar_volume: f64,
    pub cumulative_dollar_volume: f64,
    pub cumulative_volume: f64,
    pub vwap: f64,
}

/// Session-anchored VWAP for every bar
///
/// Bars must already be sorted ascending. While a session has seen no volume the
/// VWAP falls back to the bar's typical price.
pub fn calculate_session_vwap(bars: &[Bar], reset: SessionReset) -> Vec<VwapPoint> {
    let mut points = Vec::with_capacity(bars.len());
    let mut current_session = None;
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        let session = reset.session_of(bar.timestamp);
        if i == 0 || session != current_session {
            current_session = session;
            cum_pv = 0.0;
            cum_vol = 0.0;
        }

        let typical_price = bar.typical_price();
        let dollar_volume = typical_price * bar.volume;
        cum_pv += dollar_volume;
        cum_vol += bar.volume;

        let vwap = if cum_vol > 0.0 {
            cum_pv / cum_vol
        } else {
            typical_price
        };

        points.push(VwapPoint {
            typical_price,
            dollar_volume,
            cumulative_dollar_volume: cum_pv,
            cumulative_volume: cum_vol,
            vwap,
        });
    }

    points
}
