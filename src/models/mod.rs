use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One minute OHLCV bar
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Volatility envelope around VWAP
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bands {
    pub std_dev: f64,
    pub upper: f64,
    pub lower: f64,
}

/// A bar augmented with session VWAP and volatility bands
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorFrame {
    pub bar: Bar,
    pub typical_price: f64,
    pub dollar_volume: f64,
    pub cumulative_dollar_volume: f64,
    pub cumulative_volume: f64,
    pub vwap: f64,
    /// `None` until the trailing close window is full
    pub bands: Option<Bands>,
}

impl IndicatorFrame {
    pub fn close(&self) -> f64 {
        self.bar.close
    }

    pub fn is_indeterminate(&self) -> bool {
        self.bands.is_none()
    }
}

/// Broker-reported position in the traded symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Position {
    Flat,
    /// Signed quantity: positive is long, negative is short
    Open { symbol: String, quantity: f64 },
}

impl Position {
    pub fn quantity(&self) -> f64 {
        match self {
            Position::Flat => 0.0,
            Position::Open { quantity, .. } => *quantity,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity() > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity() < 0.0
    }

    pub fn is_flat(&self) -> bool {
        self.quantity() == 0.0
    }
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Long,
    Short,
    Exit,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Long => write!(f, "LONG"),
            Signal::Short => write!(f, "SHORT"),
            Signal::Exit => write!(f, "EXIT"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
}

/// Market order request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub symbol: String,
    pub quantity: u32,
    pub side: OrderSide,
    pub time_in_force: TimeInForce,
}

impl Order {
    pub fn market(symbol: &str, quantity: u32, side: OrderSide) -> Self {
        Self {
            symbol: symbol.to_string(),
            quantity,
            side,
            time_in_force: TimeInForce::Day,
        }
    }
}

/// Broker acknowledgement for an order or a close request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderAck {
    pub id: String,
    pub status: String,
}

/// Exchange session state as reported by the broker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketClock {
    pub is_open: bool,
    pub next_open: DateTime<Utc>,
    pub next_close: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

impl MarketClock {
    /// Whole minutes until the next open, zero if already open
    pub fn minutes_to_open(&self) -> i64 {
        (self.next_open - self.timestamp).num_minutes().max(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub status: String,
    pub buying_power: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_typical_price() {
        let bar = Bar {
            timestamp: Utc::now(),
            open: 100.0,
            high: 103.0,
            low: 97.0,
            close: 103.0,
            volume: 10.0,
        };
        assert_eq!(bar.typical_price(), 101.0);
    }

    #[test]
    fn test_position_quantity() {
        assert_eq!(Position::Flat.quantity(), 0.0);
        assert!(Position::Flat.is_flat());

        let short = Position::Open {
            symbol: "SPY".to_string(),
            quantity: -3.0,
        };
        assert!(short.is_short());
        assert!(!short.is_long());
    }

    #[test]
    fn test_minutes_to_open() {
        let clock = MarketClock {
            is_open: false,
            next_open: Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap(),
            next_close: Utc.with_ymd_and_hms(2024, 3, 4, 21, 0, 0).unwrap(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 13, 0, 0).unwrap(),
        };
        assert_eq!(clock.minutes_to_open(), 90);
    }

    #[test]
    fn test_order_serializes_lowercase() {
        let order = Order::market("SPY", 1, OrderSide::Buy);
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["side"], "buy");
        assert_eq!(json["time_in_force"], "day");
    }
}
