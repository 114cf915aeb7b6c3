// Broker and market data collaborator
pub mod alpaca;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Account, Bar, MarketClock, Order, OrderAck, Position};

pub use alpaca::{AlpacaClient, AlpacaConfig};

/// Errors reported by a broker adapter
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The requested position does not exist
    #[error("not found")]
    NotFound,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl BrokerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BrokerError::NotFound)
    }
}

/// Operations the trading loop needs from a brokerage account
#[async_trait]
pub trait Broker: Send + Sync {
    /// Minute bars from `start` until now, ascending
    async fn get_bars(&self, symbol: &str, start: DateTime<Utc>) -> Result<Vec<Bar>, BrokerError>;

    /// Open position in `symbol`, `BrokerError::NotFound` when flat
    async fn get_open_position(&self, symbol: &str) -> Result<Position, BrokerError>;

    async fn submit_market_order(&self, order: &Order) -> Result<OrderAck, BrokerError>;

    /// Liquidate the whole position, `BrokerError::NotFound` when there is none
    async fn close_position(&self, symbol: &str) -> Result<OrderAck, BrokerError>;

    async fn get_market_clock(&self) -> Result<MarketClock, BrokerError>;

    async fn get_account(&self) -> Result<Account, BrokerError>;
}
