use std::sync::Arc;

use crate::broker::{Broker, BrokerError};
use crate::error::BotError;
use crate::models::Position;
use crate::Result;

/// Reads the authoritative position from the broker on every call
///
/// Nothing is cached: manual trades and partial fills must show up on the next cycle.
#[derive(Clone)]
pub struct PositionTracker {
    broker: Arc<dyn Broker>,
}

impl PositionTracker {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Current position, `Position::Flat` when the broker has none
    pub async fn current_position(&self, symbol: &str) -> Result<Position> {
        match self.broker.get_open_position(symbol).await {
            Ok(position) => Ok(position),
            Err(BrokerError::NotFound) => Ok(Position::Flat),
            Err(e) => Err(BotError::PositionQuery(e)),
        }
    }

    /// Signed quantity: positive long, negative short, zero flat
    pub async fn current_quantity(&self, symbol: &str) -> Result<f64> {
        Ok(self.current_position(symbol).await?.quantity())
    }
}
