//! Scripted in-memory broker for unit tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{Broker, BrokerError};
use crate::models::{Account, Bar, MarketClock, Order, OrderAck, Position};

/// A single recorded broker interaction
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetBars { symbol: String, start: DateTime<Utc> },
    GetOpenPosition(String),
    SubmitOrder(Order),
    ClosePosition(String),
    GetClock,
    GetAccount,
}

/// Canned failure for one operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Failure {
    NotFound,
    Api(u16),
}

impl Failure {
    fn to_error(self) -> BrokerError {
        match self {
            Failure::NotFound => BrokerError::NotFound,
            Failure::Api(status) => BrokerError::Api {
                status,
                message: "scripted failure".to_string(),
            },
        }
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    bars: VecDeque<Vec<Bar>>,
    position: Option<f64>,
    clock_open: bool,
    bars_failure: Option<Failure>,
    position_failure: Option<Failure>,
    order_failure: Option<Failure>,
    close_failure: Option<Failure>,
}

/// Broker double that records every call and simulates fills
///
/// Orders fill immediately against the tracked position; closing flattens it.
pub struct MockBroker {
    state: Mutex<MockState>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                clock_open: true,
                ..Default::default()
            }),
        }
    }

    pub fn with_position(self, quantity: f64) -> Self {
        self.state.lock().unwrap().position = Some(quantity);
        self
    }

    pub fn with_market_open(self, open: bool) -> Self {
        self.state.lock().unwrap().clock_open = open;
        self
    }

    /// Queue a bar series for the next `get_bars` call; the last one repeats
    pub fn push_bars(&self, bars: Vec<Bar>) {
        self.state.lock().unwrap().bars.push_back(bars);
    }

    pub fn fail_bars(&self, failure: Failure) {
        self.state.lock().unwrap().bars_failure = Some(failure);
    }

    pub fn fail_position(&self, failure: Failure) {
        self.state.lock().unwrap().position_failure = Some(failure);
    }

    pub fn fail_orders(&self, failure: Failure) {
        self.state.lock().unwrap().order_failure = Some(failure);
    }

    pub fn fail_close(&self, failure: Failure) {
        self.state.lock().unwrap().close_failure = Some(failure);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn orders(&self) -> Vec<Order> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SubmitOrder(order) => Some(order),
                _ => None,
            })
            .collect()
    }

    pub fn position_quantity(&self) -> f64 {
        self.state.lock().unwrap().position.unwrap_or(0.0)
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn get_bars(&self, symbol: &str, start: DateTime<Utc>) -> Result<Vec<Bar>, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetBars {
            symbol: symbol.to_string(),
            start,
        });
        if let Some(failure) = state.bars_failure {
            return Err(failure.to_error());
        }
        let bars = if state.bars.len() > 1 {
            state.bars.pop_front()
        } else {
            state.bars.front().cloned()
        };
        Ok(bars.unwrap_or_default())
    }

    async fn get_open_position(&self, symbol: &str) -> Result<Position, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetOpenPosition(symbol.to_string()));
        if let Some(failure) = state.position_failure {
            return Err(failure.to_error());
        }
        match state.position {
            Some(quantity) if quantity != 0.0 => Ok(Position::Open {
                symbol: symbol.to_string(),
                quantity,
            }),
            _ => Err(BrokerError::NotFound),
        }
    }

    async fn submit_market_order(&self, order: &Order) -> Result<OrderAck, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SubmitOrder(order.clone()));
        if let Some(failure) = state.order_failure {
            return Err(failure.to_error());
        }
        let delta = match order.side {
            crate::models::OrderSide::Buy => order.quantity as f64,
            crate::models::OrderSide::Sell => -(order.quantity as f64),
        };
        state.position = Some(state.position.unwrap_or(0.0) + delta);
        Ok(OrderAck {
            id: format!("order-{}", state.calls.len()),
            status: "filled".to_string(),
        })
    }

    async fn close_position(&self, symbol: &str) -> Result<OrderAck, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ClosePosition(symbol.to_string()));
        if let Some(failure) = state.close_failure {
            return Err(failure.to_error());
        }
        match state.position.take() {
            Some(quantity) if quantity != 0.0 => Ok(OrderAck {
                id: format!("close-{}", state.calls.len()),
                status: "filled".to_string(),
            }),
            _ => Err(BrokerError::NotFound),
        }
    }

    async fn get_market_clock(&self) -> Result<MarketClock, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetClock);
        let now = Utc::now();
        Ok(MarketClock {
            is_open: state.clock_open,
            next_open: now + chrono::Duration::hours(2),
            next_close: now + chrono::Duration::hours(8),
            timestamp: now,
        })
    }

    async fn get_account(&self) -> Result<Account, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetAccount);
        Ok(Account {
            status: "ACTIVE".to_string(),
            buying_power: 100_000.0,
        })
    }
}
