use thiserror::Error;

use crate::broker::BrokerError;

/// Contract violations in a bar series handed to the indicator engine.
#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("bar series is empty")]
    EmptySeries,

    #[error("bar {index} is not strictly after the previous bar")]
    NotAscending { index: usize },

    #[error("bar {index} is malformed: {reason}")]
    InvalidBar { index: usize, reason: String },
}

/// Everything that can abort a trading cycle.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("failed to fetch bars: {0}")]
    DataFetch(#[source] BrokerError),

    #[error("failed to query position: {0}")]
    PositionQuery(#[source] BrokerError),

    #[error("order submission failed: {0}")]
    OrderSubmission(#[source] BrokerError),

    #[error("invalid indicator input: {0}")]
    Input(#[from] InputError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Critical(String),
}

impl From<config::ConfigError> for BotError {
    fn from(err: config::ConfigError) -> Self {
        BotError::Config(err.to_string())
    }
}

impl BotError {
    /// Short stable label used in cycle logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::DataFetch(_) => "data_fetch",
            BotError::PositionQuery(_) => "position_query",
            BotError::OrderSubmission(_) => "order_submission",
            BotError::Input(_) => "input",
            BotError::Config(_) => "config",
            BotError::Critical(_) => "critical",
        }
    }
}
