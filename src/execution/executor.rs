use std::sync::Arc;
use std::time::Duration;

use crate::broker::{Broker, BrokerError};
use crate::error::BotError;
use crate::models::{Order, OrderAck, OrderSide, Position, Signal};
use crate::scheduler::Clock;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    /// No broker call
    Skip,
    /// Liquidate the whole position
    Close,
    /// Close anything open, wait for settlement, then send a market order
    Enter { side: OrderSide, quantity: u32 },
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

/// Turns a signal into at most one order or close request
pub struct Executor {
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    symbol: String,
    quantity: u32,
    settle_delay: Duration,
}

impl Executor {
    pub fn new(
        broker: Arc<dyn Broker>,
        clock: Arc<dyn Clock>,
        symbol: impl Into<String>,
        quantity: u32,
        settle_delay: Duration,
    ) -> Self {
        Self {
            broker,
            clock,
            symbol: symbol.into(),
            quantity,
            settle_delay,
        }
    }

    /// Decide what to do without touching the broker
    pub fn plan(&self, signal: Signal, position: &Position) -> ExecutionDecision {
        let qty = position.quantity();

        match signal {
            Signal::Long => ExecutionDecision {
                action: ExecutionAction::Enter {
                    side: OrderSide::Buy,
                    quantity: self.quantity,
                },
                reason: format!("Long: closing existing {} and buying {}", qty, self.quantity),
            },
            Signal::Short => ExecutionDecision {
                action: ExecutionAction::Enter {
                    side: OrderSide::Sell,
                    quantity: self.quantity,
                },
                reason: format!("Short: closing existing {} and selling {}", qty, self.quantity),
            },
            Signal::Exit => ExecutionDecision {
                action: ExecutionAction::Close,
                reason: format!("Exit: closing position of {}", qty),
            },
            Signal::Hold => ExecutionDecision {
                action: ExecutionAction::Skip,
                reason: "Hold signal".to_string(),
            },
        }
    }

    /// Plan and carry out a signal against the broker
    pub async fn execute(&self, signal: Signal, position: &Position) -> Result<ExecutionDecision> {
        let decision = self.plan(signal, position);
        tracing::info!("  Decision: {:?} - {}", decision.action, decision.reason);

        match &decision.action {
            ExecutionAction::Skip => {}
            ExecutionAction::Close => {
                self.close_existing().await?;
            }
            ExecutionAction::Enter { side, quantity } => {
                self.close_existing().await?;
                self.clock.sleep(self.settle_delay).await;

                let order = Order::market(&self.symbol, *quantity, *side);
                let ack = self
                    .broker
                    .submit_market_order(&order)
                    .await
                    .map_err(BotError::OrderSubmission)?;
                tracing::info!(
                    "  ✓ Submitted {:?} {} {} (order {}, {})",
                    side,
                    quantity,
                    self.symbol,
                    ack.id,
                    ack.status
                );
            }
        }

        Ok(decision)
    }

    /// Close the symbol's position; nothing to close counts as success
    async fn close_existing(&self) -> Result<Option<OrderAck>> {
        match self.broker.close_position(&self.symbol).await {
            Ok(ack) => {
                tracing::info!("  ✓ Close requested for {} (order {})", self.symbol, ack.id);
                Ok(Some(ack))
            }
            Err(BrokerError::NotFound) => {
                tracing::debug!("  No open {} position to close", self.symbol);
                Ok(None)
            }
            Err(e) => Err(BotError::OrderSubmission(e)),
        }
    }
}
