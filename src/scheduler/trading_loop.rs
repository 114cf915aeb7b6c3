use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::broker::Broker;
use crate::config::BotConfig;
use crate::error::BotError;
use crate::execution::{ExecutionAction, Executor, PositionTracker};
use crate::indicators::{latest_frame, IndicatorConfig};
use crate::models::{IndicatorFrame, Position, Signal};
use crate::scheduler::Clock;
use crate::strategy::{Strategy, VwapReversionStrategy};
use crate::Result;

/// What a single cycle ended up doing
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Live mode and the exchange is closed
    MarketClosed { minutes_to_open: i64 },
    /// Not enough bars to fill the volatility window
    InsufficientData { bars: usize, required: usize },
    /// Latest frame has no bands; nothing was decided
    Indeterminate { close: f64, vwap: f64 },
    Decided {
        frame: IndicatorFrame,
        position: Position,
        signal: Signal,
        action: ExecutionAction,
        dry_run: bool,
    },
}

/// Single-symbol polling loop
///
/// Each cycle: market-hours gate, fetch bars, compute indicators, read the position,
/// decide, act. Cycles never overlap and are always followed by the fixed sleep.
pub struct TradingLoop {
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    strategy: Box<dyn Strategy>,
    indicators: IndicatorConfig,
    tracker: PositionTracker,
    executor: Executor,
    symbol: String,
    interval: Duration,
    lookback: chrono::Duration,
    dry_run: bool,
}

impl TradingLoop {
    pub fn new(broker: Arc<dyn Broker>, clock: Arc<dyn Clock>, config: &BotConfig) -> Self {
        let executor = Executor::new(
            broker.clone(),
            clock.clone(),
            config.symbol.clone(),
            config.quantity,
            config.settle_delay,
        );

        Self {
            tracker: PositionTracker::new(broker.clone()),
            broker,
            clock,
            strategy: Box::new(VwapReversionStrategy::new(config.indicators.window)),
            indicators: config.indicators.clone(),
            executor,
            symbol: config.symbol.clone(),
            interval: config.poll_interval,
            lookback: config.lookback,
            dry_run: config.dry_run,
        }
    }

    /// Run one cycle without the trailing sleep
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        // 1. Session gate (skipped entirely in dry run)
        if !self.dry_run {
            let market = self
                .broker
                .get_market_clock()
                .await
                .map_err(|e| BotError::Critical(format!("market clock query failed: {}", e)))?;

            if !market.is_open {
                let minutes_to_open = market.minutes_to_open();
                tracing::info!(
                    "Market is closed. Opens in {} minutes. Sleeping for {}s...",
                    minutes_to_open,
                    self.interval.as_secs()
                );
                return Ok(CycleOutcome::MarketClosed { minutes_to_open });
            }
        }

        // 2. Fetch
        let start = self.clock.now() - self.lookback;
        let bars = self
            .broker
            .get_bars(&self.symbol, start)
            .await
            .map_err(BotError::DataFetch)?;

        let required = self.strategy.min_bars_required();
        if bars.len() < required {
            tracing::warn!(
                "  {} - Not enough data ({}/{} bars needed), skipping cycle",
                self.symbol,
                bars.len(),
                required
            );
            return Ok(CycleOutcome::InsufficientData {
                bars: bars.len(),
                required,
            });
        }

        // 3. Compute
        let frame = latest_frame(&bars, &self.indicators)?;
        log_frame(&self.symbol, &frame);

        // 4. Decide
        let position = self.tracker.current_position(&self.symbol).await?;
        let Some(signal) = self.strategy.generate_signal(&frame, &position) else {
            tracing::warn!("  Bands indeterminate, no decision this cycle");
            return Ok(CycleOutcome::Indeterminate {
                close: frame.close(),
                vwap: frame.vwap,
            });
        };
        tracing::info!("  Position: {} | Signal: {}", position.quantity(), signal);

        // 5. Act
        let decision = if self.dry_run {
            let decision = self.executor.plan(signal, &position);
            log_dry_run(&decision.action, &self.symbol);
            decision
        } else {
            self.executor.execute(signal, &position).await?
        };

        Ok(CycleOutcome::Decided {
            frame,
            position,
            signal,
            action: decision.action,
            dry_run: self.dry_run,
        })
    }

    /// Run cycles until `shutdown` flips to true, returning the number of cycles run
    ///
    /// Broker and critical failures are logged and retried after the normal interval.
    /// A malformed bar series is a contract violation and stops the loop with the error.
    /// Shutdown is honoured between cycles and interrupts the sleep.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<usize> {
        tracing::info!(
            "🚀 Starting {} for {} (dry run: {}, interval: {}s)",
            self.strategy.name(),
            self.symbol,
            self.dry_run,
            self.interval.as_secs()
        );

        let mut cycles = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            tracing::info!("💹 [CYCLE] Tick at {}", self.clock.now().format("%H:%M:%S"));
            let result = self.run_cycle().await;
            cycles += 1;
            match result {
                Ok(outcome) => tracing::debug!("Cycle outcome: {:?}", outcome),
                Err(BotError::Input(e)) => {
                    tracing::error!("❌ Invalid bar series from broker, stopping: {}", e);
                    return Err(BotError::Input(e));
                }
                Err(e) => tracing::error!(kind = e.kind(), "Cycle failed: {}", e),
            }

            tokio::select! {
                _ = self.clock.sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("👋 Trading loop stopped after {} cycles", cycles);
        Ok(cycles)
    }
}

fn log_frame(symbol: &str, frame: &IndicatorFrame) {
    match frame.bands {
        Some(bands) => tracing::info!(
            "  {} Price: {:.2} | VWAP: {:.2} | L: {:.2} | U: {:.2}",
            symbol,
            frame.close(),
            frame.vwap,
            bands.lower,
            bands.upper
        ),
        None => tracing::info!(
            "  {} Price: {:.2} | VWAP: {:.2} | bands n/a",
            symbol,
            frame.close(),
            frame.vwap
        ),
    }
}

fn log_dry_run(action: &ExecutionAction, symbol: &str) {
    match action {
        ExecutionAction::Enter { side, quantity } => {
            tracing::info!("   [DRY RUN] Would {:?} {} {} now.", side, quantity, symbol)
        }
        ExecutionAction::Close => tracing::info!("   [DRY RUN] Would EXIT {} now.", symbol),
        ExecutionAction::Skip => tracing::info!("   [DRY RUN] No action required."),
    }
}
