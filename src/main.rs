use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use vwapbot::broker::{AlpacaClient, Broker};
use vwapbot::config::{BotConfig, Overrides};
use vwapbot::scheduler::{SystemClock, TradingLoop};

/// Intraday VWAP band mean reversion bot
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Log intended actions without sending orders or waiting for market hours
    #[arg(long)]
    dry_run: bool,

    /// Send real orders to the configured endpoint
    #[arg(long, conflicts_with = "dry_run")]
    live: bool,

    /// Symbol to trade, overrides VWAPBOT_SYMBOL
    #[arg(long)]
    symbol: Option<String>,

    /// Dotenv file to load before reading the environment
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        let dry_run = match (self.dry_run, self.live) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        Overrides {
            dry_run,
            symbol: self.symbol.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::from_path(&cli.env_file).ok();
    setup_logging();

    let config = BotConfig::from_env(cli.overrides()).context("failed to load configuration")?;

    tracing::info!("📊 Configuration:");
    tracing::info!("  Symbol: {}", config.symbol);
    tracing::info!("  Quantity: {}", config.quantity);
    tracing::info!("  Endpoint: {}", config.alpaca.trading_url);
    tracing::info!("  Interval: {}s", config.poll_interval.as_secs());
    tracing::info!(
        "  Bands: {} bars x {} std dev ({:?})",
        config.indicators.window,
        config.indicators.multiplier,
        config.indicators.estimator
    );
    tracing::info!("  Dry run: {}", config.dry_run);

    let client = AlpacaClient::new(&config.alpaca).context("failed to build Alpaca client")?;
    let broker: Arc<dyn Broker> = Arc::new(client);

    match broker.get_account().await {
        Ok(account) => tracing::info!(
            "Connection successful. Account status: {} | Buying power: ${:.2}",
            account.status,
            account.buying_power
        ),
        Err(e) => {
            if config.dry_run {
                tracing::warn!("Account check failed ({}), continuing in dry run", e);
            } else {
                return Err(e).context("failed to verify broker connection");
            }
        }
    }

    let trading_loop = TradingLoop::new(broker, Arc::new(SystemClock), &config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("⚠️  Received Ctrl+C, stopping after the current cycle...");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    trading_loop
        .run(shutdown_rx)
        .await
        .context("trading loop stopped on invalid market data")?;

    tracing::info!("Bot stopped by user.");
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vwapbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
