use chrono_tz::Tz;
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use crate::broker::alpaca::{AlpacaConfig, DATA_URL, PAPER_TRADING_URL};
use crate::error::BotError;
use crate::indicators::{IndicatorConfig, SessionReset, StdDevEstimator};
use crate::Result;

pub const ENV_PREFIX: &str = "VWAPBOT";

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum SessionResetKind {
    #[default]
    UtcDate,
    ExchangeDate,
    Never,
}

/// Flat view of the environment before validation
#[derive(Debug, Deserialize)]
struct RawConfig {
    api_key: String,
    api_secret: String,
    #[serde(default = "default_trading_url")]
    trading_url: String,
    #[serde(default = "default_data_url")]
    data_url: String,
    #[serde(default = "default_feed")]
    feed: String,
    #[serde(default = "default_symbol")]
    symbol: String,
    #[serde(default = "default_quantity")]
    quantity: u32,
    #[serde(default = "default_poll_interval_secs")]
    poll_interval_secs: u64,
    #[serde(default = "default_settle_delay_secs")]
    settle_delay_secs: u64,
    #[serde(default = "default_lookback_days")]
    lookback_days: i64,
    #[serde(default = "default_band_window")]
    band_window: usize,
    #[serde(default = "default_band_multiplier")]
    band_multiplier: f64,
    #[serde(default)]
    std_dev_estimator: StdDevEstimator,
    #[serde(default)]
    session_reset: SessionResetKind,
    #[serde(default = "default_exchange_timezone")]
    exchange_timezone: String,
    #[serde(default = "default_dry_run")]
    dry_run: bool,
}

fn default_trading_url() -> String {
    PAPER_TRADING_URL.to_string()
}
fn default_data_url() -> String {
    DATA_URL.to_string()
}
fn default_feed() -> String {
    "iex".to_string()
}
fn default_symbol() -> String {
    "SPY".to_string()
}
fn default_quantity() -> u32 {
    1
}
fn default_poll_interval_secs() -> u64 {
    60
}
fn default_settle_delay_secs() -> u64 {
    2
}
fn default_lookback_days() -> i64 {
    5
}
fn default_band_window() -> usize {
    20
}
fn default_band_multiplier() -> f64 {
    2.0
}
fn default_exchange_timezone() -> String {
    "America/New_York".to_string()
}
fn default_dry_run() -> bool {
    true
}

/// Command-line values that win over the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub dry_run: Option<bool>,
    pub symbol: Option<String>,
}

/// Runtime configuration, loaded once at startup
#[derive(Debug)]
pub struct BotConfig {
    pub alpaca: AlpacaConfig,
    pub symbol: String,
    pub quantity: u32,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub lookback: chrono::Duration,
    pub indicators: IndicatorConfig,
    pub dry_run: bool,
}

impl BotConfig {
    /// Load from `VWAPBOT_*` environment variables
    pub fn from_env(overrides: Overrides) -> Result<Self> {
        Self::load(config::Environment::with_prefix(ENV_PREFIX), overrides)
    }

    /// Load from an explicit environment source
    ///
    /// Values stay strings until deserialized into their field type, so credentials
    /// such as `0123` are kept verbatim.
    pub fn load(env: config::Environment, overrides: Overrides) -> Result<Self> {
        let raw: RawConfig = config::Config::builder()
            .add_source(env)
            .build()?
            .try_deserialize()?;

        Self::from_raw(raw, overrides)
    }

    fn from_raw(raw: RawConfig, overrides: Overrides) -> Result<Self> {
        if raw.quantity == 0 {
            return Err(BotError::Config("quantity must be positive".to_string()));
        }
        if raw.poll_interval_secs == 0 {
            return Err(BotError::Config("poll_interval_secs must be positive".to_string()));
        }
        if raw.band_window < 2 {
            return Err(BotError::Config(format!(
                "band_window must be at least 2, got {}",
                raw.band_window
            )));
        }
        if !raw.band_multiplier.is_finite() || raw.band_multiplier < 0.0 {
            return Err(BotError::Config(format!(
                "band_multiplier must be non-negative, got {}",
                raw.band_multiplier
            )));
        }
        if raw.lookback_days <= 0 {
            return Err(BotError::Config("lookback_days must be positive".to_string()));
        }

        let session_reset = match raw.session_reset {
            SessionResetKind::UtcDate => SessionReset::UtcDate,
            SessionResetKind::Never => SessionReset::Never,
            SessionResetKind::ExchangeDate => {
                let tz: Tz = raw.exchange_timezone.parse().map_err(|_| {
                    BotError::Config(format!("unknown timezone {:?}", raw.exchange_timezone))
                })?;
                SessionReset::ExchangeDate(tz)
            }
        };

        let symbol = overrides
            .symbol
            .unwrap_or(raw.symbol)
            .trim()
            .to_uppercase();
        if symbol.is_empty() {
            return Err(BotError::Config("symbol must not be empty".to_string()));
        }

        Ok(Self {
            alpaca: AlpacaConfig {
                key_id: SecretString::new(raw.api_key.into()),
                secret_key: SecretString::new(raw.api_secret.into()),
                trading_url: raw.trading_url,
                data_url: raw.data_url,
                feed: raw.feed,
            },
            symbol,
            quantity: raw.quantity,
            poll_interval: Duration::from_secs(raw.poll_interval_secs),
            settle_delay: Duration::from_secs(raw.settle_delay_secs),
            lookback: chrono::Duration::days(raw.lookback_days),
            indicators: IndicatorConfig {
                window: raw.band_window,
                multiplier: raw.band_multiplier,
                estimator: raw.std_dev_estimator,
                session_reset,
            },
            dry_run: overrides.dry_run.unwrap_or(raw.dry_run),
        })
    }
}
