use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{Broker, BrokerError};
use crate::models::{Account, Bar, MarketClock, Order, OrderAck, OrderSide, Position};

pub const PAPER_TRADING_URL: &str = "https://paper-api.alpaca.markets";
pub const LIVE_TRADING_URL: &str = "https://api.alpaca.markets";
pub const DATA_URL: &str = "https://data.alpaca.markets";
const BARS_PAGE_LIMIT: u32 = 10_000;
/// Alpaca error code for "position does not exist"
const POSITION_NOT_FOUND_CODE: u64 = 40410000;

/// Connection settings for the Alpaca REST API
#[derive(Debug)]
pub struct AlpacaConfig {
    pub key_id: SecretString,
    pub secret_key: SecretString,
    /// Paper or live trading endpoint
    pub trading_url: String,
    pub data_url: String,
    /// Market data feed, e.g. `iex` or `sip`
    pub feed: String,
}

/// Client for the Alpaca trading and market data APIs
#[derive(Clone)]
pub struct AlpacaClient {
    client: Client,
    trading_url: String,
    data_url: String,
    feed: String,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    #[serde(default)]
    bars: Option<Vec<AlpacaBar>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<u64>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct PositionResponse {
    symbol: String,
    qty: String,
    side: String,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    symbol: &'a str,
    qty: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: &'static str,
    time_in_force: crate::models::TimeInForce,
    client_order_id: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ClockResponse {
    timestamp: DateTime<Utc>,
    is_open: bool,
    next_open: DateTime<Utc>,
    next_close: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    status: String,
    buying_power: String,
}

impl AlpacaClient {
    pub fn new(config: &AlpacaConfig) -> Result<Self, BrokerError> {
        let mut headers = header::HeaderMap::new();
        headers.insert("APCA-API-KEY-ID", sensitive_header(&config.key_id)?);
        headers.insert("APCA-API-SECRET-KEY", sensitive_header(&config.secret_key)?);

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            trading_url: config.trading_url.trim_end_matches('/').to_string(),
            data_url: config.data_url.trim_end_matches('/').to_string(),
            feed: config.feed.clone(),
        })
    }

    fn trading(&self, path: &str) -> String {
        format!("{}{}", self.trading_url, path)
    }
}

fn sensitive_header(secret: &SecretString) -> Result<header::HeaderValue, BrokerError> {
    let mut value = header::HeaderValue::from_str(secret.expose_secret())
        .map_err(|e| BrokerError::Decode(format!("invalid credential header: {}", e)))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Map non-success statuses onto `BrokerError`
///
/// Only Alpaca's own position-not-found error is `NotFound`. A 404 from a wrong route
/// or a proxy stays an `Api` error so it is never read as a flat position.
async fn check(response: Response) -> Result<Response, BrokerError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(match response.json::<ApiErrorBody>().await {
            Ok(body) if body.code == Some(POSITION_NOT_FOUND_CODE) => BrokerError::NotFound,
            Ok(body) => BrokerError::Api {
                status: status.as_u16(),
                message: body.message,
            },
            Err(_) => BrokerError::Api {
                status: status.as_u16(),
                message: "not found (no Alpaca error body)".to_string(),
            },
        });
    }
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown API error".to_string());
        return Err(BrokerError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

fn parse_number(field: &str, raw: &str) -> Result<f64, BrokerError> {
    raw.parse::<f64>()
        .map_err(|_| BrokerError::Decode(format!("{} is not a number: {:?}", field, raw)))
}

#[async_trait]
impl Broker for AlpacaClient {
    async fn get_bars(&self, symbol: &str, start: DateTime<Utc>) -> Result<Vec<Bar>, BrokerError> {
        let url = format!("{}/v2/stocks/{}/bars", self.data_url, symbol);
        let start = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        loop {
            let mut query = vec![
                ("timeframe", "1Min".to_string()),
                ("start", start.clone()),
                ("limit", BARS_PAGE_LIMIT.to_string()),
                ("feed", self.feed.clone()),
            ];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let response = check(self.client.get(&url).query(&query).send().await?).await?;
            let page: BarsResponse = response.json().await?;

            bars.extend(page.bars.unwrap_or_default().into_iter().map(|b| Bar {
                timestamp: b.timestamp,
                open: b.open,
                high: b.high,
                low: b.low,
                close: b.close,
                volume: b.volume,
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    if !seen_tokens.insert(token.clone()) {
                        tracing::warn!(
                            symbol = %symbol,
                            token = %token,
                            "Bar page token repeated, stopping pagination"
                        );
                        break;
                    }
                    page_token = Some(token);
                }
                _ => break,
            }
        }

        bars.sort_by_key(|b| b.timestamp);
        tracing::debug!(symbol = %symbol, bars = bars.len(), "Fetched minute bars");
        Ok(bars)
    }

    async fn get_open_position(&self, symbol: &str) -> Result<Position, BrokerError> {
        let url = self.trading(&format!("/v2/positions/{}", symbol));
        let response = check(self.client.get(&url).send().await?).await?;
        let position: PositionResponse = response.json().await?;

        let quantity = parse_number("qty", &position.qty)?.abs();
        let quantity = match position.side.as_str() {
            "long" => quantity,
            "short" => -quantity,
            other => return Err(BrokerError::Decode(format!("unknown position side {:?}", other))),
        };

        if quantity == 0.0 {
            return Err(BrokerError::NotFound);
        }

        Ok(Position::Open {
            symbol: position.symbol,
            quantity,
        })
    }

    async fn submit_market_order(&self, order: &Order) -> Result<OrderAck, BrokerError> {
        let body = OrderRequest {
            symbol: &order.symbol,
            qty: order.quantity.to_string(),
            side: order.side,
            order_type: "market",
            time_in_force: order.time_in_force,
            client_order_id: uuid::Uuid::new_v4().to_string(),
        };

        let response = check(
            self.client
                .post(self.trading("/v2/orders"))
                .json(&body)
                .send()
                .await?,
        )
        .await?;
        let ack: OrderResponse = response.json().await?;

        Ok(OrderAck {
            id: ack.id,
            status: ack.status,
        })
    }

    async fn close_position(&self, symbol: &str) -> Result<OrderAck, BrokerError> {
        let url = self.trading(&format!("/v2/positions/{}", symbol));
        let response = check(self.client.delete(&url).send().await?).await?;
        let ack: OrderResponse = response.json().await?;

        Ok(OrderAck {
            id: ack.id,
            status: ack.status,
        })
    }

    async fn get_market_clock(&self) -> Result<MarketClock, BrokerError> {
        let response = check(self.client.get(self.trading("/v2/clock")).send().await?).await?;
        let clock: ClockResponse = response.json().await?;

        Ok(MarketClock {
            is_open: clock.is_open,
            next_open: clock.next_open,
            next_close: clock.next_close,
            timestamp: clock.timestamp,
        })
    }

    async fn get_account(&self) -> Result<Account, BrokerError> {
        let response = check(self.client.get(self.trading("/v2/account")).send().await?).await?;
        let account: AccountResponse = response.json().await?;

        Ok(Account {
            status: account.status,
            buying_power: parse_number("buying_power", &account.buying_power)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;
    use crate::execution::PositionTracker;
    use chrono::TimeZone;
    use mockito::Matcher;
    use std::sync::Arc;

    fn client_for(server: &mockito::ServerGuard) -> AlpacaClient {
        AlpacaClient::new(&AlpacaConfig {
            key_id: SecretString::new("key".into()),
            secret_key: SecretString::new("secret".into()),
            trading_url: server.url(),
            data_url: server.url(),
            feed: "iex".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_bars_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/v2/stocks/SPY/bars")
            .match_header("APCA-API-KEY-ID", "key")
            .match_header("APCA-API-SECRET-KEY", "secret")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("timeframe".into(), "1Min".into()),
                Matcher::UrlEncoded("start".into(), "2024-03-04T00:00:00Z".into()),
                Matcher::Regex("feed=iex$".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"bars":[{"t":"2024-03-04T14:31:00Z","o":100,"h":101,"l":99,"c":100.5,"v":1200,"n":10,"vw":100.2}],
                    "symbol":"SPY","next_page_token":"abc"}"#,
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/v2/stocks/SPY/bars")
            .match_query(Matcher::Regex("page_token=abc$".into()))
            .with_status(200)
            .with_body(
                r#"{"bars":[{"t":"2024-03-04T14:30:00Z","o":99,"h":100,"l":98,"c":99.5,"v":800,"n":5,"vw":99.4}],
                    "symbol":"SPY","next_page_token":null}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let bars = client.get_bars("SPY", start).await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(bars[1].close, 100.5);
        assert_eq!(bars[1].volume, 1200.0);
    }

    #[tokio::test]
    async fn test_get_bars_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/stocks/SPY/bars")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"bars":null,"symbol":"SPY","next_page_token":null}"#)
            .create_async()
            .await;

        let bars = client_for(&server).get_bars("SPY", Utc::now()).await.unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn test_short_position_is_negative() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/positions/SPY")
            .with_status(200)
            .with_body(r#"{"symbol":"SPY","qty":"-3","side":"short"}"#)
            .create_async()
            .await;

        let position = client_for(&server).get_open_position("SPY").await.unwrap();
        assert_eq!(position.quantity(), -3.0);
    }

    #[tokio::test]
    async fn test_missing_position_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/positions/SPY")
            .with_status(404)
            .with_body(r#"{"code":40410000,"message":"position does not exist"}"#)
            .create_async()
            .await;

        let err = client_for(&server).get_open_position("SPY").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_auth_failure_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/positions/SPY")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let err = client_for(&server).get_open_position("SPY").await.unwrap_err();
        assert!(matches!(err, BrokerError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_submit_market_order_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/orders")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "symbol": "SPY",
                "qty": "5",
                "side": "sell",
                "type": "market",
                "time_in_force": "day"
            })))
            .with_status(200)
            .with_body(r#"{"id":"o-1","client_order_id":"x","status":"accepted"}"#)
            .create_async()
            .await;

        let order = Order::market("SPY", 5, OrderSide::Sell);
        let ack = client_for(&server).submit_market_order(&order).await.unwrap();

        mock.assert_async().await;
        assert_eq!(ack.id, "o-1");
        assert_eq!(ack.status, "accepted");
    }

    #[tokio::test]
    async fn test_close_position_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/v2/positions/SPY")
            .with_status(404)
            .with_body(r#"{"code":40410000,"message":"position not found: SPY"}"#)
            .create_async()
            .await;

        let err = client_for(&server).close_position("SPY").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_route_404_is_not_a_flat_position() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/v2/positions/SPY")
            .with_status(404)
            .with_body("404 page not found")
            .create_async()
            .await;

        let client = AlpacaClient::new(&AlpacaConfig {
            key_id: SecretString::new("key".into()),
            secret_key: SecretString::new("secret".into()),
            trading_url: format!("{}/v2", server.url()),
            data_url: server.url(),
            feed: "iex".to_string(),
        })
        .unwrap();

        let err = client.get_open_position("SPY").await.unwrap_err();
        assert!(matches!(err, BrokerError::Api { status: 404, .. }));

        let tracker = PositionTracker::new(Arc::new(client));
        let result = tracker.current_position("SPY").await;
        assert!(matches!(result, Err(BotError::PositionQuery(_))));
    }

    #[tokio::test]
    async fn test_other_alpaca_404_code_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/v2/positions/SPY")
            .with_status(404)
            .with_body(r#"{"code":40410001,"message":"asset not found"}"#)
            .create_async()
            .await;

        let err = client_for(&server).close_position("SPY").await.unwrap_err();
        assert!(matches!(err, BrokerError::Api { status: 404, ref message } if message == "asset not found"));
    }

    #[tokio::test]
    async fn test_get_bars_stops_on_repeated_page_token() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/v2/stocks/SPY/bars")
            .match_query(Matcher::Regex("feed=iex$".into()))
            .with_status(200)
            .with_body(
                r#"{"bars":[{"t":"2024-03-04T14:30:00Z","o":99,"h":100,"l":98,"c":99.5,"v":800}],
                    "symbol":"SPY","next_page_token":"abc"}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let stuck = server
            .mock("GET", "/v2/stocks/SPY/bars")
            .match_query(Matcher::Regex("page_token=abc$".into()))
            .with_status(200)
            .with_body(
                r#"{"bars":[{"t":"2024-03-04T14:31:00Z","o":100,"h":101,"l":99,"c":100.5,"v":1200}],
                    "symbol":"SPY","next_page_token":"abc"}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let bars = client_for(&server).get_bars("SPY", start).await.unwrap();

        first.assert_async().await;
        stuck.assert_async().await;
        assert_eq!(bars.len(), 2);
    }

    #[tokio::test]
    async fn test_clock_converts_offsets_to_utc() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/clock")
            .with_status(200)
            .with_body(
                r#"{"timestamp":"2024-03-04T08:00:00-05:00","is_open":false,
                    "next_open":"2024-03-04T09:30:00-05:00","next_close":"2024-03-04T16:00:00-05:00"}"#,
            )
            .create_async()
            .await;

        let clock = client_for(&server).get_market_clock().await.unwrap();
        assert!(!clock.is_open);
        assert_eq!(clock.next_open, Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap());
        assert_eq!(clock.minutes_to_open(), 90);
    }

    #[tokio::test]
    async fn test_account_parses_buying_power() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/account")
            .with_status(200)
            .with_body(r#"{"status":"ACTIVE","buying_power":"25000.50"}"#)
            .create_async()
            .await;

        let account = client_for(&server).get_account().await.unwrap();
        assert_eq!(account.status, "ACTIVE");
        assert_eq!(account.buying_power, 25000.5);
    }
}
