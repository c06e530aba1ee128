use crate::error::{AppError, AppResult};
use crate::models::{Stock, StockView};
use crate::utils::round_decimal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rand::Rng;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Maximum move of the mock price walk per refresh, in basis points.
const MAX_MOVE_BPS: i64 = 300;
const QUOTE_CONCURRENCY: usize = 4;

/// Source of the latest traded price for a stock.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &str;

    async fn quote(&self, stock: &Stock) -> AppResult<Decimal>;
}

/// Mock feed: moves the current price uniformly within ±3 % and rounds to cents.
#[derive(Default)]
pub struct RandomWalkQuotes;

#[async_trait]
impl QuoteSource for RandomWalkQuotes {
    fn name(&self) -> &str {
        "random-walk"
    }

    async fn quote(&self, stock: &Stock) -> AppResult<Decimal> {
        let bps = rand::thread_rng().gen_range(-MAX_MOVE_BPS..=MAX_MOVE_BPS);
        let factor = Decimal::ONE + Decimal::new(bps, 4);
        Ok(round_decimal(stock.current_price * factor, 2))
    }
}

#[derive(Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
}

#[derive(Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,
}

/// Alpha Vantage `GLOBAL_QUOTE` lookups.
pub struct AlphaVantageQuotes {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantageQuotes {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn upstream(message: String) -> AppError {
        AppError::Upstream {
            provider: "Alpha Vantage".to_string(),
            message,
        }
    }
}

#[async_trait]
impl QuoteSource for AlphaVantageQuotes {
    fn name(&self) -> &str {
        "alpha-vantage"
    }

    async fn quote(&self, stock: &Stock) -> AppResult<Decimal> {
        let response: GlobalQuoteResponse = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", stock.symbol.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| Self::upstream(format!("Failed to parse quote for {}: {e}", stock.symbol)))?;

        let price = response
            .global_quote
            .and_then(|q| q.price)
            .ok_or_else(|| Self::upstream(format!("No quote data for {}", stock.symbol)))?;

        price
            .trim()
            .parse::<Decimal>()
            .map_err(|e| Self::upstream(format!("Invalid price for {}: {e}", stock.symbol)))
    }
}

/// Moves `stock` to `price`: the old price becomes the previous close and the
/// intraday range widens to include the new price.
pub fn apply_quote(stock: &Stock, price: Decimal, now: DateTime<Utc>) -> Stock {
    Stock {
        previous_close: Some(stock.current_price),
        current_price: price,
        day_high: Some(stock.day_high.map_or(price, |high| high.max(price))),
        day_low: Some(stock.day_low.map_or(price, |low| low.min(price))),
        last_updated: now,
        ..stock.clone()
    }
}

/// Quotes every stock in the snapshot and returns the ones that got a new
/// price, sorted by symbol. Stocks whose quote fails are left out.
pub async fn refresh_quotes(
    snapshot: Vec<Stock>,
    source: &dyn QuoteSource,
    now: DateTime<Utc>,
) -> Vec<Stock> {
    let mut updated: Vec<Stock> = stream::iter(snapshot)
        .map(|stock| async move {
            match source.quote(&stock).await {
                Ok(price) => Some(apply_quote(&stock, price, now)),
                Err(e) => {
                    warn!("Quote for {} from {} failed: {}", stock.symbol, source.name(), e);
                    None
                }
            }
        })
        .buffer_unordered(QUOTE_CONCURRENCY)
        .filter_map(|s| async move { s })
        .collect()
        .await;

    updated.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    updated
}

/// Fan-out of refreshed prices to live subscribers. Each message is the JSON
/// array of updated stock views.
#[derive(Clone)]
pub struct PriceFeed {
    sender: broadcast::Sender<String>,
}

impl PriceFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Returns how many subscribers received the batch.
    pub fn publish(&self, views: &[StockView]) -> usize {
        let payload = match serde_json::to_string(views) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to encode price batch: {}", e);
                return 0;
            }
        };
        match self.sender.send(payload) {
            Ok(n) => n,
            Err(_) => {
                debug!("No live price subscribers");
                0
            }
        }
    }
}
