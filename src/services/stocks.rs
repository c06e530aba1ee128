use crate::error::{AppError, AppResult};
use crate::models::{Stock, StockView, DEFAULT_CURRENCY};
use crate::services::currency::CurrencySource;
use crate::services::market::{refresh_quotes, PriceFeed, QuoteSource};
use crate::storage::Store;
use crate::utils::{normalize_symbol, percentage_of};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::info;

/// Listing used to populate an empty stock table.
const DEFAULT_CATALOGUE: &[(&str, &str, &str, Decimal, i64)] = &[
    ("AAPL", "Apple Inc.", "NASDAQ", dec!(189.84), 52_164_500),
    ("MSFT", "Microsoft Corporation", "NASDAQ", dec!(415.26), 20_139_000),
    ("GOOGL", "Alphabet Inc.", "NASDAQ", dec!(155.72), 25_413_000),
    ("AMZN", "Amazon.com, Inc.", "NASDAQ", dec!(178.15), 37_946_000),
    ("TSLA", "Tesla, Inc.", "NASDAQ", dec!(175.79), 89_560_000),
    ("META", "Meta Platforms, Inc.", "NASDAQ", dec!(493.50), 14_020_000),
    ("NVDA", "NVIDIA Corporation", "NASDAQ", dec!(881.86), 41_210_000),
    ("JPM", "JPMorgan Chase & Co.", "NYSE", dec!(198.48), 9_120_000),
    ("XOM", "Exxon Mobil Corporation", "NYSE", dec!(118.21), 16_470_000),
    ("CVX", "Chevron Corporation", "NYSE", dec!(157.39), 8_230_000),
    ("SPY", "SPDR S&P 500 ETF Trust", "NYSE Arca", dec!(510.87), 66_310_000),
    ("QQQ", "Invesco QQQ Trust", "NASDAQ", dec!(438.27), 38_870_000),
];

pub struct StockService {
    store: Arc<dyn Store>,
    currency: Arc<dyn CurrencySource>,
    quotes: Arc<dyn QuoteSource>,
    feed: PriceFeed,
}

/// Stock view in USD with the day's percentage change.
pub fn to_view(stock: &Stock) -> StockView {
    let percent_change = stock
        .previous_close
        .filter(|prev| *prev > Decimal::ZERO)
        .and_then(|prev| percentage_of(stock.current_price.checked_sub(prev)?, prev));

    StockView {
        symbol: stock.symbol.clone(),
        name: stock.name.clone(),
        current_price: stock.current_price,
        previous_close: stock.previous_close,
        day_high: stock.day_high,
        day_low: stock.day_low,
        volume: stock.volume,
        exchange: stock.exchange.clone(),
        last_updated: stock.last_updated,
        currency: DEFAULT_CURRENCY.to_string(),
        percent_change,
    }
}

/// Scales every price field by `rate`; volume and percent change stay as is.
pub fn convert_view(mut view: StockView, rate: Decimal, currency: &str) -> StockView {
    view.current_price *= rate;
    view.previous_close = view.previous_close.map(|p| p * rate);
    view.day_high = view.day_high.map(|p| p * rate);
    view.day_low = view.day_low.map(|p| p * rate);
    view.currency = currency.to_string();
    view
}

impl StockService {
    pub fn new(
        store: Arc<dyn Store>,
        currency: Arc<dyn CurrencySource>,
        quotes: Arc<dyn QuoteSource>,
        feed: PriceFeed,
    ) -> Self {
        Self {
            store,
            currency,
            quotes,
            feed,
        }
    }

    pub fn feed(&self) -> &PriceFeed {
        &self.feed
    }

    pub async fn get(&self, symbol: &str) -> AppResult<Stock> {
        let symbol = normalize_symbol(symbol);
        self.store
            .find_stock(&symbol)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Stock not found with symbol: {symbol}")))
    }

    pub async fn search(&self, query: &str) -> AppResult<Vec<Stock>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.store.search_stocks(query).await
    }

    pub async fn view(&self, symbol: &str, currency: &str) -> AppResult<StockView> {
        let stock = self.get(symbol).await?;
        self.view_in(&stock, currency).await
    }

    /// Views for the listed symbols that exist; unknown symbols are skipped.
    pub async fn views(&self, symbols: &[String], currency: &str) -> AppResult<Vec<StockView>> {
        let symbols: Vec<String> = symbols
            .iter()
            .map(|s| normalize_symbol(s))
            .filter(|s| !s.is_empty())
            .collect();
        let stocks = self.store.find_stocks(&symbols).await?;
        let rate = self.currency.rate(DEFAULT_CURRENCY, currency).await?;
        Ok(stocks
            .iter()
            .map(|s| convert_view(to_view(s), rate, currency))
            .collect())
    }

    async fn view_in(&self, stock: &Stock, currency: &str) -> AppResult<StockView> {
        let rate = self.currency.rate(DEFAULT_CURRENCY, currency).await?;
        Ok(convert_view(to_view(stock), rate, currency))
    }

    /// Populates the catalogue when no stock is stored yet.
    pub async fn seed_defaults(&self) -> AppResult<usize> {
        if !self.store.list_stocks().await?.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let stocks: Vec<Stock> = DEFAULT_CATALOGUE
            .iter()
            .map(|(symbol, name, exchange, price, volume)| Stock {
                symbol: symbol.to_string(),
                name: name.to_string(),
                current_price: *price,
                previous_close: None,
                day_high: None,
                day_low: None,
                volume: Some(*volume),
                exchange: Some(exchange.to_string()),
                last_updated: now,
            })
            .collect();
        self.store.save_stocks(&stocks).await?;
        info!("Seeded {} stocks", stocks.len());
        Ok(stocks.len())
    }

    /// One price refresh: snapshot, quote, persist, publish.
    pub async fn run_price_refresh(&self) -> AppResult<usize> {
        let snapshot = self.store.list_stocks().await?;
        let updated = refresh_quotes(snapshot, self.quotes.as_ref(), Utc::now()).await;
        if updated.is_empty() {
            return Ok(0);
        }
        self.store.save_stocks(&updated).await?;

        let views: Vec<StockView> = updated.iter().map(to_view).collect();
        let listeners = self.feed.publish(&views);
        info!(
            "Price refresh via {} updated {} stocks ({} live listeners)",
            self.quotes.name(),
            updated.len(),
            listeners
        );
        Ok(updated.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::currency::StaticRates;
    use crate::services::market::RandomWalkQuotes;
    use crate::storage::MemoryStore;

    fn service() -> StockService {
        StockService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StaticRates::new()),
            Arc::new(RandomWalkQuotes),
            PriceFeed::new(8),
        )
    }

    fn sample(previous_close: Option<Decimal>) -> Stock {
        Stock {
            symbol: "AAPL".into(),
            name: "Apple Inc.".into(),
            current_price: dec!(110),
            previous_close,
            day_high: Some(dec!(112)),
            day_low: Some(dec!(99)),
            volume: Some(10),
            exchange: Some("NASDAQ".into()),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn percent_change_against_previous_close() {
        assert_eq!(to_view(&sample(Some(dec!(100)))).percent_change, Some(dec!(10)));
        assert_eq!(to_view(&sample(None)).percent_change, None);
        assert_eq!(to_view(&sample(Some(Decimal::ZERO))).percent_change, None);
    }

    #[test]
    fn conversion_scales_prices_only() {
        let view = convert_view(to_view(&sample(Some(dec!(100)))), dec!(0.91), "EUR");
        assert_eq!(view.current_price, dec!(100.10));
        assert_eq!(view.previous_close, Some(dec!(91)));
        assert_eq!(view.day_high, Some(dec!(101.92)));
        assert_eq!(view.day_low, Some(dec!(90.09)));
        assert_eq!(view.volume, Some(10));
        assert_eq!(view.percent_change, Some(dec!(10)));
        assert_eq!(view.currency, "EUR");
    }

    #[tokio::test]
    async fn seeding_only_fills_an_empty_table() {
        let service = service();
        assert_eq!(service.seed_defaults().await.unwrap(), DEFAULT_CATALOGUE.len());
        assert_eq!(service.seed_defaults().await.unwrap(), 0);
        assert_eq!(service.get("aapl").await.unwrap().symbol, "AAPL");
    }

    #[tokio::test]
    async fn refresh_updates_and_publishes() {
        let service = service();
        service.seed_defaults().await.unwrap();
        let mut rx = service.feed().subscribe();

        let updated = service.run_price_refresh().await.unwrap();
        assert_eq!(updated, DEFAULT_CATALOGUE.len());

        let aapl = service.get("AAPL").await.unwrap();
        assert_eq!(aapl.previous_close, Some(dec!(189.84)));

        let batch: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(batch.as_array().unwrap().len(), DEFAULT_CATALOGUE.len());
    }

    #[tokio::test]
    async fn unknown_symbol_is_not_found() {
        let err = service().view("ZZZZ", "USD").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
