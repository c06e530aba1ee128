use super::Store;
use crate::error::{AppError, AppResult};
use crate::models::{Holding, NewNews, NewUser, News, Portfolio, Stock, User};
use crate::services::valuation::{merge_purchase, Position, Purchase};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    portfolios: BTreeMap<i64, Portfolio>,
    holdings: BTreeMap<i64, Holding>,
    stocks: BTreeMap<String, Stock>,
    news: BTreeMap<i64, News>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Store kept entirely in process memory. One lock guards every table, so
/// each operation is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(items: &mut [News]) {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let mut t = self.tables.lock().await;
        if t.users.values().any(|u| u.username == user.username) {
            return Err(AppError::Conflict("Username is already taken".to_string()));
        }
        if t.users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict("Email is already in use".to_string()));
        }
        let id = t.next_id();
        let created = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            preferred_currency: user.preferred_currency,
        };
        t.users.insert(id, created.clone());
        Ok(created)
    }

    async fn find_user(&self, id: i64) -> AppResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn update_preferred_currency(&self, user_id: i64, currency: &str) -> AppResult<Option<User>> {
        let mut t = self.tables.lock().await;
        Ok(t.users.get_mut(&user_id).map(|u| {
            u.preferred_currency = currency.to_string();
            u.clone()
        }))
    }

    async fn create_portfolio(
        &self,
        user_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Portfolio> {
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&user_id) {
            return Err(AppError::not_found("User", user_id));
        }
        let id = t.next_id();
        let portfolio = Portfolio {
            id,
            user_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        t.portfolios.insert(id, portfolio.clone());
        Ok(portfolio)
    }

    async fn find_portfolio(&self, id: i64) -> AppResult<Option<Portfolio>> {
        Ok(self.tables.lock().await.portfolios.get(&id).cloned())
    }

    async fn list_portfolios(&self, user_id: i64) -> AppResult<Vec<Portfolio>> {
        let t = self.tables.lock().await;
        Ok(t.portfolios
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_portfolio(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Option<Portfolio>> {
        let mut t = self.tables.lock().await;
        Ok(t.portfolios.get_mut(&id).map(|p| {
            p.name = name.to_string();
            p.description = description.map(str::to_string);
            p.clone()
        }))
    }

    async fn delete_portfolio(&self, id: i64) -> AppResult<bool> {
        let mut t = self.tables.lock().await;
        if t.portfolios.remove(&id).is_none() {
            return Ok(false);
        }
        t.holdings.retain(|_, h| h.portfolio_id != id);
        Ok(true)
    }

    async fn find_holding(&self, id: i64) -> AppResult<Option<Holding>> {
        Ok(self.tables.lock().await.holdings.get(&id).cloned())
    }

    async fn list_holdings(&self, portfolio_id: i64) -> AppResult<Vec<Holding>> {
        let t = self.tables.lock().await;
        Ok(t.holdings
            .values()
            .filter(|h| h.portfolio_id == portfolio_id)
            .cloned()
            .collect())
    }

    async fn record_purchase(
        &self,
        portfolio_id: i64,
        symbol: &str,
        purchase: Purchase,
        now: DateTime<Utc>,
    ) -> AppResult<Holding> {
        let mut t = self.tables.lock().await;
        if !t.portfolios.contains_key(&portfolio_id) {
            return Err(AppError::not_found("Portfolio", portfolio_id));
        }
        if !t.stocks.contains_key(symbol) {
            return Err(AppError::NotFound(format!(
                "Stock not found with symbol: {symbol}"
            )));
        }

        let existing = t
            .holdings
            .values()
            .find(|h| h.portfolio_id == portfolio_id && h.stock_symbol == symbol)
            .map(|h| h.id);

        match existing {
            Some(id) => {
                let holding = t
                    .holdings
                    .get_mut(&id)
                    .ok_or_else(|| AppError::Internal(format!("holding {id} vanished")))?;
                let merged = merge_purchase(
                    Some(Position {
                        quantity: holding.quantity,
                        average_price: holding.average_purchase_price,
                        acquired_at: holding.purchase_date,
                    }),
                    purchase,
                    now,
                )?;
                holding.quantity = merged.quantity;
                holding.average_purchase_price = merged.average_price;
                Ok(holding.clone())
            }
            None => {
                let opened = merge_purchase(None, purchase, now)?;
                let id = t.next_id();
                let holding = Holding {
                    id,
                    portfolio_id,
                    stock_symbol: symbol.to_string(),
                    quantity: opened.quantity,
                    average_purchase_price: opened.average_price,
                    purchase_date: opened.acquired_at,
                };
                t.holdings.insert(id, holding.clone());
                Ok(holding)
            }
        }
    }

    async fn overwrite_holding(
        &self,
        id: i64,
        quantity: Decimal,
        average_price: Decimal,
    ) -> AppResult<Option<Holding>> {
        let mut t = self.tables.lock().await;
        Ok(t.holdings.get_mut(&id).map(|h| {
            h.quantity = quantity;
            h.average_purchase_price = average_price;
            h.clone()
        }))
    }

    async fn delete_holding(&self, id: i64) -> AppResult<bool> {
        Ok(self.tables.lock().await.holdings.remove(&id).is_some())
    }

    async fn held_symbols(&self, user_id: i64) -> AppResult<Vec<String>> {
        let t = self.tables.lock().await;
        let symbols: BTreeSet<String> = t
            .holdings
            .values()
            .filter(|h| {
                t.portfolios
                    .get(&h.portfolio_id)
                    .is_some_and(|p| p.user_id == user_id)
            })
            .map(|h| h.stock_symbol.clone())
            .collect();
        Ok(symbols.into_iter().collect())
    }

    async fn find_stock(&self, symbol: &str) -> AppResult<Option<Stock>> {
        Ok(self.tables.lock().await.stocks.get(symbol).cloned())
    }

    async fn list_stocks(&self) -> AppResult<Vec<Stock>> {
        Ok(self.tables.lock().await.stocks.values().cloned().collect())
    }

    async fn find_stocks(&self, symbols: &[String]) -> AppResult<Vec<Stock>> {
        let t = self.tables.lock().await;
        Ok(t.stocks
            .values()
            .filter(|s| symbols.contains(&s.symbol))
            .cloned()
            .collect())
    }

    async fn search_stocks(&self, query: &str) -> AppResult<Vec<Stock>> {
        let needle = query.to_lowercase();
        let t = self.tables.lock().await;
        Ok(t.stocks
            .values()
            .filter(|s| {
                s.name.to_lowercase().contains(&needle) || s.symbol.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn save_stocks(&self, stocks: &[Stock]) -> AppResult<()> {
        let mut t = self.tables.lock().await;
        for stock in stocks {
            t.stocks.insert(stock.symbol.clone(), stock.clone());
        }
        Ok(())
    }

    async fn insert_news(&self, items: &[NewNews]) -> AppResult<usize> {
        let mut t = self.tables.lock().await;
        let mut inserted = 0;
        for item in items {
            if t.news.values().any(|n| n.url == item.url) {
                continue;
            }
            let id = t.next_id();
            t.news.insert(
                id,
                News {
                    id,
                    title: item.title.clone(),
                    summary: item.summary.clone(),
                    source: item.source.clone(),
                    url: item.url.clone(),
                    image_url: item.image_url.clone(),
                    published_at: item.published_at,
                    related_symbols: item.related_symbols.clone(),
                },
            );
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn latest_news(&self, limit: usize) -> AppResult<Vec<News>> {
        let mut items: Vec<News> = self.tables.lock().await.news.values().cloned().collect();
        newest_first(&mut items);
        items.truncate(limit);
        Ok(items)
    }

    async fn news_for_symbol(&self, symbol: &str, limit: usize) -> AppResult<Vec<News>> {
        let mut items: Vec<News> = self
            .tables
            .lock()
            .await
            .news
            .values()
            .filter(|n| n.mentions(symbol))
            .cloned()
            .collect();
        newest_first(&mut items);
        items.truncate(limit);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn stock(symbol: &str, price: Decimal) -> Stock {
        Stock {
            symbol: symbol.to_string(),
            name: format!("{symbol} Inc."),
            current_price: price,
            previous_close: None,
            day_high: None,
            day_low: None,
            volume: None,
            exchange: Some("NASDAQ".to_string()),
            last_updated: Utc::now(),
        }
    }

    async fn store_with_portfolio() -> (MemoryStore, i64, i64) {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password_hash: "x".into(),
                preferred_currency: "USD".into(),
            })
            .await
            .unwrap();
        let portfolio = store
            .create_portfolio(user.id, "Growth", None)
            .await
            .unwrap();
        store.save_stocks(&[stock("AAPL", dec!(120))]).await.unwrap();
        (store, user.id, portfolio.id)
    }

    #[tokio::test]
    async fn repeated_purchase_merges_instead_of_duplicating() {
        let (store, _, portfolio_id) = store_with_portfolio().await;

        let first = store
            .record_purchase(portfolio_id, "AAPL", Purchase::new(dec!(10), dec!(100)).unwrap(), Utc::now())
            .await
            .unwrap();
        let second = store
            .record_purchase(portfolio_id, "AAPL", Purchase::new(dec!(5), dec!(130)).unwrap(), Utc::now())
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, dec!(15));
        assert_eq!(second.average_purchase_price, dec!(110.00));
        assert_eq!(store.list_holdings(portfolio_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purchase_of_unknown_stock_is_not_found() {
        let (store, _, portfolio_id) = store_with_portfolio().await;
        let err = store
            .record_purchase(portfolio_id, "NOPE", Purchase::new(dec!(1), dec!(1)).unwrap(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn deleting_portfolio_drops_its_holdings() {
        let (store, user_id, portfolio_id) = store_with_portfolio().await;
        let holding = store
            .record_purchase(portfolio_id, "AAPL", Purchase::new(dec!(1), dec!(1)).unwrap(), Utc::now())
            .await
            .unwrap();

        assert!(store.delete_portfolio(portfolio_id).await.unwrap());
        assert!(store.find_holding(holding.id).await.unwrap().is_none());
        assert!(store.held_symbols(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let (store, _, _) = store_with_portfolio().await;
        let err = store
            .create_user(NewUser {
                username: "alice".into(),
                email: "other@example.com".into(),
                password_hash: "x".into(),
                preferred_currency: "USD".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn news_with_known_url_is_skipped() {
        let store = MemoryStore::new();
        let item = NewNews {
            title: "Rally".into(),
            summary: "Stocks up".into(),
            source: "Wire".into(),
            url: "https://example.com/a".into(),
            image_url: None,
            published_at: Utc::now(),
            related_symbols: vec!["AAPL".into()],
        };
        assert_eq!(store.insert_news(&[item.clone()]).await.unwrap(), 1);
        assert_eq!(store.insert_news(&[item]).await.unwrap(), 0);
        assert_eq!(store.news_for_symbol("AAPL", 5).await.unwrap().len(), 1);
        assert!(store.news_for_symbol("AAP", 5).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_purchases_lose_no_update() {
        let (store, _, portfolio_id) = store_with_portfolio().await;
        let store = std::sync::Arc::new(store);

        let purchases: Vec<Purchase> = (1..=20)
            .map(|q| Purchase::new(Decimal::from(q), dec!(50.25)).unwrap())
            .collect();
        let handles = purchases.iter().map(|&purchase| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .record_purchase(portfolio_id, "AAPL", purchase, Utc::now())
                    .await
            })
        });
        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        let holdings = store.list_holdings(portfolio_id).await.unwrap();
        assert_eq!(holdings.len(), 1);
        let total: Decimal = purchases.iter().map(|p| p.quantity).sum();
        let cost: Decimal = purchases.iter().map(|p| p.quantity * p.price).sum();
        assert_eq!(holdings[0].quantity, total);
        assert_eq!(holdings[0].quantity, dec!(210));
        assert_eq!(holdings[0].average_purchase_price, cost / total);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mixed_price_purchases_keep_every_share() {
        let (store, _, portfolio_id) = store_with_portfolio().await;
        let store = std::sync::Arc::new(store);

        let purchases: Vec<Purchase> = (1..=20)
            .map(|i| Purchase::new(dec!(1), Decimal::from(90 + i)).unwrap())
            .collect();
        let handles = purchases.iter().map(|&purchase| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .record_purchase(portfolio_id, "AAPL", purchase, Utc::now())
                    .await
            })
        });
        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        let holdings = store.list_holdings(portfolio_id).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].quantity, dec!(20));
        // Each merge rounds to cents, so the running average may drift from
        // the exact 100.50 by at most 0.0025 per purchase.
        let drift = (holdings[0].average_purchase_price - dec!(100.50)).abs();
        assert!(drift <= dec!(0.0525), "average drifted by {drift}");
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let (store, _, _) = store_with_portfolio().await;
        assert!(store.search_stocks("_").await.unwrap().is_empty());
        assert!(store.search_stocks("%").await.unwrap().is_empty());
        assert_eq!(store.search_stocks("aap").await.unwrap().len(), 1);
    }
}
