//! Persistence behind a single trait so services can run against Postgres in
//! production and an in-memory map in tests.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::AppResult;
use crate::models::{Holding, NewNews, NewUser, News, Portfolio, Stock, User};
use crate::services::valuation::Purchase;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[async_trait]
pub trait Store: Send + Sync {
    // users
    /// Fails with `Conflict` when the username or email is already taken.
    async fn create_user(&self, user: NewUser) -> AppResult<User>;
    async fn find_user(&self, id: i64) -> AppResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>>;
    async fn update_preferred_currency(&self, user_id: i64, currency: &str) -> AppResult<Option<User>>;

    // portfolios
    async fn create_portfolio(
        &self,
        user_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Portfolio>;
    async fn find_portfolio(&self, id: i64) -> AppResult<Option<Portfolio>>;
    async fn list_portfolios(&self, user_id: i64) -> AppResult<Vec<Portfolio>>;
    async fn update_portfolio(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Option<Portfolio>>;
    /// Removes the portfolio together with its holdings.
    async fn delete_portfolio(&self, id: i64) -> AppResult<bool>;

    // holdings
    async fn find_holding(&self, id: i64) -> AppResult<Option<Holding>>;
    async fn list_holdings(&self, portfolio_id: i64) -> AppResult<Vec<Holding>>;
    /// Merges the purchase into the portfolio's holding of `symbol`, creating
    /// it when absent. The read and the write are serialised per holding.
    async fn record_purchase(
        &self,
        portfolio_id: i64,
        symbol: &str,
        purchase: Purchase,
        now: DateTime<Utc>,
    ) -> AppResult<Holding>;
    async fn overwrite_holding(
        &self,
        id: i64,
        quantity: Decimal,
        average_price: Decimal,
    ) -> AppResult<Option<Holding>>;
    async fn delete_holding(&self, id: i64) -> AppResult<bool>;
    /// Distinct symbols held across all of the user's portfolios.
    async fn held_symbols(&self, user_id: i64) -> AppResult<Vec<String>>;

    // stocks
    async fn find_stock(&self, symbol: &str) -> AppResult<Option<Stock>>;
    async fn list_stocks(&self) -> AppResult<Vec<Stock>>;
    async fn find_stocks(&self, symbols: &[String]) -> AppResult<Vec<Stock>>;
    /// Case-insensitive match on name or symbol.
    async fn search_stocks(&self, query: &str) -> AppResult<Vec<Stock>>;
    /// Inserts or replaces each stock keyed by symbol.
    async fn save_stocks(&self, stocks: &[Stock]) -> AppResult<()>;

    // news
    /// Returns how many items were new; items whose url is already stored
    /// are skipped.
    async fn insert_news(&self, items: &[NewNews]) -> AppResult<usize>;
    /// Newest first.
    async fn latest_news(&self, limit: usize) -> AppResult<Vec<News>>;
    /// Newest first, items whose related symbols include `symbol`.
    async fn news_for_symbol(&self, symbol: &str, limit: usize) -> AppResult<Vec<News>>;
}
