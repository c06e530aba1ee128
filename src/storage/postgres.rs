use super::Store;
use crate::error::{AppError, AppResult};
use crate::models::{Holding, NewNews, NewUser, News, Portfolio, Stock, User};
use crate::services::valuation::{merge_purchase, Position, Purchase};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

const USER_COLUMNS: &str = "id, username, email, password_hash, preferred_currency";
const PORTFOLIO_COLUMNS: &str = "id, user_id, name, description, created_at";
const HOLDING_COLUMNS: &str =
    "id, portfolio_id, stock_symbol, quantity, average_purchase_price, purchase_date";
const STOCK_COLUMNS: &str =
    "symbol, name, current_price, previous_close, day_high, day_low, volume, exchange, last_updated";
const NEWS_COLUMNS: &str =
    "id, title, summary, source, url, image_url, published_at, related_symbols";

#[derive(sqlx::FromRow)]
struct NewsRow {
    id: i64,
    title: String,
    summary: String,
    source: String,
    url: String,
    image_url: Option<String>,
    published_at: DateTime<Utc>,
    related_symbols: String,
}

impl From<NewsRow> for News {
    fn from(row: NewsRow) -> Self {
        News {
            id: row.id,
            title: row.title,
            summary: row.summary,
            source: row.source,
            url: row.url,
            image_url: row.image_url,
            published_at: row.published_at,
            related_symbols: row
                .related_symbols
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Postgres-backed store using runtime-checked sqlx queries.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_holding(
        tx: &mut Transaction<'_, Postgres>,
        portfolio_id: i64,
        symbol: &str,
    ) -> AppResult<Option<Holding>> {
        let holding = sqlx::query_as::<_, Holding>(&format!(
            "SELECT {HOLDING_COLUMNS} FROM stock_holdings
             WHERE portfolio_id = $1 AND stock_symbol = $2 FOR UPDATE"
        ))
        .bind(portfolio_id)
        .bind(symbol)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(holding)
    }

    async fn merge_into(
        tx: &mut Transaction<'_, Postgres>,
        held: Holding,
        purchase: Purchase,
        now: DateTime<Utc>,
    ) -> AppResult<Holding> {
        let merged = merge_purchase(
            Some(Position {
                quantity: held.quantity,
                average_price: held.average_purchase_price,
                acquired_at: held.purchase_date,
            }),
            purchase,
            now,
        )?;
        let holding = sqlx::query_as::<_, Holding>(&format!(
            "UPDATE stock_holdings SET quantity = $1, average_purchase_price = $2
             WHERE id = $3 RETURNING {HOLDING_COLUMNS}"
        ))
        .bind(merged.quantity)
        .bind(merged.average_price)
        .bind(held.id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(holding)
    }
}

/// `ILIKE` pattern matching `query` anywhere, with its wildcards taken
/// literally.
fn contains_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.trim().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn conflict_or(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let message = match db.constraint() {
                Some(c) if c.contains("email") => "Email is already in use",
                _ => "Username is already taken",
            };
            return AppError::Conflict(message.to_string());
        }
    }
    AppError::Database(err)
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, password_hash, preferred_currency)
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.preferred_currency)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_or)
    }

    async fn find_user(&self, id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_preferred_currency(&self, user_id: i64, currency: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET preferred_currency = $1 WHERE id = $2 RETURNING {USER_COLUMNS}"
        ))
        .bind(currency)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_portfolio(
        &self,
        user_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Portfolio> {
        let portfolio = sqlx::query_as::<_, Portfolio>(&format!(
            "INSERT INTO portfolios (user_id, name, description, created_at)
             VALUES ($1, $2, $3, NOW()) RETURNING {PORTFOLIO_COLUMNS}"
        ))
        .bind(user_id)
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Ok(portfolio)
    }

    async fn find_portfolio(&self, id: i64) -> AppResult<Option<Portfolio>> {
        let portfolio = sqlx::query_as::<_, Portfolio>(&format!(
            "SELECT {PORTFOLIO_COLUMNS} FROM portfolios WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(portfolio)
    }

    async fn list_portfolios(&self, user_id: i64) -> AppResult<Vec<Portfolio>> {
        let portfolios = sqlx::query_as::<_, Portfolio>(&format!(
            "SELECT {PORTFOLIO_COLUMNS} FROM portfolios WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(portfolios)
    }

    async fn update_portfolio(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Option<Portfolio>> {
        let portfolio = sqlx::query_as::<_, Portfolio>(&format!(
            "UPDATE portfolios SET name = $1, description = $2 WHERE id = $3
             RETURNING {PORTFOLIO_COLUMNS}"
        ))
        .bind(name)
        .bind(description)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(portfolio)
    }

    async fn delete_portfolio(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM portfolios WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_holding(&self, id: i64) -> AppResult<Option<Holding>> {
        let holding = sqlx::query_as::<_, Holding>(&format!(
            "SELECT {HOLDING_COLUMNS} FROM stock_holdings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(holding)
    }

    async fn list_holdings(&self, portfolio_id: i64) -> AppResult<Vec<Holding>> {
        let holdings = sqlx::query_as::<_, Holding>(&format!(
            "SELECT {HOLDING_COLUMNS} FROM stock_holdings WHERE portfolio_id = $1 ORDER BY id"
        ))
        .bind(portfolio_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(holdings)
    }

    async fn record_purchase(
        &self,
        portfolio_id: i64,
        symbol: &str,
        purchase: Purchase,
        now: DateTime<Utc>,
    ) -> AppResult<Holding> {
        let mut tx = self.pool.begin().await?;

        let portfolio: Option<i64> = sqlx::query_scalar("SELECT id FROM portfolios WHERE id = $1")
            .bind(portfolio_id)
            .fetch_optional(&mut *tx)
            .await?;
        if portfolio.is_none() {
            return Err(AppError::not_found("Portfolio", portfolio_id));
        }
        let stock: Option<String> = sqlx::query_scalar("SELECT symbol FROM stocks WHERE symbol = $1")
            .bind(symbol)
            .fetch_optional(&mut *tx)
            .await?;
        if stock.is_none() {
            return Err(AppError::NotFound(format!(
                "Stock not found with symbol: {symbol}"
            )));
        }

        let holding = match Self::lock_holding(&mut tx, portfolio_id, symbol).await? {
            Some(held) => Self::merge_into(&mut tx, held, purchase, now).await?,
            None => {
                let opened = merge_purchase(None, purchase, now)?;
                let inserted = sqlx::query_as::<_, Holding>(&format!(
                    "INSERT INTO stock_holdings
                        (portfolio_id, stock_symbol, quantity, average_purchase_price, purchase_date)
                     VALUES ($1, $2, $3, $4, $5)
                     ON CONFLICT (portfolio_id, stock_symbol) DO NOTHING
                     RETURNING {HOLDING_COLUMNS}"
                ))
                .bind(portfolio_id)
                .bind(symbol)
                .bind(opened.quantity)
                .bind(opened.average_price)
                .bind(opened.acquired_at)
                .fetch_optional(&mut *tx)
                .await?;

                match inserted {
                    Some(h) => h,
                    None => {
                        // Another purchase created the row first; merge into it.
                        debug!("Holding {} in portfolio {} created concurrently", symbol, portfolio_id);
                        let held = Self::lock_holding(&mut tx, portfolio_id, symbol)
                            .await?
                            .ok_or_else(|| AppError::Internal("holding disappeared after conflict".into()))?;
                        Self::merge_into(&mut tx, held, purchase, now).await?
                    }
                }
            }
        };

        tx.commit().await?;
        Ok(holding)
    }

    async fn overwrite_holding(
        &self,
        id: i64,
        quantity: Decimal,
        average_price: Decimal,
    ) -> AppResult<Option<Holding>> {
        let holding = sqlx::query_as::<_, Holding>(&format!(
            "UPDATE stock_holdings SET quantity = $1, average_purchase_price = $2
             WHERE id = $3 RETURNING {HOLDING_COLUMNS}"
        ))
        .bind(quantity)
        .bind(average_price)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(holding)
    }

    async fn delete_holding(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM stock_holdings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn held_symbols(&self, user_id: i64) -> AppResult<Vec<String>> {
        let symbols = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT h.stock_symbol FROM stock_holdings h
             JOIN portfolios p ON p.id = h.portfolio_id
             WHERE p.user_id = $1 ORDER BY h.stock_symbol",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(symbols)
    }

    async fn find_stock(&self, symbol: &str) -> AppResult<Option<Stock>> {
        let stock = sqlx::query_as::<_, Stock>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stocks WHERE symbol = $1"
        ))
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(stock)
    }

    async fn list_stocks(&self) -> AppResult<Vec<Stock>> {
        let stocks = sqlx::query_as::<_, Stock>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stocks ORDER BY symbol"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(stocks)
    }

    async fn find_stocks(&self, symbols: &[String]) -> AppResult<Vec<Stock>> {
        let stocks = sqlx::query_as::<_, Stock>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stocks WHERE symbol = ANY($1) ORDER BY symbol"
        ))
        .bind(symbols)
        .fetch_all(&self.pool)
        .await?;
        Ok(stocks)
    }

    async fn search_stocks(&self, query: &str) -> AppResult<Vec<Stock>> {
        let stocks = sqlx::query_as::<_, Stock>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stocks
             WHERE name ILIKE $1 ESCAPE '\\' OR symbol ILIKE $1 ESCAPE '\\' ORDER BY symbol"
        ))
        .bind(contains_pattern(query))
        .fetch_all(&self.pool)
        .await?;
        Ok(stocks)
    }

    async fn save_stocks(&self, stocks: &[Stock]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        for stock in stocks {
            sqlx::query(&format!(
                "INSERT INTO stocks ({STOCK_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (symbol) DO UPDATE SET
                    name = EXCLUDED.name,
                    current_price = EXCLUDED.current_price,
                    previous_close = EXCLUDED.previous_close,
                    day_high = EXCLUDED.day_high,
                    day_low = EXCLUDED.day_low,
                    volume = EXCLUDED.volume,
                    exchange = EXCLUDED.exchange,
                    last_updated = EXCLUDED.last_updated"
            ))
            .bind(&stock.symbol)
            .bind(&stock.name)
            .bind(stock.current_price)
            .bind(stock.previous_close)
            .bind(stock.day_high)
            .bind(stock.day_low)
            .bind(stock.volume)
            .bind(&stock.exchange)
            .bind(stock.last_updated)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_news(&self, items: &[NewNews]) -> AppResult<usize> {
        let mut inserted = 0;
        for item in items {
            let result = sqlx::query(
                "INSERT INTO stock_news
                    (title, summary, source, url, image_url, published_at, related_symbols)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (url) DO NOTHING",
            )
            .bind(&item.title)
            .bind(&item.summary)
            .bind(&item.source)
            .bind(&item.url)
            .bind(&item.image_url)
            .bind(item.published_at)
            .bind(item.related_symbols.join(","))
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        Ok(inserted)
    }

    async fn latest_news(&self, limit: usize) -> AppResult<Vec<News>> {
        let rows = sqlx::query_as::<_, NewsRow>(&format!(
            "SELECT {NEWS_COLUMNS} FROM stock_news ORDER BY published_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(News::from).collect())
    }

    async fn news_for_symbol(&self, symbol: &str, limit: usize) -> AppResult<Vec<News>> {
        let rows = sqlx::query_as::<_, NewsRow>(&format!(
            "SELECT {NEWS_COLUMNS} FROM stock_news
             WHERE $1 = ANY(string_to_array(related_symbols, ','))
             ORDER BY published_at DESC, id DESC LIMIT $2"
        ))
        .bind(symbol)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(News::from).collect())
    }
}
