use sqlx::PgPool;
use tracing::info;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        preferred_currency TEXT NOT NULL DEFAULT 'USD'
    )",
    "CREATE TABLE IF NOT EXISTS portfolios (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS stocks (
        symbol TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        current_price NUMERIC NOT NULL,
        previous_close NUMERIC,
        day_high NUMERIC,
        day_low NUMERIC,
        volume BIGINT,
        exchange TEXT,
        last_updated TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS stock_holdings (
        id BIGSERIAL PRIMARY KEY,
        portfolio_id BIGINT NOT NULL REFERENCES portfolios(id) ON DELETE CASCADE,
        stock_symbol TEXT NOT NULL REFERENCES stocks(symbol),
        quantity NUMERIC NOT NULL CHECK (quantity >= 0),
        average_purchase_price NUMERIC NOT NULL CHECK (average_purchase_price >= 0),
        purchase_date TIMESTAMPTZ NOT NULL,
        UNIQUE (portfolio_id, stock_symbol)
    )",
    "CREATE TABLE IF NOT EXISTS stock_news (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        summary TEXT NOT NULL,
        source TEXT NOT NULL,
        url TEXT NOT NULL UNIQUE,
        image_url TEXT,
        published_at TIMESTAMPTZ NOT NULL,
        related_symbols TEXT NOT NULL DEFAULT ''
    )",
    "CREATE INDEX IF NOT EXISTS stock_news_published_at_idx ON stock_news (published_at DESC)",
];

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let options = database_url
            .parse::<sqlx::postgres::PgConnectOptions>()?
            .statement_cache_capacity(0);

        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Creates any missing tables. Safe to run on every start.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema ready ({} statements)", SCHEMA.len());
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
