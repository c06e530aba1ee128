use std::env;
use std::time::Duration;

pub const DEFAULT_STOCK_API_URL: &str = "https://www.alphavantage.co/query";

pub struct Config {
    pub database_url: Option<String>,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub price_refresh: Duration,
    pub news_refresh: Duration,
    pub stock_api_key: Option<String>,
    pub stock_api_url: String,
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|raw| raw.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match optional(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("Invalid {} value: {}", name, raw)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = optional("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;

        let jwt_ttl_hours = parsed::<i64>("JWT_TTL_HOURS", 24)?;
        if jwt_ttl_hours <= 0 {
            anyhow::bail!("JWT_TTL_HOURS must be positive");
        }
        let price_secs = parsed::<u64>("PRICE_REFRESH_SECS", 300)?.max(1);
        let news_secs = parsed::<u64>("NEWS_REFRESH_SECS", 3600)?.max(1);

        Ok(Config {
            database_url: optional("DATABASE_URL"),
            port: parsed::<u16>("PORT", 3001)?,
            jwt_secret,
            jwt_ttl_hours,
            price_refresh: Duration::from_secs(price_secs),
            news_refresh: Duration::from_secs(news_secs),
            stock_api_key: optional("STOCK_API_KEY"),
            stock_api_url: optional("STOCK_API_URL")
                .unwrap_or_else(|| DEFAULT_STOCK_API_URL.to_string()),
        })
    }
}
