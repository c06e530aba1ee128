use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::env;

#[derive(Debug, sqlx::FromRow)]
struct StalePrice {
    symbol: String,
    current_price: Decimal,
    last_updated: DateTime<Utc>,
}

const TABLES: &[&str] = &["users", "portfolios", "stock_holdings", "stocks", "stock_news"];

fn redact_database_url(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("********"));
            }
            parsed.to_string()
        }
        Err(_) => "<invalid DATABASE_URL>".to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;

    println!("Connecting to {}", redact_database_url(&database_url));
    let pool = PgPool::connect(&database_url).await?;

    println!("--- DIAGNOSTIC REPORT ---");

    // 1. Row counts
    for table in TABLES {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await?;
        println!("{table:<16} {count}");
    }

    // 2. Prices the refresh loop has not touched lately
    let cutoff = Utc::now() - Duration::hours(1);
    let stale = sqlx::query_as::<_, StalePrice>(
        "SELECT symbol, current_price, last_updated FROM stocks WHERE last_updated < $1 ORDER BY last_updated",
    )
    .bind(cutoff)
    .fetch_all(&pool)
    .await?;

    if stale.is_empty() {
        println!("\nAll prices refreshed within the last hour");
    } else {
        println!("\nStale prices: {}", stale.len());
        for s in stale {
            println!("  {} @ {} (last updated {})", s.symbol, s.current_price, s.last_updated);
        }
    }

    println!("--- END REPORT ---");
    Ok(())
}
