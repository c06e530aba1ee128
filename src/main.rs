use std::sync::Arc;
use stock_backend::{
    app_router,
    auth::AuthManager,
    config::Config,
    database::Database,
    scheduler::{self, Intervals},
    services::{
        currency::StaticRates,
        market::{AlphaVantageQuotes, QuoteSource, RandomWalkQuotes},
        news::MockNewsFeed,
    },
    state::AppState,
    storage::{MemoryStore, PgStore, Store},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stock_backend=debug,tower_http=debug")),
        )
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => {
            let db = Database::new(url).await?;
            db.ensure_schema().await?;
            Arc::new(PgStore::new(db.pool().clone()))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store (data is lost on exit)");
            Arc::new(MemoryStore::new())
        }
    };

    let quotes: Arc<dyn QuoteSource> = match config.stock_api_key.clone() {
        Some(key) => Arc::new(AlphaVantageQuotes::new(config.stock_api_url.clone(), key)),
        None => Arc::new(RandomWalkQuotes),
    };
    tracing::info!("Quote source: {}", quotes.name());

    let state = AppState::new(
        store,
        AuthManager::new(
            config.jwt_secret.as_bytes(),
            chrono::Duration::hours(config.jwt_ttl_hours),
        ),
        quotes,
        Arc::new(MockNewsFeed),
        Arc::new(StaticRates::new()),
    );
    state.stocks.seed_defaults().await?;

    let jobs = scheduler::start(
        state.clone(),
        Intervals {
            prices: config.price_refresh,
            news: config.news_refresh,
        },
    );

    let app = app_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Stock backend listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    jobs.abort();
    tracing::info!("Stock backend stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
