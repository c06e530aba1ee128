use crate::auth::AuthManager;
use crate::services::currency::CurrencySource;
use crate::services::market::{PriceFeed, QuoteSource};
use crate::services::news::{NewsService, NewsSource};
use crate::services::portfolio::PortfolioService;
use crate::services::stocks::StockService;
use crate::services::users::UserService;
use crate::storage::Store;
use std::sync::Arc;

/// Buffered price batches per live subscriber before it starts lagging.
pub const PRICE_FEED_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthManager>,
    pub users: Arc<UserService>,
    pub stocks: Arc<StockService>,
    pub portfolios: Arc<PortfolioService>,
    pub news: Arc<NewsService>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        auth: AuthManager,
        quotes: Arc<dyn QuoteSource>,
        news_source: Arc<dyn NewsSource>,
        currency: Arc<dyn CurrencySource>,
    ) -> Self {
        let auth = Arc::new(auth);
        Self {
            users: Arc::new(UserService::new(store.clone(), auth.clone(), currency.clone())),
            stocks: Arc::new(StockService::new(
                store.clone(),
                currency.clone(),
                quotes,
                PriceFeed::new(PRICE_FEED_CAPACITY),
            )),
            portfolios: Arc::new(PortfolioService::new(store.clone(), currency)),
            news: Arc::new(NewsService::new(store, news_source)),
            auth,
        }
    }
}
