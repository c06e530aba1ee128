use crate::error::AppResult;
use crate::models::{NewNews, News};
use crate::storage::Store;
use crate::utils::normalize_symbol;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

pub const MAX_NEWS_COUNT: usize = 100;

/// Provider of fresh market headlines.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch(&self, now: DateTime<Utc>) -> AppResult<Vec<NewNews>>;
}

/// Three canned headlines, stamped relative to the fetch time.
#[derive(Default)]
pub struct MockNewsFeed;

#[async_trait]
impl NewsSource for MockNewsFeed {
    async fn fetch(&self, now: DateTime<Utc>) -> AppResult<Vec<NewNews>> {
        let item = |title: &str, summary: &str, source: &str, slug: &str, age_hours: i64, symbols: &[&str]| NewNews {
            title: title.to_string(),
            summary: summary.to_string(),
            source: source.to_string(),
            url: format!("https://example.com/{slug}"),
            image_url: Some(format!("https://example.com/images/{slug}.jpg")),
            published_at: now - Duration::hours(age_hours),
            related_symbols: symbols.iter().map(|s| s.to_string()).collect(),
        };

        Ok(vec![
            item(
                "Tech Stocks Rally on Strong Earnings",
                "Major tech companies reported better-than-expected earnings, driving market gains.",
                "Financial Times",
                "news1",
                0,
                &["AAPL", "MSFT", "GOOGL"],
            ),
            item(
                "Fed Signals Interest Rate Cut",
                "The Federal Reserve indicated it may cut interest rates in the coming months.",
                "Wall Street Journal",
                "news2",
                1,
                &["SPY", "QQQ"],
            ),
            item(
                "Oil Prices Surge Amid Middle East Tensions",
                "Crude oil prices jumped 3% as geopolitical tensions escalated.",
                "Bloomberg",
                "news3",
                2,
                &["XOM", "CVX"],
            ),
        ])
    }
}

pub struct NewsService {
    store: Arc<dyn Store>,
    source: Arc<dyn NewsSource>,
}

impl NewsService {
    pub fn new(store: Arc<dyn Store>, source: Arc<dyn NewsSource>) -> Self {
        Self { store, source }
    }

    pub async fn latest(&self, count: usize) -> AppResult<Vec<News>> {
        self.store.latest_news(count.min(MAX_NEWS_COUNT)).await
    }

    pub async fn for_stock(&self, symbol: &str, count: usize) -> AppResult<Vec<News>> {
        self.store
            .news_for_symbol(&normalize_symbol(symbol), count.min(MAX_NEWS_COUNT))
            .await
    }

    /// News for every symbol the user holds, newest first. A user holding
    /// nothing gets the general latest news instead.
    pub async fn for_user(&self, user_id: i64, count: usize) -> AppResult<Vec<News>> {
        let count = count.min(MAX_NEWS_COUNT);
        let symbols = self.store.held_symbols(user_id).await?;
        if symbols.is_empty() {
            return self.latest(count).await;
        }

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for symbol in &symbols {
            for news in self.store.news_for_symbol(symbol, count).await? {
                if seen.insert(news.id) {
                    items.push(news);
                }
            }
        }
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(b.id.cmp(&a.id)));
        items.truncate(count);
        Ok(items)
    }

    /// Pulls from the source and stores whatever is new.
    pub async fn run_refresh(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let items = self.source.fetch(now).await?;
        let inserted = self.store.insert_news(&items).await?;
        info!("News refresh stored {} of {} items", inserted, items.len());
        Ok(inserted)
    }
}
