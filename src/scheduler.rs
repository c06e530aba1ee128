use crate::state::AppState;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

pub struct Intervals {
    pub prices: Duration,
    pub news: Duration,
}

/// Handles of the background refresh loops.
pub struct Jobs {
    pub prices: JoinHandle<()>,
    pub news: JoinHandle<()>,
}

impl Jobs {
    pub fn abort(&self) {
        self.prices.abort();
        self.news.abort();
    }
}

/// Spawns the price and news refresh loops. The first run of each happens
/// immediately; a failed run is logged and retried at the next tick.
pub fn start(state: AppState, intervals: Intervals) -> Jobs {
    info!(
        "Starting scheduler: prices every {:?}, news every {:?}",
        intervals.prices, intervals.news
    );

    let stocks = state.stocks.clone();
    let prices = tokio::spawn(async move {
        let mut ticker = interval(intervals.prices);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0u32;
        loop {
            ticker.tick().await;
            match stocks.run_price_refresh().await {
                Ok(_) if failures > 0 => {
                    info!("Price refresh recovered after {} failures", failures);
                    failures = 0;
                }
                Ok(_) => {}
                Err(e) => {
                    failures += 1;
                    error!("Price refresh failed: {}", e);
                }
            }
        }
    });

    let news = state.news.clone();
    let news = tokio::spawn(async move {
        let mut ticker = interval(intervals.news);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = news.run_refresh(Utc::now()).await {
                error!("News refresh failed: {}", e);
            }
        }
    });

    Jobs { prices, news }
}
