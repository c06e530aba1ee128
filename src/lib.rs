use axum::{
    http::Method,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

use handlers::{auth as auth_routes, news, portfolios, prices, stocks, users};
use state::AppState;

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(auth_routes::register))
        .route("/api/auth/login", post(auth_routes::login))
        .route("/api/users/me", get(users::me))
        .route("/api/users/currency", put(users::update_currency))
        .route("/api/stocks/public/search", get(stocks::search))
        .route("/api/stocks/public/:symbol", get(stocks::public_quote))
        .route("/api/stocks/batch", get(stocks::batch))
        .route("/api/stocks/:symbol", get(stocks::quote))
        .route("/api/portfolios", get(portfolios::list).post(portfolios::create))
        .route(
            "/api/portfolios/:id",
            get(portfolios::get).put(portfolios::update).delete(portfolios::delete),
        )
        .route("/api/portfolios/:id/stocks", post(portfolios::add_holding))
        .route(
            "/api/portfolios/:id/stocks/:holding_id",
            put(portfolios::update_holding).delete(portfolios::remove_holding),
        )
        .route("/api/news", get(news::latest))
        .route("/api/news/stock/:symbol", get(news::for_stock))
        .route("/api/news/portfolio", get(news::for_portfolio))
        .route("/ws/prices", get(prices::subscribe))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers(Any),
        )
}

async fn health_check() -> &'static str {
    "OK"
}
