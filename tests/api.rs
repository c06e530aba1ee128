use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use stock_backend::{
    app_router,
    auth::AuthManager,
    models::Stock,
    services::{currency::StaticRates, market::RandomWalkQuotes, news::MockNewsFeed},
    state::AppState,
    storage::{MemoryStore, Store},
};
use tower::ServiceExt;

fn stock(symbol: &str, name: &str, price: Decimal) -> Stock {
    Stock {
        symbol: symbol.to_string(),
        name: name.to_string(),
        current_price: price,
        previous_close: Some(dec!(100)),
        day_high: None,
        day_low: None,
        volume: Some(1_000),
        exchange: Some("NASDAQ".to_string()),
        last_updated: Utc::now(),
    }
}

async fn build_test_router() -> Router {
    let store = Arc::new(MemoryStore::new());
    store
        .save_stocks(&[
            stock("AAPL", "Apple Inc.", dec!(120)),
            stock("MSFT", "Microsoft Corporation", dec!(150)),
            stock("XOM", "Exxon Mobil Corporation", dec!(110)),
        ])
        .await
        .unwrap();

    let state = AppState::new(
        store,
        AuthManager::new(b"integration-secret-integration-s", Duration::hours(1)),
        Arc::new(RandomWalkQuotes),
        Arc::new(MockNewsFeed),
        Arc::new(StaticRates::new()),
    );
    state.news.run_refresh(Utc::now()).await.unwrap();
    app_router(state)
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "secret123",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["token"].as_str().unwrap().to_string()
}

async fn create_portfolio(app: &Router, token: &str, name: &str) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/portfolios",
        Some(token),
        Some(json!({ "name": name, "description": "test" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().unwrap()
}

fn dec_of(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = build_test_router().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_login_and_profile() {
    let app = build_test_router().await;
    register(&app, "alice").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();

    let (status, me) = send(&app, Method::GET, "/api/users/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alice");
    assert_eq!(me["preferredCurrency"], "USD");
    assert!(me.get("passwordHash").is_none());
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let app = build_test_router().await;
    register(&app, "alice").await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "username": "alice", "email": "other@example.com", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = build_test_router().await;
    let (status, body) = send(&app, Method::GET, "/api/portfolios", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);

    let (status, _) = send(&app, Method::GET, "/api/portfolios", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn buying_twice_merges_and_values_the_holding() {
    let app = build_test_router().await;
    let token = register(&app, "alice").await;
    let pid = create_portfolio(&app, &token, "Core").await;
    let uri = format!("/api/portfolios/{pid}/stocks");

    let (status, first) = send(
        &app,
        Method::POST,
        &uri,
        Some(&token),
        Some(json!({ "symbol": "aapl", "quantity": "10", "purchasePrice": "100" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{first}");

    let (status, merged) = send(
        &app,
        Method::POST,
        &uri,
        Some(&token),
        Some(json!({ "symbol": "AAPL", "quantity": "5", "purchasePrice": "130" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(merged["id"], first["id"]);
    assert_eq!(dec_of(&merged["quantity"]), dec!(15));
    assert_eq!(dec_of(&merged["purchasePrice"]), dec!(110));

    let (status, view) = send(&app, Method::GET, &format!("/api/portfolios/{pid}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["holdings"].as_array().unwrap().len(), 1);
    assert_eq!(dec_of(&view["totalValue"]), dec!(1800));
    assert_eq!(dec_of(&view["totalCost"]), dec!(1650));
    assert_eq!(dec_of(&view["totalProfitLoss"]), dec!(150));
    assert_eq!(dec_of(&view["totalProfitLossPercentage"]), dec!(9.09));

    let (status, list) = send(&app, Method::GET, "/api/portfolios", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["stockCount"], 1);
}

#[tokio::test]
async fn non_positive_quantity_is_a_bad_request() {
    let app = build_test_router().await;
    let token = register(&app, "alice").await;
    let pid = create_portfolio(&app, &token, "Core").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/portfolios/{pid}/stocks"),
        Some(&token),
        Some(json!({ "symbol": "AAPL", "quantity": "0", "purchasePrice": "100" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (_, view) = send(&app, Method::GET, &format!("/api/portfolios/{pid}"), Some(&token), None).await;
    assert!(view["holdings"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_symbol_is_not_found() {
    let app = build_test_router().await;
    let token = register(&app, "alice").await;
    let pid = create_portfolio(&app, &token, "Core").await;

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/portfolios/{pid}/stocks"),
        Some(&token),
        Some(json!({ "symbol": "ZZZZ", "quantity": "1", "purchasePrice": "1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn foreign_holding_is_forbidden_and_foreign_portfolio_is_hidden() {
    let app = build_test_router().await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let alices = create_portfolio(&app, &alice, "Alice").await;
    let bobs = create_portfolio(&app, &bob, "Bob").await;

    let (_, holding) = send(
        &app,
        Method::POST,
        &format!("/api/portfolios/{alices}/stocks"),
        Some(&alice),
        Some(json!({ "symbol": "AAPL", "quantity": "1", "purchasePrice": "100" })),
    )
    .await;
    let hid = holding["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/api/portfolios/{bobs}/stocks/{hid}"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 403);

    let (status, _) = send(&app, Method::GET, &format!("/api/portfolios/{alices}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, view) = send(&app, Method::GET, &format!("/api/portfolios/{alices}"), Some(&alice), None).await;
    assert_eq!(view["holdings"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn edit_and_delete_holding() {
    let app = build_test_router().await;
    let token = register(&app, "alice").await;
    let pid = create_portfolio(&app, &token, "Core").await;
    let (_, holding) = send(
        &app,
        Method::POST,
        &format!("/api/portfolios/{pid}/stocks"),
        Some(&token),
        Some(json!({ "symbol": "MSFT", "quantity": "4", "purchasePrice": "100" })),
    )
    .await;
    let hid = holding["id"].as_i64().unwrap();
    let uri = format!("/api/portfolios/{pid}/stocks/{hid}");

    let (status, edited) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({ "quantity": "2", "purchasePrice": "140" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec_of(&edited["quantity"]), dec!(2));
    assert_eq!(dec_of(&edited["currentValue"]), dec!(300));

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_portfolio_removes_it() {
    let app = build_test_router().await;
    let token = register(&app, "alice").await;
    let pid = create_portfolio(&app, &token, "Short lived").await;

    let (status, renamed) = send(
        &app,
        Method::PUT,
        &format!("/api/portfolios/{pid}"),
        Some(&token),
        Some(json!({ "name": "Renamed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "Renamed");

    let (status, _) = send(&app, Method::DELETE, &format!("/api/portfolios/{pid}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, list) = send(&app, Method::GET, "/api/portfolios", Some(&token), None).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn preferred_currency_converts_prices() {
    let app = build_test_router().await;
    let token = register(&app, "alice").await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/users/currency",
        Some(&token),
        Some(json!({ "currency": "eur" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["preferredCurrency"], "EUR");

    let (status, quote) = send(&app, Method::GET, "/api/stocks/AAPL", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["currency"], "EUR");
    assert_eq!(dec_of(&quote["currentPrice"]), dec!(109.2));
    assert_eq!(dec_of(&quote["percentChange"]), dec!(20));

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/users/currency",
        Some(&token),
        Some(json!({ "currency": "XYZ" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn public_stock_lookup_and_search() {
    let app = build_test_router().await;

    let (status, results) = send(&app, Method::GET, "/api/stocks/public/search?query=micro", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results[0]["symbol"], "MSFT");

    let (status, aapl) = send(&app, Method::GET, "/api/stocks/public/aapl", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(aapl["name"], "Apple Inc.");

    let (status, _) = send(&app, Method::GET, "/api/stocks/public/NOPE", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn batch_skips_unknown_symbols() {
    let app = build_test_router().await;
    let token = register(&app, "alice").await;
    let (status, views) = send(
        &app,
        Method::GET,
        "/api/stocks/batch?symbols=AAPL,nope,msft",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(views.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn portfolio_news_follows_holdings_or_falls_back() {
    let app = build_test_router().await;
    let token = register(&app, "alice").await;

    let (status, news) = send(&app, Method::GET, "/api/news/portfolio", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(news.as_array().unwrap().len(), 3);

    let pid = create_portfolio(&app, &token, "Energy").await;
    send(
        &app,
        Method::POST,
        &format!("/api/portfolios/{pid}/stocks"),
        Some(&token),
        Some(json!({ "symbol": "XOM", "quantity": "3", "purchasePrice": "100" })),
    )
    .await;

    let (_, news) = send(&app, Method::GET, "/api/news/portfolio", Some(&token), None).await;
    let items = news.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0]["relatedSymbols"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s == "XOM"));

    let (_, latest) = send(&app, Method::GET, "/api/news?count=2", Some(&token), None).await;
    assert_eq!(latest.as_array().unwrap().len(), 2);

    let (_, by_symbol) = send(&app, Method::GET, "/api/news/stock/spy", Some(&token), None).await;
    assert_eq!(by_symbol.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn oversized_purchase_is_refused_and_portfolio_stays_readable() {
    let app = build_test_router().await;
    let token = register(&app, "alice").await;
    let pid = create_portfolio(&app, &token, "Core").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/portfolios/{pid}/stocks"),
        Some(&token),
        Some(json!({ "symbol": "AAPL", "quantity": "1000000000000000000000000000", "purchasePrice": "1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, view) = send(&app, Method::GET, &format!("/api/portfolios/{pid}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(view["holdings"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, Method::GET, "/api/portfolios", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/api/news/portfolio", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}
