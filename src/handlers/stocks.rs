use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{Stock, StockView};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    #[serde(default)]
    pub symbols: String,
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<Stock>>, AppError> {
    Ok(Json(state.stocks.search(&params.query).await?))
}

pub async fn public_quote(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Stock>, AppError> {
    Ok(Json(state.stocks.get(&symbol).await?))
}

pub async fn quote(
    State(state): State<AppState>,
    user: AuthUser,
    Path(symbol): Path<String>,
) -> Result<Json<StockView>, AppError> {
    let currency = state.users.get(user.id).await?.preferred_currency;
    Ok(Json(state.stocks.view(&symbol, &currency).await?))
}

pub async fn batch(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<BatchQuery>,
) -> Result<Json<Vec<StockView>>, AppError> {
    let symbols: Vec<String> = params.symbols.split(',').map(str::to_string).collect();
    let currency = state.users.get(user.id).await?.preferred_currency;
    Ok(Json(state.stocks.views(&symbols, &currency).await?))
}
