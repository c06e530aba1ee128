use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::News;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CountQuery {
    pub count: Option<usize>,
}

pub async fn latest(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<CountQuery>,
) -> Result<Json<Vec<News>>, AppError> {
    Ok(Json(state.news.latest(params.count.unwrap_or(10)).await?))
}

pub async fn for_stock(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(symbol): Path<String>,
    Query(params): Query<CountQuery>,
) -> Result<Json<Vec<News>>, AppError> {
    Ok(Json(
        state
            .news
            .for_stock(&symbol, params.count.unwrap_or(5))
            .await?,
    ))
}

pub async fn for_portfolio(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<CountQuery>,
) -> Result<Json<Vec<News>>, AppError> {
    Ok(Json(
        state
            .news
            .for_user(user.id, params.count.unwrap_or(10))
            .await?,
    ))
}
