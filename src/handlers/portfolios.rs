use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{
    AddHoldingRequest, HoldingView, Portfolio, PortfolioRequest, PortfolioSummary, PortfolioView,
    UpdateHoldingRequest,
};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<PortfolioSummary>>, AppError> {
    Ok(Json(state.portfolios.summaries(user.id).await?))
}

pub async fn get(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<PortfolioView>, AppError> {
    Ok(Json(state.portfolios.get(user.id, id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<PortfolioRequest>,
) -> Result<(StatusCode, Json<Portfolio>), AppError> {
    let portfolio = state.portfolios.create(user.id, request).await?;
    Ok((StatusCode::CREATED, Json(portfolio)))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<PortfolioRequest>,
) -> Result<Json<Portfolio>, AppError> {
    Ok(Json(state.portfolios.update(user.id, id, request).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.portfolios.delete(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_holding(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<AddHoldingRequest>,
) -> Result<(StatusCode, Json<HoldingView>), AppError> {
    let holding = state.portfolios.add_holding(user.id, id, request).await?;
    Ok((StatusCode::CREATED, Json(holding)))
}

pub async fn update_holding(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, holding_id)): Path<(i64, i64)>,
    Json(request): Json<UpdateHoldingRequest>,
) -> Result<Json<HoldingView>, AppError> {
    Ok(Json(
        state
            .portfolios
            .update_holding(user.id, id, holding_id, request)
            .await?,
    ))
}

pub async fn remove_holding(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, holding_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    state.portfolios.remove_holding(user.id, id, holding_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
