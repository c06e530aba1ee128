use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{CurrencyUpdateRequest, UserProfile};
use crate::state::AppState;
use axum::{extract::State, Json};

pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserProfile>, AppError> {
    Ok(Json(state.users.get(user.id).await?.into()))
}

pub async fn update_currency(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CurrencyUpdateRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let updated = state.users.update_currency(user.id, &request.currency).await?;
    tracing::info!("User {} now prefers {}", user.username, updated.preferred_currency);
    Ok(Json(updated.into()))
}
