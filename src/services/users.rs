use crate::auth::AuthManager;
use crate::error::{AppError, AppResult};
use crate::models::{AuthResponse, LoginRequest, NewUser, RegisterRequest, User, DEFAULT_CURRENCY};
use crate::services::currency::{validate_currency, CurrencySource};
use crate::storage::Store;
use std::sync::Arc;
use tracing::info;

const MIN_PASSWORD_LEN: usize = 6;

pub struct UserService {
    store: Arc<dyn Store>,
    auth: Arc<AuthManager>,
    currency: Arc<dyn CurrencySource>,
}

fn auth_response(token: String, user: User) -> AuthResponse {
    AuthResponse {
        token,
        id: user.id,
        username: user.username,
        email: user.email,
        preferred_currency: user.preferred_currency,
    }
}

impl UserService {
    pub fn new(store: Arc<dyn Store>, auth: Arc<AuthManager>, currency: Arc<dyn CurrencySource>) -> Self {
        Self {
            store,
            auth,
            currency,
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        let username = request.username.trim().to_string();
        let email = request.email.trim().to_lowercase();

        if !(3..=50).contains(&username.chars().count()) {
            return Err(AppError::InvalidInput(
                "Username must be between 3 and 50 characters".to_string(),
            ));
        }
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(AppError::InvalidInput("Email is not valid".to_string()));
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::InvalidInput(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let preferred_currency = match request.preferred_currency.as_deref() {
            Some(code) => validate_currency(self.currency.as_ref(), code)?,
            None => DEFAULT_CURRENCY.to_string(),
        };

        let user = self
            .store
            .create_user(NewUser {
                username,
                email,
                password_hash: self.auth.hash_password(&request.password)?,
                preferred_currency,
            })
            .await?;
        info!("Registered user {} ({})", user.username, user.id);

        let token = self.auth.issue_token(user.id, &user.username)?;
        Ok(auth_response(token, user))
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        let user = self
            .store
            .find_user_by_username(request.username.trim())
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid username or password".to_string()))?;
        self.auth.verify_password(&request.password, &user.password_hash)?;

        let token = self.auth.issue_token(user.id, &user.username)?;
        Ok(auth_response(token, user))
    }

    pub async fn get(&self, user_id: i64) -> AppResult<User> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", user_id))
    }

    pub async fn update_currency(&self, user_id: i64, currency: &str) -> AppResult<User> {
        let code = validate_currency(self.currency.as_ref(), currency)?;
        self.store
            .update_preferred_currency(user_id, &code)
            .await?
            .ok_or_else(|| AppError::not_found("User", user_id))
    }
}
