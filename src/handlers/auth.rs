// handlers/auth.rs - login, me, logout, refresh
//
// Only /login is reachable without a token. The other three resolve the
// bearer token themselves so each can report its own error code.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::IssuedToken;
use crate::database::models::UserProfile;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, BearerToken, Message};
use crate::server::AppState;
use crate::validation::{self, FieldErrors};

const TOKEN_TYPE: &str = "bearer";

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Validate)]
struct LoginForm {
    #[validate(
        required(message = "The email is required."),
        email(message = "The email must be a valid email address.")
    )]
    email: Option<String>,
    #[validate(required(message = "The password is required."))]
    password: Option<String>,
}

impl LoginForm {
    fn new(request: LoginRequest) -> Self {
        Self {
            email: validation::normalize(request.email),
            // passwords are compared verbatim, only emptiness is checked
            password: request.password.filter(|p| !p.is_empty()),
        }
    }

    fn credentials(self) -> Result<(String, String), FieldErrors> {
        validation::validate(&self)?;
        match (self.email, self.password) {
            (Some(email), Some(password)) => Ok((email, password)),
            _ => Err(FieldErrors::default()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token,
            token_type: TOKEN_TYPE,
            expires_in: issued.expires_in,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserProfile,
}

/// POST /login - exchange email and password for a bearer token
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<LoginResponse> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (email, password) = LoginForm::new(request).credentials()?;

    let (issued, user) = state.sessions.login(&email, &password).await?;

    Ok(ApiResponse::success(LoginResponse {
        token: issued.token,
        token_type: TOKEN_TYPE,
        expires_in: issued.expires_in,
        user: UserProfile::from(&user),
    }))
}

/// GET /me - profile of the token's owner
pub async fn me(State(state): State<AppState>, token: BearerToken) -> ApiResult<MeResponse> {
    let session = state
        .sessions
        .current_user(token.as_deref())
        .await?
        .ok_or(ApiError::NotAuthenticated)?;

    Ok(ApiResponse::success(MeResponse {
        user: UserProfile::from(&session.user),
    }))
}

/// POST /logout - invalidate the presented token
pub async fn logout(State(state): State<AppState>, token: BearerToken) -> ApiResult<Message> {
    state.sessions.logout(token.as_deref()).await?;
    Ok(ApiResponse::success(Message::new("Successfully logged out.")))
}

/// POST /refresh - trade the presented token for a new one
pub async fn refresh(State(state): State<AppState>, token: BearerToken) -> ApiResult<TokenResponse> {
    let issued = state.sessions.refresh(token.as_deref()).await?;
    Ok(ApiResponse::success(TokenResponse::from(issued)))
}
