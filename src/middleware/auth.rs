use std::convert::Infallible;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::server::AppState;

/// Raw bearer token of the request, if one was sent in the expected form.
/// Never rejects: what a missing token means is up to the handler.
#[derive(Debug, Clone, Default)]
pub struct BearerToken(pub Option<String>);

impl BearerToken {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(extract_bearer(&parts.headers)))
    }
}

/// Extract token from `Authorization: Bearer <token>`
fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.to_string())
    } else {
        None
    }
}

/// Guard for protected routes: resolves the bearer token to a user and
/// injects [`crate::auth::AuthUser`] into the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = state.sessions.authenticate(token.as_deref()).await?;

    tracing::debug!("Authenticated request for user {}", auth_user.user.id);
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}
