//! Bearer-token sessions: login, lookup, logout and refresh.

use std::sync::Arc;

use crate::database::models::user::normalize_email;
use crate::database::models::{NewUser, User};
use crate::database::{RevocationStore, UserRepository};

use super::{AuthError, Claims, IssuedToken, PasswordHasher, TokenSigner};

/// The user behind the bearer token of the current request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub claims: Claims,
}

pub struct SessionService {
    users: Arc<dyn UserRepository>,
    revocations: Arc<dyn RevocationStore>,
    signer: TokenSigner,
    hasher: PasswordHasher,
    // Verified against when the email is unknown, so both failure paths cost the same
    dummy_hash: String,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        revocations: Arc<dyn RevocationStore>,
        signer: TokenSigner,
        hasher: PasswordHasher,
    ) -> Result<Self, AuthError> {
        let dummy_hash = hasher.hash("not-a-real-password")?;
        Ok(Self {
            users,
            revocations,
            signer,
            hasher,
            dummy_hash,
        })
    }

    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<(IssuedToken, User), AuthError> {
        let email = normalize_email(email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            self.hasher.verify(password, &self.dummy_hash);
            tracing::warn!("Rejected login for unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(password, &user.password_hash) {
            tracing::warn!("Rejected login for user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        let issued = self.signer.issue(user.id)?;
        tracing::info!("User {} logged in", user.id);
        Ok((issued, user))
    }

    /// `None` for a missing, malformed, expired or revoked token, or one
    /// whose user no longer exists.
    pub async fn current_user(&self, bearer: Option<&str>) -> Result<Option<AuthUser>, AuthError> {
        let Some(token) = bearer else {
            return Ok(None);
        };

        let claims = match self.signer.verify(token) {
            Ok(claims) => claims,
            Err(AuthError::InvalidToken) => return Ok(None),
            Err(other) => return Err(other),
        };

        if self.revocations.is_revoked(&claims.jti).await? {
            tracing::debug!("Bearer token {} has been revoked", claims.jti);
            return Ok(None);
        }

        let Ok(user_id) = claims.user_id() else {
            return Ok(None);
        };

        Ok(self
            .users
            .find_by_id(user_id)
            .await?
            .map(|user| AuthUser { user, claims }))
    }

    pub async fn authenticate(&self, bearer: Option<&str>) -> Result<AuthUser, AuthError> {
        self.current_user(bearer).await?.ok_or(AuthError::NotAuthenticated)
    }

    /// Revoke the presented token.
    pub async fn logout(&self, bearer: Option<&str>) -> Result<(), AuthError> {
        let session = self.authenticate(bearer).await?;
        if !self
            .revocations
            .revoke(&session.claims.jti, session.claims.expires_at())
            .await?
        {
            return Err(AuthError::NotAuthenticated);
        }

        tracing::info!("User {} logged out", session.user.id);
        Ok(())
    }

    /// Swap the presented token for a new one; the old one stops working.
    /// Only the caller that revokes the old token gets a replacement.
    pub async fn refresh(&self, bearer: Option<&str>) -> Result<IssuedToken, AuthError> {
        let session = self
            .current_user(bearer)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !self
            .revocations
            .revoke(&session.claims.jti, session.claims.expires_at())
            .await?
        {
            tracing::warn!("Token {} was already swapped or revoked", session.claims.jti);
            return Err(AuthError::InvalidToken);
        }

        let issued = self.signer.issue(session.user.id)?;

        tracing::info!("User {} refreshed their token", session.user.id);
        Ok(issued)
    }

    /// Create an account with a freshly hashed password.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self
            .users
            .create(NewUser {
                name: name.trim().to_string(),
                email: normalize_email(email),
                password_hash: self.hasher.hash(password)?,
            })
            .await?;

        tracing::info!("Created user {} <{}>", user.id, user.email);
        Ok(user)
    }
}
