//! Registration, login and session management.

mod password;
mod token;

pub use password::{Argon2PasswordService, PasswordService};
pub use token::{
    Claims, DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS, JwtTokenService, TokenKind,
    TokenPair, TokenService,
};

use chrono::{Duration, Utc};
use common::UserId;
use domain::account::validation::{normalize_email, validate_name, validate_password};
use domain::{PublicUser, Role, User};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use store::Store;

use crate::error::{Result, ServiceError};

/// How long a password-reset token stays valid.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 60;

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";
const INVALID_RESET_TOKEN: &str = "Invalid or expired reset token";

/// The verified caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// A signed-in user with fresh tokens.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: PublicUser,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Input for [`AuthService::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

/// Service for credentials and sessions.
pub struct AuthService<S, T, P>
where
    S: Store,
    T: TokenService,
    P: PasswordService,
{
    store: S,
    tokens: T,
    passwords: P,
}

impl<S, T, P> AuthService<S, T, P>
where
    S: Store,
    T: TokenService,
    P: PasswordService,
{
    pub fn new(store: S, tokens: T, passwords: P) -> Self {
        Self {
            store,
            tokens,
            passwords,
        }
    }

    /// Creates a customer account and signs it in.
    #[tracing::instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: Registration) -> Result<AuthSession> {
        validate_name(&registration.name)?;
        let email = normalize_email(&registration.email)?;
        validate_password("password", &registration.password)?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict("Email already registered".to_string()));
        }

        let hash = self.passwords.hash(&registration.password).await?;
        let now = Utc::now();
        let mut user = User::register(&registration.name, &email, hash, registration.phone, now)?;
        let tokens = self.tokens.issue_pair(&user, now)?;
        user.set_refresh_token(Some(tokens.refresh_token.clone()), now);
        self.store.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, "user registered");
        Ok(AuthSession {
            user: user.public(),
            tokens,
        })
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        let unauthorized = || ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string());

        let email = normalize_email(email).map_err(|_| unauthorized())?;
        let mut user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or_else(unauthorized)?;
        if !self.passwords.verify(password, &user.password_hash).await? {
            return Err(unauthorized());
        }

        let tokens = self.start_session(&mut user).await?;
        tracing::info!(user_id = %user.id, "user logged in");
        Ok(AuthSession {
            user: user.public(),
            tokens,
        })
    }

    /// Rotates a session. The presented token must be the one last issued.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let unauthorized = || ServiceError::Unauthorized(INVALID_REFRESH_TOKEN.to_string());

        let claims = self
            .tokens
            .verify(refresh_token, TokenKind::Refresh, Utc::now())
            .map_err(|_| unauthorized())?;
        let mut user = self
            .store
            .get_user(claims.sub)
            .await?
            .filter(|user| user.refresh_token.as_deref() == Some(refresh_token))
            .ok_or_else(unauthorized)?;

        self.start_session(&mut user).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn logout(&self, user_id: UserId) -> Result<()> {
        let mut user = self.user(user_id).await?;
        user.set_refresh_token(None, Utc::now());
        self.store.update_user(&user).await?;
        Ok(())
    }

    /// Resolves an access token to the current state of its user.
    pub async fn authenticate(&self, access_token: &str) -> Result<Identity> {
        let claims = self
            .tokens
            .verify(access_token, TokenKind::Access, Utc::now())?;
        let user = self
            .store
            .get_user(claims.sub)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("User no longer exists".to_string()))?;

        Ok(Identity {
            user_id: user.id,
            email: user.email,
            role: user.role,
        })
    }

    /// Changes the password and ends the current session.
    #[tracing::instrument(skip(self, current, new))]
    pub async fn change_password(&self, user_id: UserId, current: &str, new: &str) -> Result<()> {
        let mut user = self.user(user_id).await?;
        if !self.passwords.verify(current, &user.password_hash).await? {
            return Err(ServiceError::Unauthorized(
                "Current password is incorrect".to_string(),
            ));
        }
        validate_password("newPassword", new)?;

        let hash = self.passwords.hash(new).await?;
        user.set_password(hash, Utc::now());
        self.store.update_user(&user).await?;

        tracing::info!(user_id = %user.id, "password changed");
        Ok(())
    }

    /// Starts a password reset. Returns the raw token for a known e-mail and
    /// `None` otherwise, so callers can answer both cases identically.
    #[tracing::instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<String>> {
        let Ok(email) = normalize_email(email) else {
            return Ok(None);
        };
        let Some(mut user) = self.store.find_user_by_email(&email).await? else {
            return Ok(None);
        };

        let token = hex::encode(rand::rng().random::<[u8; 32]>());
        let now = Utc::now();
        user.start_password_reset(
            hash_reset_token(&token),
            now + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
            now,
        );
        self.store.update_user(&user).await?;

        tracing::info!(user_id = %user.id, "password reset requested");
        Ok(Some(token))
    }

    #[tracing::instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        let token_hash = hash_reset_token(token);
        let now = Utc::now();
        let mut user = self
            .store
            .find_user_by_reset_token(&token_hash)
            .await?
            .filter(|user| user.reset_token_matches(&token_hash, now))
            .ok_or_else(|| ServiceError::InvalidArgument(INVALID_RESET_TOKEN.to_string()))?;
        validate_password("password", new_password)?;

        let hash = self.passwords.hash(new_password).await?;
        user.set_password(hash, now);
        self.store.update_user(&user).await?;

        tracing::info!(user_id = %user.id, "password reset");
        Ok(())
    }

    async fn start_session(&self, user: &mut User) -> Result<TokenPair> {
        let now = Utc::now();
        let tokens = self.tokens.issue_pair(user, now)?;
        user.set_refresh_token(Some(tokens.refresh_token.clone()), now);
        self.store.update_user(user).await?;
        Ok(tokens)
    }

    async fn user(&self, user_id: UserId) -> Result<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }
}

fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
