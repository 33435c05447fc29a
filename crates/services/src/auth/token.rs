//! Bearer tokens: HS256-signed JWTs.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use common::UserId;
use domain::{Role, User};
use hmac::{Hmac, Mac};
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Result, ServiceError};

type HmacSha256 = Hmac<Sha256>;

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Default refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Which of the pair a token is. A refresh token never authenticates a
/// request and an access token never rotates a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub email: String,
    pub role: Role,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
    /// Random nonce so two tokens issued in the same second differ.
    pub jti: String,
}

/// An access/refresh token pair handed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and verifies bearer credentials.
pub trait TokenService: Send + Sync {
    fn issue(&self, user: &User, kind: TokenKind, now: DateTime<Utc>) -> Result<String>;

    /// Checks signature, expiry and kind, returning the claims.
    fn verify(&self, token: &str, kind: TokenKind, now: DateTime<Utc>) -> Result<Claims>;

    fn issue_pair(&self, user: &User, now: DateTime<Utc>) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(user, TokenKind::Access, now)?,
            refresh_token: self.issue(user, TokenKind::Refresh, now)?,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// HS256 JWT implementation of [`TokenService`].
pub struct JwtTokenService {
    secret: SecretString,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtTokenService {
    pub fn new(secret: SecretString, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            secret,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Uses the default lifetimes.
    pub fn with_secret(secret: SecretString) -> Self {
        Self::new(
            secret,
            Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            Duration::seconds(DEFAULT_REFRESH_TTL_SECS),
        )
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| ServiceError::Internal(format!("invalid signing key: {e}")))
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }
}

impl TokenService for JwtTokenService {
    fn issue(&self, user: &User, kind: TokenKind, now: DateTime<Utc>) -> Result<String> {
        let header = Header {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            typ: kind,
            iat: now.timestamp(),
            exp: (now + self.ttl(kind)).timestamp(),
            jti: hex::encode(rand::rng().random::<[u8; 12]>()),
        };

        let header = serde_json::to_vec(&header)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        let claims = serde_json::to_vec(&claims)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }

    fn verify(&self, token: &str, kind: TokenKind, now: DateTime<Utc>) -> Result<Claims> {
        let invalid = || ServiceError::Unauthorized("Invalid token".to_string());

        let mut parts = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;
        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(claims.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let header: Header = URL_SAFE_NO_PAD
            .decode(header)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(invalid)?;
        if header.alg != "HS256" {
            return Err(invalid());
        }

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(claims)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(invalid)?;

        if claims.exp <= now.timestamp() {
            return Err(ServiceError::Unauthorized("Token expired".to_string()));
        }
        if claims.typ != kind {
            return Err(invalid());
        }
        Ok(claims)
    }
}
