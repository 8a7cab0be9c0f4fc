//! Identity verification
//!
//! A connection presents an opaque access token exactly once, when it joins a
//! room. The `TokenVerifier` turns that token into an `Identity` or refuses
//! it; the hub never consults the verifier again for the lifetime of the
//! connection.
//!
//! `JwtVerifier` is the bundled implementation: HS256-signed JWTs carrying
//! the user id (`sub`), display name and role.

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::utils::error::AuthError;

/// The verified identity behind an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub role: String,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: String,
    pub exp: usize,
}

#[derive(Clone)]
pub struct JwtVerifier {
    secret: String,
}

impl JwtVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Sign a token for `identity` that expires `ttl_secs` from now.
    pub fn issue(&self, identity: &Identity, ttl_secs: i64) -> Result<String, AuthError> {
        let exp = TimeDelta::try_seconds(ttl_secs)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .and_then(|at| usize::try_from(at.timestamp()).ok())
            .ok_or(AuthError::InvalidLifetime(ttl_secs))?;

        let claims = Claims {
            sub: identity.user_id.clone(),
            username: identity.username.clone(),
            role: identity.role.clone(),
            exp,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(data.claims)
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self.decode_claims(token)?;

        Ok(Identity {
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
        })
    }
}
