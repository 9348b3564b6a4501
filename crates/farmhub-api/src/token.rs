//! JWT access/refresh token issuance and verification.
//!
//! Access tokens are short-lived and stateless. Refresh tokens carry a unique
//! `jti` that is recorded as outstanding when issued; a refresh token is only
//! honoured while its `jti` is absent from the blacklist.

use chrono::{DateTime, Duration, Utc};
use farmhub_core::{UserId, session::OutstandingToken};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Which half of a token pair a JWT is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
  Access,
  Refresh,
}

/// The claims carried by every token this server signs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
  pub token_type: TokenKind,
  pub user_id:    UserId,
  pub jti:        String,
  pub iat:        i64,
  pub exp:        i64,
}

/// A freshly issued access/refresh pair, as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
  pub access:  String,
  pub refresh: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
  #[error("invalid token: {0}")]
  Invalid(#[from] jsonwebtoken::errors::Error),

  #[error("expected a {expected:?} token")]
  WrongKind { expected: TokenKind },
}

/// Signs and verifies tokens with a shared HMAC secret.
pub struct TokenIssuer {
  encoding:    EncodingKey,
  decoding:    DecodingKey,
  validation:  Validation,
  access_ttl:  Duration,
  refresh_ttl: Duration,
}

impl TokenIssuer {
  pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    Self {
      encoding: EncodingKey::from_secret(secret),
      decoding: DecodingKey::from_secret(secret),
      validation,
      access_ttl,
      refresh_ttl,
    }
  }

  fn sign(
    &self,
    kind: TokenKind,
    user_id: UserId,
    now: DateTime<Utc>,
  ) -> Result<(String, Claims), TokenError> {
    let ttl = match kind {
      TokenKind::Access => self.access_ttl,
      TokenKind::Refresh => self.refresh_ttl,
    };
    let claims = Claims {
      token_type: kind,
      user_id,
      jti: Uuid::new_v4().simple().to_string(),
      iat: now.timestamp(),
      exp: (now + ttl).timestamp(),
    };
    let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
    Ok((token, claims))
  }

  /// Issue a new pair for `user_id`, returning the refresh token's record so
  /// the caller can persist it as outstanding.
  pub fn issue_pair(&self, user_id: UserId) -> Result<(TokenPair, OutstandingToken), TokenError> {
    let now = Utc::now();
    let (access, _) = self.sign(TokenKind::Access, user_id, now)?;
    let (refresh, claims) = self.sign(TokenKind::Refresh, user_id, now)?;

    let outstanding = OutstandingToken {
      jti: claims.jti,
      user_id,
      issued_at: now,
      expires_at: now + self.refresh_ttl,
    };
    tracing::debug!(user_id, jti = %outstanding.jti, "issued token pair");
    Ok((TokenPair { access, refresh }, outstanding))
  }

  /// Verify the signature and expiry of `token` and check it is of the
  /// `expected` kind.
  pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
    let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)?;
    if data.claims.token_type != expected {
      return Err(TokenError::WrongKind { expected });
    }
    Ok(data.claims)
  }
}
