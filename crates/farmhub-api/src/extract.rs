//! Bearer-token extractors.
//!
//! [`AuthUser`] resolves the `Authorization: Bearer <access>` header to an
//! active account; [`AdminUser`] additionally requires a role that may manage
//! users. Handlers state their access requirement by which one they take.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use farmhub_core::{store::MarketStore, user::User};

use crate::{AppState, error::ApiError, token::TokenKind};

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// The authenticated caller, known to be an administrator.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
}

impl<S> FromRequestParts<AppState<S>> for AuthUser
where
  S: MarketStore + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let token = bearer_token(&parts.headers).ok_or_else(|| {
      ApiError::Unauthorized("Authentication credentials were not provided.".into())
    })?;

    let claims = state.tokens.verify(token, TokenKind::Access).map_err(|e| {
      tracing::debug!(error = %e, "rejected access token");
      ApiError::Unauthorized("Given token is not valid.".into())
    })?;

    let user = state
      .store
      .get_user(claims.user_id)
      .await
      .map_err(ApiError::store::<S>)?
      .filter(|u| u.is_active)
      .ok_or_else(|| ApiError::Unauthorized("User not found or inactive.".into()))?;

    Ok(Self(user))
  }
}

impl<S> FromRequestParts<AppState<S>> for AdminUser
where
  S: MarketStore + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
    if !user.user_type.can_manage_users() {
      return Err(ApiError::Forbidden("Administrator privileges required.".into()));
    }
    Ok(Self(user))
  }
}
