//! Account and session endpoints under `/auth`.

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
};
use chrono::Utc;
use farmhub_core::{
  UserId,
  store::MarketStore,
  user::{NewUser, User, UserType},
};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  envelope::ApiResponse,
  error::{ApiError, FieldErrors, NON_FIELD_ERRORS},
  extract::AuthUser,
  handlers::farms::looks_like_email,
  password::{hash_password, verify_password, weaknesses},
  token::{TokenKind, TokenPair},
};

const USERNAME_MAX: usize = 150;

// ─── Bodies ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct RegisterBody {
  pub username:         Option<String>,
  pub name:             Option<String>,
  pub email:            Option<String>,
  pub password:         Option<String>,
  pub password_confirm: Option<String>,
  #[serde(default)]
  pub marketing_agreed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginBody {
  pub username: Option<String>,
  pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshBody {
  pub refresh: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WithdrawBody {
  pub password: Option<String>,
  pub reason:   Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangePasswordBody {
  pub current_password:     Option<String>,
  pub new_password:         Option<String>,
  pub new_password_confirm: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginData {
  pub user:   User,
  pub tokens: TokenPair,
}

fn valid_username(username: &str) -> bool {
  username
    .chars()
    .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

/// Issue a token pair and remember its refresh half.
async fn open_session<S>(state: &AppState<S>, user_id: UserId) -> Result<TokenPair, ApiError>
where
  S: MarketStore + Clone + 'static,
{
  let (pair, outstanding) = state.tokens.issue_pair(user_id).map_err(ApiError::internal)?;
  state
    .store
    .record_refresh_token(outstanding)
    .await
    .map_err(ApiError::store::<S>)?;
  Ok(pair)
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// `POST /auth/register`
pub async fn register<S>(
  State(state): State<AppState<S>>,
  body: Result<Json<RegisterBody>, JsonRejection>,
) -> Result<ApiResponse<User>, ApiError>
where
  S: MarketStore + Clone + 'static,
{
  let Json(body) = body?;
  let mut errors = FieldErrors::new();

  let username = errors.require("username", body.username);
  if !username.is_empty() {
    if username.chars().count() > USERNAME_MAX {
      errors.add("username", "Ensure this field has no more than 150 characters.");
    } else if !valid_username(&username) {
      errors.add(
        "username",
        "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ \
         characters.",
      );
    }
  }
  let name = errors.require("name", body.name);
  let email = errors.require("email", body.email);
  if !email.is_empty() && !looks_like_email(&email) {
    errors.add("email", "Enter a valid email address.");
  }
  let password = errors.require("password", body.password);
  let confirm = errors.require("password_confirm", body.password_confirm);
  if !password.is_empty() {
    for weakness in weaknesses(&password, &username) {
      errors.add("password", weakness);
    }
    if !confirm.is_empty() && password != confirm {
      errors.add("password_confirm", "Passwords do not match.");
    }
  }
  errors.finish("Invalid registration details.")?;

  let user = state
    .store
    .create_user(NewUser {
      username,
      email: email.trim().to_lowercase(),
      name: name.trim().to_owned(),
      password_hash: hash_password(&password)?,
      user_type: UserType::Consumer,
      is_marketing_consented: body.marketing_agreed,
    })
    .await
    .map_err(ApiError::store::<S>)?;

  tracing::info!(user_id = user.id, username = %user.username, "registered account");
  Ok(ApiResponse::created(user, "Registration complete."))
}

/// `POST /auth/login`
pub async fn login<S>(
  State(state): State<AppState<S>>,
  body: Result<Json<LoginBody>, JsonRejection>,
) -> Result<ApiResponse<LoginData>, ApiError>
where
  S: MarketStore + Clone + 'static,
{
  let Json(body) = body?;
  let (Some(username), Some(password)) = (body.username, body.password) else {
    return Err(ApiError::validation(
      NON_FIELD_ERRORS,
      "Both username and password are required.",
    ));
  };

  let user = state
    .store
    .find_user_by_username(&username)
    .await
    .map_err(ApiError::store::<S>)?
    .filter(|u| verify_password(&password, &u.password_hash));
  let Some(mut user) = user else {
    tracing::warn!(%username, "rejected login");
    return Err(ApiError::validation(NON_FIELD_ERRORS, "Invalid username or password."));
  };
  if !user.is_active {
    tracing::warn!(user_id = user.id, "login to inactive account");
    return Err(ApiError::validation(NON_FIELD_ERRORS, "This account is inactive."));
  }

  let tokens = open_session(&state, user.id).await?;
  let now = Utc::now();
  state
    .store
    .record_login(user.id, now)
    .await
    .map_err(ApiError::store::<S>)?;
  user.last_login = Some(now);

  tracing::info!(user_id = user.id, "logged in");
  Ok(ApiResponse::ok(LoginData { user, tokens }, "Logged in."))
}

/// `POST /auth/refresh`
///
/// Rotates the pair. The presented refresh token stays valid until it
/// expires or is blacklisted.
pub async fn refresh<S>(
  State(state): State<AppState<S>>,
  body: Result<Json<RefreshBody>, JsonRejection>,
) -> Result<ApiResponse<TokenPair>, ApiError>
where
  S: MarketStore + Clone + 'static,
{
  let Json(body) = body?;
  let invalid = || ApiError::Unauthorized("Refresh token is invalid or expired.".into());
  let token = body.refresh.ok_or_else(invalid)?;

  let claims = state.tokens.verify(&token, TokenKind::Refresh).map_err(|e| {
    tracing::debug!(error = %e, "rejected refresh token");
    invalid()
  })?;
  if state
    .store
    .is_token_blacklisted(&claims.jti)
    .await
    .map_err(ApiError::store::<S>)?
  {
    tracing::warn!(user_id = claims.user_id, jti = %claims.jti, "blacklisted refresh token presented");
    return Err(invalid());
  }
  let active = state
    .store
    .get_user(claims.user_id)
    .await
    .map_err(ApiError::store::<S>)?
    .is_some_and(|u| u.is_active);
  if !active {
    return Err(invalid());
  }

  let pair = open_session(&state, claims.user_id).await?;
  Ok(ApiResponse::ok(pair, "Tokens refreshed."))
}

/// `POST /auth/logout`
pub async fn logout<S>(
  State(state): State<AppState<S>>,
  AuthUser(user): AuthUser,
  body: Result<Json<RefreshBody>, JsonRejection>,
) -> Result<ApiResponse<()>, ApiError>
where
  S: MarketStore + Clone + 'static,
{
  let Json(body) = body?;
  let mut errors = FieldErrors::new();
  let token = errors.require("refresh", body.refresh);
  errors.finish("Invalid token.")?;

  let invalid = || ApiError::validation("refresh", "Token is invalid or already revoked.");
  let claims = state
    .tokens
    .verify(&token, TokenKind::Refresh)
    .map_err(|_| invalid())?;
  if claims.user_id != user.id {
    return Err(invalid());
  }
  let revoked = state
    .store
    .blacklist_token(claims.jti, Utc::now())
    .await
    .map_err(ApiError::store::<S>)?;
  if !revoked {
    return Err(invalid());
  }

  tracing::info!(user_id = user.id, "logged out");
  Ok(ApiResponse::message("Logged out."))
}

/// `POST /auth/withdraw`
pub async fn withdraw<S>(
  State(state): State<AppState<S>>,
  AuthUser(user): AuthUser,
  body: Result<Json<WithdrawBody>, JsonRejection>,
) -> Result<ApiResponse<()>, ApiError>
where
  S: MarketStore + Clone + 'static,
{
  let Json(body) = body?;
  let mut errors = FieldErrors::new();
  let password = errors.require("password", body.password);
  if !password.is_empty() && !verify_password(&password, &user.password_hash) {
    errors.add("password", "Incorrect password.");
  }
  errors.finish("Invalid withdrawal request.")?;

  let now = Utc::now();
  state
    .store
    .withdraw_user(user.id, now)
    .await
    .map_err(ApiError::store::<S>)?;

  match state.store.blacklist_user_tokens(user.id, now).await {
    Ok(revoked) => tracing::info!(
      user_id = user.id,
      revoked,
      reason = body.reason.as_deref().unwrap_or(""),
      "account withdrawn"
    ),
    Err(e) => tracing::warn!(user_id = user.id, error = %e, "withdrawn account kept its tokens"),
  }

  Ok(ApiResponse::message("Account withdrawn."))
}

/// `POST /auth/change-password`
pub async fn change_password<S>(
  State(state): State<AppState<S>>,
  AuthUser(user): AuthUser,
  body: Result<Json<ChangePasswordBody>, JsonRejection>,
) -> Result<ApiResponse<()>, ApiError>
where
  S: MarketStore + Clone + 'static,
{
  let Json(body) = body?;
  let mut errors = FieldErrors::new();
  let current = errors.require("current_password", body.current_password);
  let new = errors.require("new_password", body.new_password);
  let confirm = errors.require("new_password_confirm", body.new_password_confirm);

  if !current.is_empty() && !verify_password(&current, &user.password_hash) {
    errors.add("current_password", "Incorrect password.");
  }
  if !new.is_empty() {
    for weakness in weaknesses(&new, &user.username) {
      errors.add("new_password", weakness);
    }
    if new == current {
      errors.add("new_password", "The new password must differ from the current one.");
    }
    if !confirm.is_empty() && new != confirm {
      errors.add("new_password_confirm", "Passwords do not match.");
    }
  }
  errors.finish("Invalid password change.")?;

  state
    .store
    .set_password_hash(user.id, hash_password(&new)?)
    .await
    .map_err(ApiError::store::<S>)?;

  tracing::info!(user_id = user.id, "password changed");
  Ok(ApiResponse::message("Password changed."))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn username_charset() {
    assert!(valid_username("kim.farmer+1@x"));
    assert!(valid_username("농부"));
    assert!(!valid_username("has space"));
    assert!(!valid_username("semi;colon"));
  }
}
