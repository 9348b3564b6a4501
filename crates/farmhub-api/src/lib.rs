//! HTTP layer for Farmhub.
//!
//! Exposes an axum [`Router`] serving the farm directory, the follow toggle,
//! JWT session endpoints and the admin user directory, backed by any
//! [`MarketStore`]. Every response body is an [`envelope::Envelope`].

pub mod envelope;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod password;
pub mod token;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post, put},
};
use farmhub_core::store::MarketStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use handlers::{admin, auth, farms};
use token::TokenIssuer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `FARMHUB_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                   String,
  #[serde(default = "default_port")]
  pub port:                   u16,
  #[serde(default = "default_store_path")]
  pub store_path:             PathBuf,
  /// HMAC secret for signing tokens.
  pub jwt_secret:             String,
  #[serde(default = "default_access_ttl")]
  pub access_token_ttl_secs:  u64,
  #[serde(default = "default_refresh_ttl")]
  pub refresh_token_ttl_secs: u64,
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8000 }
fn default_store_path() -> PathBuf { PathBuf::from("farmhub.db") }
fn default_access_ttl() -> u64 { 24 * 60 * 60 }
fn default_refresh_ttl() -> u64 { 14 * 24 * 60 * 60 }

impl ServerConfig {
  pub fn token_issuer(&self) -> TokenIssuer {
    let secs = |s: u64| chrono::Duration::seconds(i64::try_from(s).unwrap_or(i64::MAX));
    TokenIssuer::new(
      self.jwt_secret.as_bytes(),
      secs(self.access_token_ttl_secs),
      secs(self.refresh_token_ttl_secs),
    )
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: MarketStore> {
  pub store:  Arc<S>,
  pub tokens: Arc<TokenIssuer>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the API.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: MarketStore + Clone + 'static,
{
  Router::new()
    .route("/health",                get(handlers::health))
    .route("/auth/register",         post(auth::register::<S>))
    .route("/auth/login",            post(auth::login::<S>))
    .route("/auth/refresh",          post(auth::refresh::<S>))
    .route("/auth/logout",           post(auth::logout::<S>))
    .route("/auth/withdraw",         post(auth::withdraw::<S>))
    .route("/auth/change-password",  post(auth::change_password::<S>))
    .route("/farms",                 get(farms::list::<S>))
    .route("/farms/me",              put(farms::upsert_mine::<S>))
    .route("/farms/{farm_id}",       get(farms::detail::<S>))
    .route("/farms/{farm_id}/follow", post(farms::toggle_follow::<S>))
    .route("/admin/users",           get(admin::list_users::<S>))
    .fallback(not_found)
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn not_found() -> ApiError { ApiError::NotFound("Not found.".into()) }

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use farmhub_core::{
    farm::FarmProfileInput,
    user::{NewUser, User, UserType},
  };
  use farmhub_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  async fn make_state() -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    AppState {
      store:  Arc::new(store),
      tokens: Arc::new(TokenIssuer::new(
        b"test-secret",
        chrono::Duration::hours(1),
        chrono::Duration::days(1),
      )),
    }
  }

  /// Create an account directly in the store. The hash never verifies, so
  /// these accounts can only act through tokens minted by [`access`].
  async fn seed_user(state: &AppState<SqliteStore>, username: &str, user_type: UserType) -> User {
    state
      .store
      .create_user(NewUser {
        username: username.into(),
        email: format!("{username}@farmhub.test"),
        name: username.into(),
        password_hash: "unusable".into(),
        user_type,
        is_marketing_consented: false,
      })
      .await
      .unwrap()
  }

  /// A seller with a named farm. Returns the farm id.
  async fn seed_farm(state: &AppState<SqliteStore>, username: &str) -> (User, i64) {
    let seller = seed_user(state, username, UserType::Seller).await;
    let (farm, _) = state
      .store
      .upsert_farm_profile(seller.id, FarmProfileInput {
        farm_name: Some(format!("{username} farm")),
        ..Default::default()
      })
      .await
      .unwrap();
    (seller, farm.id)
  }

  fn access(state: &AppState<SqliteStore>, user: &User) -> String {
    state.tokens.issue_pair(user.id).unwrap().0.access
  }

  async fn send(
    state: &AppState<SqliteStore>,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
      builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
      Some(body) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  // ── Envelope ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn health_uses_envelope() {
    let state = make_state().await;
    let (status, body) = send(&state, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "data": null, "message": "ok" }));
  }

  #[tokio::test]
  async fn unknown_route_is_enveloped_404() {
    let state = make_state().await;
    let (status, body) = send(&state, "GET", "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
  }

  #[tokio::test]
  async fn missing_or_bad_token_is_401() {
    let state = make_state().await;
    let (status, body) = send(&state, "GET", "/farms", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send(&state, "POST", "/farms/1/follow", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  // ── Follow toggle ───────────────────────────────────────────────────────────

  #[tokio::test]
  async fn toggle_farm_five_twice() {
    let state = make_state().await;
    for i in 1..=5 {
      seed_farm(&state, &format!("seller{i}")).await;
    }
    let u1 = seed_user(&state, "u1", UserType::Consumer).await;
    let token = access(&state, &u1);

    let (status, body) = send(&state, "POST", "/farms/5/follow", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!({ "is_following": true, "follower_count": 1 }));
    assert_eq!(body["message"], "Followed the farm.");

    let (_, body) = send(&state, "POST", "/farms/5/follow", Some(&token), None).await;
    assert_eq!(body["data"], json!({ "is_following": false, "follower_count": 0 }));
    assert_eq!(body["message"], "Unfollowed the farm.");
  }

  #[tokio::test]
  async fn eighth_follower() {
    let state = make_state().await;
    let (_, farm) = seed_farm(&state, "seller").await;
    for i in 0..7 {
      let fan = seed_user(&state, &format!("fan{i}"), UserType::Consumer).await;
      state.store.toggle_follow(fan.id, farm).await.unwrap();
    }
    let u2 = seed_user(&state, "u2", UserType::Consumer).await;
    let token = access(&state, &u2);

    let (_, body) =
      send(&state, "POST", &format!("/farms/{farm}/follow"), Some(&token), None).await;
    assert_eq!(body["data"], json!({ "is_following": true, "follower_count": 8 }));
  }

  #[tokio::test]
  async fn self_follow_is_400_and_leaves_count() {
    let state = make_state().await;
    let (seller, farm) = seed_farm(&state, "seller").await;
    let token = access(&state, &seller);

    let (status, body) =
      send(&state, "POST", &format!("/farms/{farm}/follow"), Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["data"]["farm_id"].is_array());

    let (_, body) = send(&state, "GET", &format!("/farms/{farm}"), Some(&token), None).await;
    assert_eq!(body["data"]["follower_count"], 0);
    assert_eq!(body["data"]["is_following"], false);
  }

  #[tokio::test]
  async fn missing_and_malformed_farm_ids() {
    let state = make_state().await;
    let user = seed_user(&state, "u", UserType::Consumer).await;
    let token = access(&state, &user);

    let (status, body) = send(&state, "POST", "/farms/999/follow", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, body) = send(&state, "POST", "/farms/abc/follow", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["data"]["farm_id"].is_array());
  }

  // ── Farm list ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn list_marks_followed_farms() {
    let state = make_state().await;
    let mut farms = Vec::new();
    for name in ["a", "b", "c", "d"] {
      farms.push(seed_farm(&state, name).await.1);
    }
    let viewer = seed_user(&state, "viewer", UserType::Consumer).await;
    state.store.toggle_follow(viewer.id, farms[0]).await.unwrap();
    state.store.toggle_follow(viewer.id, farms[2]).await.unwrap();
    let token = access(&state, &viewer);

    let (status, body) = send(&state, "GET", "/farms", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 4);
    let mut followed: Vec<i64> = body["data"]["results"]
      .as_array()
      .unwrap()
      .iter()
      .filter(|r| r["is_following"] == true)
      .map(|r| r["farm_id"].as_i64().unwrap())
      .collect();
    followed.sort();
    assert_eq!(followed, vec![farms[0], farms[2]]);

    let (_, body) = send(&state, "GET", "/farms?following=true", Some(&token), None).await;
    assert_eq!(body["data"]["count"], 2);
  }

  #[tokio::test]
  async fn list_pagination_errors() {
    let state = make_state().await;
    seed_farm(&state, "only").await;
    let viewer = seed_user(&state, "viewer", UserType::Consumer).await;
    let token = access(&state, &viewer);

    let (status, body) = send(&state, "GET", "/farms?page_size=1", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["next"], Value::Null);

    let (status, _) = send(&state, "GET", "/farms?page=2", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&state, "GET", "/farms?page_size=0", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&state, "GET", "/farms?page=minus", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn unlisted_farm_reachable_by_id() {
    let state = make_state().await;
    let (seller, farm) = seed_farm(&state, "retired").await;
    state.store.withdraw_user(seller.id, chrono::Utc::now()).await.unwrap();
    let viewer = seed_user(&state, "viewer", UserType::Consumer).await;
    let token = access(&state, &viewer);

    let (_, body) = send(&state, "GET", "/farms", Some(&token), None).await;
    assert_eq!(body["data"]["count"], 0);

    let (status, body) = send(&state, "GET", &format!("/farms/{farm}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["farm_name"], "retired farm");

    let (status, body) =
      send(&state, "POST", &format!("/farms/{farm}/follow"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "is_following": true, "follower_count": 1 }));
  }

  // ── Farm profile ────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn only_sellers_upsert_profiles() {
    let state = make_state().await;
    let seller = seed_user(&state, "seller", UserType::Seller).await;
    let buyer = seed_user(&state, "buyer", UserType::Consumer).await;
    let body = json!({ "farm_name": "Sunny Side", "location": "Jeju" });

    let (status, _) =
      send(&state, "PUT", "/farms/me", Some(&access(&state, &buyer)), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let token = access(&state, &seller);
    let (status, created) = send(&state, "PUT", "/farms/me", Some(&token), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["farm_name"], "Sunny Side");

    let (status, updated) =
      send(&state, "PUT", "/farms/me", Some(&token), Some(json!({ "farm_name": "Shady Side" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["id"], created["data"]["id"]);
    assert_eq!(updated["data"]["farm_name"], "Shady Side");
  }

  // ── Admin ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn admin_directory_is_role_gated() {
    let state = make_state().await;
    let admin = seed_user(&state, "root", UserType::Admin).await;
    let buyer = seed_user(&state, "buyer", UserType::Consumer).await;
    seed_user(&state, "grower", UserType::Seller).await;

    let (status, body) =
      send(&state, "GET", "/admin/users", Some(&access(&state, &buyer)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let token = access(&state, &admin);
    let (status, body) = send(&state, "GET", "/admin/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(body["data"]["total_users"], 2);
    assert!(body["data"]["results"][0].get("password_hash").is_none());

    let (_, body) =
      send(&state, "GET", "/admin/users?user_type=SELLER", Some(&token), None).await;
    assert_eq!(body["data"]["count"], 1);
    assert_eq!(body["data"]["total_users"], 2);

    let (status, _) = send(&state, "GET", "/admin/users?status=NAPPING", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  // ── Sessions ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn register_validation_errors() {
    let state = make_state().await;
    let (status, body) = send(
      &state,
      "POST",
      "/auth/register",
      None,
      Some(json!({
        "username": "kim",
        "email": "not-an-email",
        "password": "1234",
        "password_confirm": "4321",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors = &body["data"];
    for field in ["name", "email", "password", "password_confirm"] {
      assert!(errors[field].is_array(), "no error for {field}: {body}");
    }
    assert!(errors.get("username").is_none());
  }

  #[tokio::test]
  async fn session_lifecycle() {
    let state = make_state().await;
    let password = "Tomatoes&Basil7";

    let (status, body) = send(
      &state,
      "POST",
      "/auth/register",
      None,
      Some(json!({
        "username": "kim",
        "name": "Kim",
        "email": "kim@farmhub.test",
        "password": password,
        "password_confirm": password,
        "marketing_agreed": true,
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["user_type"], "CONSUMER");

    let (status, _) = send(
      &state,
      "POST",
      "/auth/register",
      None,
      Some(json!({
        "username": "kim",
        "name": "Kim",
        "email": "other@farmhub.test",
        "password": password,
        "password_confirm": password,
      })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
      &state,
      "POST",
      "/auth/login",
      None,
      Some(json!({ "username": "kim", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["data"][error::NON_FIELD_ERRORS].is_array());

    let (status, body) = send(
      &state,
      "POST",
      "/auth/login",
      None,
      Some(json!({ "username": "kim", "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["user"]["last_login"].is_string());
    let access = body["data"]["tokens"]["access"].as_str().unwrap().to_owned();
    let refresh = body["data"]["tokens"]["refresh"].as_str().unwrap().to_owned();

    let (status, body) =
      send(&state, "POST", "/auth/refresh", None, Some(json!({ "refresh": refresh }))).await;
    assert_eq!(status, StatusCode::OK);
    let rotated = body["data"]["refresh"].as_str().unwrap().to_owned();

    let (status, _) = send(
      &state,
      "POST",
      "/auth/logout",
      Some(&access),
      Some(json!({ "refresh": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
      send(&state, "POST", "/auth/refresh", None, Some(json!({ "refresh": refresh }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
      &state,
      "POST",
      "/auth/logout",
      Some(&access),
      Some(json!({ "refresh": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
      &state,
      "POST",
      "/auth/withdraw",
      Some(&access),
      Some(json!({ "password": password, "reason": "moving away" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&state, "GET", "/farms", Some(&access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) =
      send(&state, "POST", "/auth/refresh", None, Some(json!({ "refresh": rotated }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
      &state,
      "POST",
      "/auth/login",
      None,
      Some(json!({ "username": "kim", "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn change_password_requires_current() {
    let state = make_state().await;
    let old = "Radishes&Rain42";
    let new = "Cabbage!Moon77";
    let user = state
      .store
      .create_user(NewUser {
        username: "lee".into(),
        email: "lee@farmhub.test".into(),
        name: "Lee".into(),
        password_hash: password::hash_password(old).unwrap(),
        user_type: UserType::Consumer,
        is_marketing_consented: false,
      })
      .await
      .unwrap();
    let token = access(&state, &user);

    let (status, body) = send(
      &state,
      "POST",
      "/auth/change-password",
      Some(&token),
      Some(json!({
        "current_password": "nope",
        "new_password": new,
        "new_password_confirm": new,
      })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["data"]["current_password"].is_array());

    let (status, _) = send(
      &state,
      "POST",
      "/auth/change-password",
      Some(&token),
      Some(json!({
        "current_password": old,
        "new_password": new,
        "new_password_confirm": new,
      })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
      &state,
      "POST",
      "/auth/login",
      None,
      Some(json!({ "username": "lee", "password": new })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
  }
}
