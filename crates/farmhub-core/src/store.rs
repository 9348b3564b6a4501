//! The `MarketStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `farmhub-store-sqlite`).
//! The HTTP layer depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  FarmId, UserId,
  farm::{FarmListing, FarmProfile, FarmProfileInput, FarmQuery, FollowState},
  page::{Page, PageRequest},
  session::OutstandingToken,
  user::{NewUser, User, UserQuery, UserType},
};

/// Abstraction over a Farmhub store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait MarketStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Classify a backend error as one of the core domain errors, if it is one.
  fn as_core_error(err: &Self::Error) -> Option<&crate::Error>;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Persist a new account. Fails with a duplicate error if the username or
  /// email is already registered.
  fn create_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Retrieve a user by id. Returns `None` if not found.
  fn get_user(
    &self,
    id: UserId,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// Retrieve a user by exact username. Returns `None` if not found.
  fn find_user_by_username<'a>(
    &'a self,
    username: &'a str,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;

  /// Replace the stored password hash.
  fn set_password_hash(
    &self,
    id: UserId,
    password_hash: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Stamp a successful login.
  fn record_login(
    &self,
    id: UserId,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Change an account's role.
  fn set_user_type(
    &self,
    id: UserId,
    user_type: UserType,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Deactivate an account and mark it withdrawn.
  fn withdraw_user(
    &self,
    id: UserId,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Page through non-admin accounts matching `query`.
  fn list_users<'a>(
    &'a self,
    query: &'a UserQuery,
    page: PageRequest,
  ) -> impl Future<Output = Result<Page<User>, Self::Error>> + Send + 'a;

  /// Number of non-admin accounts, regardless of any filter.
  fn count_non_admin_users(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Farms ─────────────────────────────────────────────────────────────

  /// Create the owner's farm profile, or update it if one exists. Returns the
  /// profile and whether it was newly created. Fails with
  /// [`crate::Error::NotASeller`] unless the owner may own a farm.
  fn upsert_farm_profile(
    &self,
    owner_id: UserId,
    input: FarmProfileInput,
  ) -> impl Future<Output = Result<(FarmProfile, bool), Self::Error>> + Send + '_;

  /// Retrieve a farm by id. Returns `None` if not found.
  fn get_farm(
    &self,
    id: FarmId,
  ) -> impl Future<Output = Result<Option<FarmProfile>, Self::Error>> + Send + '_;

  /// Page through listable farms, annotating each with whether `viewer`
  /// follows it. Follow state for a page is resolved with a single batched
  /// lookup.
  fn list_farms<'a>(
    &'a self,
    viewer: Option<UserId>,
    query: &'a FarmQuery,
    page: PageRequest,
  ) -> impl Future<Output = Result<Page<FarmListing>, Self::Error>> + Send + 'a;

  // ── Follows ───────────────────────────────────────────────────────────

  /// Whether `viewer` follows `farm_id`. Anonymous viewers follow nothing.
  fn is_following(
    &self,
    viewer: Option<UserId>,
    farm_id: FarmId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Flip the follow state of `(actor, farm_id)` and adjust the farm's
  /// follower count in the same transaction.
  ///
  /// Fails with [`crate::Error::FarmNotFound`] if the farm does not exist and
  /// with [`crate::Error::SelfFollow`] if `actor` owns it; neither failure
  /// mutates anything.
  fn toggle_follow(
    &self,
    actor: UserId,
    farm_id: FarmId,
  ) -> impl Future<Output = Result<FollowState, Self::Error>> + Send + '_;

  // ── Sessions ──────────────────────────────────────────────────────────

  /// Remember an issued refresh token.
  fn record_refresh_token(
    &self,
    token: OutstandingToken,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Whether the token with this `jti` has been blacklisted.
  fn is_token_blacklisted<'a>(
    &'a self,
    jti: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Blacklist a single token. Returns `false` if it already was.
  fn blacklist_token(
    &self,
    jti: String,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Blacklist every outstanding token of `user_id`. Returns how many tokens
  /// were newly blacklisted.
  fn blacklist_user_tokens(
    &self,
    user_id: UserId,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
