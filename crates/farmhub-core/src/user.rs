//! Users, the actors of the marketplace.
//!
//! Every account has exactly one [`UserType`]. Capabilities that depend on the
//! role are decided here, by exhaustive matching, so the HTTP layer never
//! compares role strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::UserId;

// ─── Roles ───────────────────────────────────────────────────────────────────

/// The closed set of account roles.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  EnumString,
  Display,
  AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
  #[default]
  Consumer,
  Seller,
  Admin,
}

impl UserType {
  /// Whether accounts of this role may create and edit a farm profile.
  pub fn can_own_farm(self) -> bool {
    match self {
      Self::Seller => true,
      Self::Consumer | Self::Admin => false,
    }
  }

  /// Whether accounts of this role may browse the user directory.
  pub fn can_manage_users(self) -> bool {
    match self {
      Self::Admin => true,
      Self::Consumer | Self::Seller => false,
    }
  }
}

/// Account lifecycle state.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  EnumString,
  Display,
  AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
  #[default]
  Active,
  Withdrawn,
  Blocked,
}

// ─── User ────────────────────────────────────────────────────────────────────

/// A persisted account. The password hash never leaves the server; it is
/// skipped during serialisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub id:                     UserId,
  pub username:               String,
  pub email:                  String,
  pub name:                   String,
  #[serde(skip_serializing, default)]
  pub password_hash:          String,
  pub user_type:              UserType,
  pub status:                 UserStatus,
  pub is_active:              bool,
  pub is_marketing_consented: bool,
  pub date_joined:            DateTime<Utc>,
  pub last_login:             Option<DateTime<Utc>>,
  pub withdrawn_at:           Option<DateTime<Utc>>,
  pub blocked_at:             Option<DateTime<Utc>>,
}

/// Input to [`crate::store::MarketStore::create_user`].
/// The password must already be hashed by the caller.
#[derive(Debug, Clone)]
pub struct NewUser {
  pub username:               String,
  pub email:                  String,
  pub name:                   String,
  pub password_hash:          String,
  pub user_type:              UserType,
  pub is_marketing_consented: bool,
}

// ─── Directory query ─────────────────────────────────────────────────────────

/// Sort orders accepted by the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, AsRefStr)]
pub enum UserOrdering {
  #[default]
  #[strum(serialize = "-date_joined")]
  NewestFirst,
  #[strum(serialize = "date_joined")]
  OldestFirst,
  #[strum(serialize = "name")]
  NameAsc,
  #[strum(serialize = "-name")]
  NameDesc,
}

/// Filters for [`crate::store::MarketStore::list_users`]. Admin accounts are
/// never part of the directory.
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
  /// Case-insensitive substring match over name, username and email.
  pub search:    Option<String>,
  /// Restrict to one non-admin role; an `Admin` value matches nothing.
  pub user_type: Option<UserType>,
  pub status:    Option<UserStatus>,
  pub ordering:  UserOrdering,
}
