//! Error types for `farmhub-core`.

use thiserror::Error;

use crate::{FarmId, UserId};

#[derive(Debug, Error)]
pub enum Error {
  #[error("farm not found: {0}")]
  FarmNotFound(FarmId),

  #[error("user {user} owns farm {farm} and cannot follow it")]
  SelfFollow { user: UserId, farm: FarmId },

  #[error("user not found: {0}")]
  UserNotFound(UserId),

  #[error("username already taken: {0:?}")]
  DuplicateUsername(String),

  #[error("email already registered: {0:?}")]
  DuplicateEmail(String),

  #[error("only sellers may own a farm profile")]
  NotASeller(UserId),

  #[error("invalid page: {0}")]
  InvalidPage(u32),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
