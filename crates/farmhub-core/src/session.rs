//! Refresh-token bookkeeping.
//!
//! Every refresh token handed out is recorded as outstanding so it can later
//! be blacklisted, either singly on logout or all at once when the owning
//! account is withdrawn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A refresh token that was issued to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutstandingToken {
  /// The token's unique `jti` claim.
  pub jti:        String,
  pub user_id:    UserId,
  pub issued_at:  DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}
