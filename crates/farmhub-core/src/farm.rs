//! Farm profiles and the follow relationship between users and farms.
//!
//! A farm's `follower_count` is a cached aggregate of its follow edges. It is
//! only ever changed together with an edge, inside the store's toggle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FarmId, UserId};

// ─── Profiles ────────────────────────────────────────────────────────────────

/// A seller's farm. Each seller owns at most one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmProfile {
  pub id:               FarmId,
  pub owner_id:         UserId,
  pub farm_name:        Option<String>,
  pub farm_description: Option<String>,
  pub farm_image:       Option<String>,
  pub location:         Option<String>,
  pub contact_phone:    Option<String>,
  pub contact_email:    Option<String>,
  /// Number of follow edges pointing at this farm. Never negative.
  pub follower_count:   i64,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

/// Editable fields of a farm profile, used for both creation and update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FarmProfileInput {
  pub farm_name:        Option<String>,
  pub farm_description: Option<String>,
  pub farm_image:       Option<String>,
  pub location:         Option<String>,
  pub contact_phone:    Option<String>,
  pub contact_email:    Option<String>,
}

// ─── Follow relationship ─────────────────────────────────────────────────────

/// A user following a farm. Existence of the edge is the follow state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEdge {
  pub user_id:     UserId,
  pub farm_id:     FarmId,
  pub followed_at: DateTime<Utc>,
}

/// The outcome of a follow toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowState {
  pub is_following:   bool,
  pub follower_count: i64,
}

// ─── Listings ────────────────────────────────────────────────────────────────

/// One row of the farm list, annotated with the viewer's follow state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmListing {
  pub farm_id:      FarmId,
  pub farm_name:    Option<String>,
  pub farm_image:   Option<String>,
  pub is_following: bool,
}

/// Filters for [`crate::store::MarketStore::list_farms`].
///
/// Only farms owned by active sellers with a non-empty name are ever listed;
/// these fields narrow that set further.
#[derive(Debug, Clone, Default)]
pub struct FarmQuery {
  /// Case-insensitive substring match on `farm_name`.
  pub search:         Option<String>,
  /// Restrict to farms the viewer follows. Anonymous viewers get nothing.
  pub following_only: bool,
}
