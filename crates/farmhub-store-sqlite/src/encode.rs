//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with a fixed microsecond
//! precision so that lexical order matches chronological order. Enums are
//! stored by their `SCREAMING_SNAKE_CASE` wire names.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use farmhub_core::{
  farm::{FarmListing, FarmProfile},
  user::{User, UserStatus, UserType},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_user_type(s: &str) -> Result<UserType> {
  UserType::from_str(s).map_err(|_| Error::UnknownVariant {
    column: "user_type",
    value:  s.to_owned(),
  })
}

pub fn decode_user_status(s: &str) -> Result<UserStatus> {
  UserStatus::from_str(s).map_err(|_| Error::UnknownVariant {
    column: "status",
    value:  s.to_owned(),
  })
}

// ─── LIKE patterns ───────────────────────────────────────────────────────────

/// Build a `%text%` pattern for `LIKE ... ESCAPE '\'`, escaping wildcards in
/// the user-supplied text.
pub fn like_pattern(text: &str) -> String {
  let mut out = String::with_capacity(text.len() + 2);
  out.push('%');
  for c in text.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('%');
  out
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawUser::from_row`].
pub const USER_COLUMNS: &str = "id, username, email, name, password_hash, user_type, status, \
   is_active, is_marketing_consented, date_joined, last_login, withdrawn_at, blocked_at";

/// Raw values read directly from a `users` row.
pub struct RawUser {
  pub id:                     i64,
  pub username:               String,
  pub email:                  String,
  pub name:                   String,
  pub password_hash:          String,
  pub user_type:              String,
  pub status:                 String,
  pub is_active:              bool,
  pub is_marketing_consented: bool,
  pub date_joined:            String,
  pub last_login:             Option<String>,
  pub withdrawn_at:           Option<String>,
  pub blocked_at:             Option<String>,
}

impl RawUser {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                     row.get(0)?,
      username:               row.get(1)?,
      email:                  row.get(2)?,
      name:                   row.get(3)?,
      password_hash:          row.get(4)?,
      user_type:              row.get(5)?,
      status:                 row.get(6)?,
      is_active:              row.get(7)?,
      is_marketing_consented: row.get(8)?,
      date_joined:            row.get(9)?,
      last_login:             row.get(10)?,
      withdrawn_at:           row.get(11)?,
      blocked_at:             row.get(12)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      id:                     self.id,
      username:               self.username,
      email:                  self.email,
      name:                   self.name,
      password_hash:          self.password_hash,
      user_type:              decode_user_type(&self.user_type)?,
      status:                 decode_user_status(&self.status)?,
      is_active:              self.is_active,
      is_marketing_consented: self.is_marketing_consented,
      date_joined:            decode_dt(&self.date_joined)?,
      last_login:             decode_opt_dt(self.last_login)?,
      withdrawn_at:           decode_opt_dt(self.withdrawn_at)?,
      blocked_at:             decode_opt_dt(self.blocked_at)?,
    })
  }
}

/// Column list matching [`RawFarm::from_row`].
pub const FARM_COLUMNS: &str = "id, owner_id, farm_name, farm_description, farm_image, location, \
   contact_phone, contact_email, follower_count, created_at, updated_at";

/// Raw values read directly from a `farm_profiles` row.
pub struct RawFarm {
  pub id:               i64,
  pub owner_id:         i64,
  pub farm_name:        Option<String>,
  pub farm_description: Option<String>,
  pub farm_image:       Option<String>,
  pub location:         Option<String>,
  pub contact_phone:    Option<String>,
  pub contact_email:    Option<String>,
  pub follower_count:   i64,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawFarm {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      owner_id:         row.get(1)?,
      farm_name:        row.get(2)?,
      farm_description: row.get(3)?,
      farm_image:       row.get(4)?,
      location:         row.get(5)?,
      contact_phone:    row.get(6)?,
      contact_email:    row.get(7)?,
      follower_count:   row.get(8)?,
      created_at:       row.get(9)?,
      updated_at:       row.get(10)?,
    })
  }

  pub fn into_farm(self) -> Result<FarmProfile> {
    Ok(FarmProfile {
      id:               self.id,
      owner_id:         self.owner_id,
      farm_name:        self.farm_name,
      farm_description: self.farm_description,
      farm_image:       self.farm_image,
      location:         self.location,
      contact_phone:    self.contact_phone,
      contact_email:    self.contact_email,
      follower_count:   self.follower_count,
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

/// The three columns the farm list needs.
pub struct RawFarmListing {
  pub farm_id:    i64,
  pub farm_name:  Option<String>,
  pub farm_image: Option<String>,
}

impl RawFarmListing {
  pub fn into_listing(self, is_following: bool) -> FarmListing {
    FarmListing {
      farm_id: self.farm_id,
      farm_name: self.farm_name,
      farm_image: self.farm_image,
      is_following,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn like_pattern_escapes_wildcards() {
    assert_eq!(like_pattern("berry"), "%berry%");
    assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
  }

  #[test]
  fn timestamps_sort_lexically() {
    let a = encode_dt(DateTime::from_timestamp(1_700_000_000, 5_000).unwrap());
    let b = encode_dt(DateTime::from_timestamp(1_700_000_000, 120_000_000).unwrap());
    assert!(a < b, "{a} !< {b}");
    assert_eq!(decode_dt(&a).unwrap().timestamp_subsec_micros(), 5);
  }

  #[test]
  fn unknown_role_is_an_error() {
    assert!(matches!(
      decode_user_type("FARMER"),
      Err(Error::UnknownVariant { column: "user_type", .. })
    ));
  }
}
