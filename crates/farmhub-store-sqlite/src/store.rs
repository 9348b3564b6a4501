//! [`SqliteStore`]: the SQLite implementation of [`MarketStore`].

use std::{collections::HashSet, path::Path, time::Duration};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};

use farmhub_core::{
  FarmId, UserId,
  farm::{FarmListing, FarmProfile, FarmProfileInput, FarmQuery, FollowState},
  page::{Page, PageRequest},
  session::OutstandingToken,
  store::MarketStore,
  user::{NewUser, User, UserOrdering, UserQuery, UserType},
};

use crate::{
  Error, Result,
  encode::{
    FARM_COLUMNS, RawFarm, RawFarmListing, RawUser, USER_COLUMNS, decode_user_type,
    encode_dt, like_pattern,
  },
  schema::SCHEMA,
};

/// How long a writer waits for another connection's write lock before giving
/// up with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Farmhub store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// Result of the work done inside a toggle transaction.
enum ToggleOutcome {
  NoSuchFarm,
  OwnFarm,
  Done(FollowState),
}

/// Result of the work done inside a registration transaction.
enum CreateUserOutcome {
  UsernameTaken,
  EmailTaken,
  Created(RawUser),
}

/// Result of the work done inside a farm upsert transaction.
enum UpsertFarmOutcome {
  NoSuchUser,
  NotASeller,
  Saved(RawFarm, bool),
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Overwrite a farm's cached follower count without touching its edges.
  #[cfg(test)]
  pub(crate) async fn force_follower_count(&self, farm_id: FarmId, count: i64) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE farm_profiles SET follower_count = ?2 WHERE id = ?1",
          rusqlite::params![farm_id, count],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Count the follow edges pointing at a farm.
  #[cfg(test)]
  pub(crate) async fn count_edges(&self, farm_id: FarmId) -> Result<i64> {
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(conn.query_row(
            "SELECT COUNT(*) FROM farm_follows WHERE farm_id = ?1",
            [farm_id],
            |r| r.get(0),
          )?)
        })
        .await?,
    )
  }
}

fn select_user(conn: &rusqlite::Connection, id: UserId) -> rusqlite::Result<Option<RawUser>> {
  conn
    .query_row(
      &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
      [id],
      RawUser::from_row,
    )
    .optional()
}

fn select_farm(conn: &rusqlite::Connection, id: FarmId) -> rusqlite::Result<Option<RawFarm>> {
  conn
    .query_row(
      &format!("SELECT {FARM_COLUMNS} FROM farm_profiles WHERE id = ?1"),
      [id],
      RawFarm::from_row,
    )
    .optional()
}

/// The subset of `farm_ids` that `viewer` follows, in one query.
fn followed_among(
  conn: &rusqlite::Connection,
  viewer: UserId,
  farm_ids: &[FarmId],
) -> rusqlite::Result<HashSet<FarmId>> {
  if farm_ids.is_empty() {
    return Ok(HashSet::new());
  }

  let placeholders = (2..farm_ids.len() + 2)
    .map(|i| format!("?{i}"))
    .collect::<Vec<_>>()
    .join(", ");
  let sql = format!(
    "SELECT farm_id FROM farm_follows WHERE user_id = ?1 AND farm_id IN ({placeholders})"
  );

  let mut stmt = conn.prepare(&sql)?;
  let params = std::iter::once(viewer).chain(farm_ids.iter().copied());
  stmt
    .query_map(rusqlite::params_from_iter(params), |r| r.get(0))?
    .collect()
}

fn order_clause(ordering: UserOrdering) -> &'static str {
  match ordering {
    UserOrdering::NewestFirst => "date_joined DESC, id DESC",
    UserOrdering::OldestFirst => "date_joined ASC, id ASC",
    UserOrdering::NameAsc => "name ASC, id ASC",
    UserOrdering::NameDesc => "name DESC, id DESC",
  }
}

// ─── MarketStore impl ────────────────────────────────────────────────────────

impl MarketStore for SqliteStore {
  type Error = Error;

  fn as_core_error(err: &Error) -> Option<&farmhub_core::Error> {
    match err {
      Error::Core(e) => Some(e),
      _ => None,
    }
  }

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn create_user(&self, input: NewUser) -> Result<User> {
    let joined_str = encode_dt(Utc::now());
    let type_str   = input.user_type.as_ref().to_owned();
    let username   = input.username.clone();
    let email      = input.email.clone();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let taken = |sql: &str, value: &str| -> rusqlite::Result<bool> {
          Ok(tx.query_row(sql, [value], |_| Ok(())).optional()?.is_some())
        };
        if taken("SELECT 1 FROM users WHERE username = ?1", &input.username)? {
          return Ok(CreateUserOutcome::UsernameTaken);
        }
        if taken("SELECT 1 FROM users WHERE email = ?1", &input.email)? {
          return Ok(CreateUserOutcome::EmailTaken);
        }

        tx.execute(
          "INSERT INTO users (
             username, email, name, password_hash, user_type,
             is_marketing_consented, date_joined
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            input.username,
            input.email,
            input.name,
            input.password_hash,
            type_str,
            input.is_marketing_consented,
            joined_str,
          ],
        )?;
        let id = tx.last_insert_rowid();
        let raw = select_user(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(CreateUserOutcome::Created(raw))
      })
      .await?;

    match outcome {
      CreateUserOutcome::UsernameTaken => {
        Err(farmhub_core::Error::DuplicateUsername(username).into())
      }
      CreateUserOutcome::EmailTaken => Err(farmhub_core::Error::DuplicateEmail(email).into()),
      CreateUserOutcome::Created(raw) => {
        let user = raw.into_user()?;
        tracing::debug!(user_id = user.id, username = %user.username, "created user");
        Ok(user)
      }
    }
  }

  async fn get_user(&self, id: UserId) -> Result<Option<User>> {
    let raw = self.conn.call(move |conn| Ok(select_user(conn, id)?)).await?;
    raw.map(RawUser::into_user).transpose()
  }

  async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
    let username = username.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
              [username],
              RawUser::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawUser::into_user).transpose()
  }

  async fn set_password_hash(&self, id: UserId, password_hash: String) -> Result<()> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE users SET password_hash = ?2 WHERE id = ?1",
          rusqlite::params![id, password_hash],
        )?)
      })
      .await?;
    if changed == 0 {
      return Err(farmhub_core::Error::UserNotFound(id).into());
    }
    Ok(())
  }

  async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<()> {
    let at_str = encode_dt(at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE users SET last_login = ?2 WHERE id = ?1",
          rusqlite::params![id, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn set_user_type(&self, id: UserId, user_type: UserType) -> Result<User> {
    let type_str = user_type.as_ref().to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE users SET user_type = ?2 WHERE id = ?1",
          rusqlite::params![id, type_str],
        )?;
        Ok(select_user(conn, id)?)
      })
      .await?;
    raw
      .ok_or(farmhub_core::Error::UserNotFound(id))?
      .into_user()
  }

  async fn withdraw_user(&self, id: UserId, at: DateTime<Utc>) -> Result<User> {
    let at_str = encode_dt(at);
    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE users
           SET status = 'WITHDRAWN', is_active = 0, withdrawn_at = ?2
           WHERE id = ?1",
          rusqlite::params![id, at_str],
        )?;
        Ok(select_user(conn, id)?)
      })
      .await?;
    raw
      .ok_or(farmhub_core::Error::UserNotFound(id))?
      .into_user()
  }

  async fn list_users(&self, query: &UserQuery, page: PageRequest) -> Result<Page<User>> {
    let search     = query.search.as_deref().map(like_pattern);
    let type_str   = query.user_type.map(|t| t.as_ref().to_owned());
    let status_str = query.status.map(|s| s.as_ref().to_owned());
    let order      = order_clause(query.ordering);
    let (limit, offset) = (page.limit(), page.offset());

    let (count, raws): (u64, Vec<RawUser>) = self
      .conn
      .call(move |conn| {
        let filter = "user_type <> 'ADMIN'
           AND (:search IS NULL
                OR name LIKE :search ESCAPE '\\'
                OR username LIKE :search ESCAPE '\\'
                OR email LIKE :search ESCAPE '\\')
           AND (:user_type IS NULL OR user_type = :user_type)
           AND (:status IS NULL OR status = :status)";

        let tx = conn.transaction()?;
        let count: i64 = tx.query_row(
          &format!("SELECT COUNT(*) FROM users WHERE {filter}"),
          rusqlite::named_params! {
            ":search": search,
            ":user_type": type_str,
            ":status": status_str,
          },
          |r| r.get(0),
        )?;

        let rows = {
          let mut stmt = tx.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {filter}
             ORDER BY {order} LIMIT :limit OFFSET :offset"
          ))?;
          stmt
            .query_map(
              rusqlite::named_params! {
                ":search": search,
                ":user_type": type_str,
                ":status": status_str,
                ":limit": limit,
                ":offset": offset,
              },
              RawUser::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.commit()?;
        Ok((count as u64, rows))
      })
      .await?;

    page.check_in_range(count)?;
    let users = raws
      .into_iter()
      .map(RawUser::into_user)
      .collect::<Result<Vec<_>>>()?;
    Ok(Page::new(page, count, users))
  }

  async fn count_non_admin_users(&self) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM users WHERE user_type <> 'ADMIN'",
          [],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(count as u64)
  }

  // ── Farms ─────────────────────────────────────────────────────────────────

  async fn upsert_farm_profile(
    &self,
    owner_id: UserId,
    input:    FarmProfileInput,
  ) -> Result<(FarmProfile, bool)> {
    let now_str = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let user_type: Option<String> = tx
          .query_row("SELECT user_type FROM users WHERE id = ?1", [owner_id], |r| r.get(0))
          .optional()?;
        let Some(user_type) = user_type else {
          return Ok(UpsertFarmOutcome::NoSuchUser);
        };
        // An unreadable role cannot own a farm either.
        if !decode_user_type(&user_type).is_ok_and(UserType::can_own_farm) {
          return Ok(UpsertFarmOutcome::NotASeller);
        }

        let existing: Option<FarmId> = tx
          .query_row("SELECT id FROM farm_profiles WHERE owner_id = ?1", [owner_id], |r| r.get(0))
          .optional()?;

        let (farm_id, created) = match existing {
          Some(id) => {
            tx.execute(
              "UPDATE farm_profiles SET
                 farm_name = ?2, farm_description = ?3, farm_image = ?4,
                 location = ?5, contact_phone = ?6, contact_email = ?7,
                 updated_at = ?8
               WHERE id = ?1",
              rusqlite::params![
                id,
                input.farm_name,
                input.farm_description,
                input.farm_image,
                input.location,
                input.contact_phone,
                input.contact_email,
                now_str,
              ],
            )?;
            (id, false)
          }
          None => {
            tx.execute(
              "INSERT INTO farm_profiles (
                 owner_id, farm_name, farm_description, farm_image,
                 location, contact_phone, contact_email, created_at, updated_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
              rusqlite::params![
                owner_id,
                input.farm_name,
                input.farm_description,
                input.farm_image,
                input.location,
                input.contact_phone,
                input.contact_email,
                now_str,
              ],
            )?;
            (tx.last_insert_rowid(), true)
          }
        };

        let raw = select_farm(&tx, farm_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(UpsertFarmOutcome::Saved(raw, created))
      })
      .await?;

    match outcome {
      UpsertFarmOutcome::NoSuchUser => Err(farmhub_core::Error::UserNotFound(owner_id).into()),
      UpsertFarmOutcome::NotASeller => Err(farmhub_core::Error::NotASeller(owner_id).into()),
      UpsertFarmOutcome::Saved(raw, created) => Ok((raw.into_farm()?, created)),
    }
  }

  async fn get_farm(&self, id: FarmId) -> Result<Option<FarmProfile>> {
    let raw = self.conn.call(move |conn| Ok(select_farm(conn, id)?)).await?;
    raw.map(RawFarm::into_farm).transpose()
  }

  async fn list_farms(
    &self,
    viewer: Option<UserId>,
    query:  &FarmQuery,
    page:   PageRequest,
  ) -> Result<Page<FarmListing>> {
    if query.following_only && viewer.is_none() {
      page.check_in_range(0)?;
      return Ok(Page::new(page, 0, Vec::new()));
    }

    let search    = query.search.as_deref().map(like_pattern);
    let following = query.following_only;
    let (limit, offset) = (page.limit(), page.offset());

    let (count, raws, followed) = self
      .conn
      .call(move |conn| {
        let filter = "u.user_type = 'SELLER'
           AND u.is_active = 1
           AND f.farm_name IS NOT NULL
           AND f.farm_name <> ''
           AND (:search IS NULL OR f.farm_name LIKE :search ESCAPE '\\')
           AND (:following = 0 OR EXISTS (
                  SELECT 1 FROM farm_follows ff
                  WHERE ff.farm_id = f.id AND ff.user_id = :viewer))";

        let tx = conn.transaction()?;
        let count: i64 = tx.query_row(
          &format!(
            "SELECT COUNT(*) FROM farm_profiles f
             JOIN users u ON u.id = f.owner_id
             WHERE {filter}"
          ),
          rusqlite::named_params! {
            ":search": search,
            ":following": following,
            ":viewer": viewer,
          },
          |r| r.get(0),
        )?;

        let rows = {
          let mut stmt = tx.prepare(&format!(
            "SELECT f.id, f.farm_name, f.farm_image
             FROM farm_profiles f
             JOIN users u ON u.id = f.owner_id
             WHERE {filter}
             ORDER BY f.created_at DESC, f.id DESC
             LIMIT :limit OFFSET :offset"
          ))?;
          stmt
            .query_map(
              rusqlite::named_params! {
                ":search": search,
                ":following": following,
                ":viewer": viewer,
                ":limit": limit,
                ":offset": offset,
              },
              |r| {
                Ok(RawFarmListing {
                  farm_id:    r.get(0)?,
                  farm_name:  r.get(1)?,
                  farm_image: r.get(2)?,
                })
              },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let followed = match viewer {
          Some(viewer) => {
            let ids: Vec<FarmId> = rows.iter().map(|r| r.farm_id).collect();
            followed_among(&tx, viewer, &ids)?
          }
          None => HashSet::new(),
        };
        tx.commit()?;
        Ok((count as u64, rows, followed))
      })
      .await?;

    page.check_in_range(count)?;
    let listings = raws
      .into_iter()
      .map(|raw| {
        let is_following = followed.contains(&raw.farm_id);
        raw.into_listing(is_following)
      })
      .collect();
    Ok(Page::new(page, count, listings))
  }

  // ── Follows ───────────────────────────────────────────────────────────────

  async fn is_following(&self, viewer: Option<UserId>, farm_id: FarmId) -> Result<bool> {
    let Some(viewer) = viewer else {
      return Ok(false);
    };
    let found = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM farm_follows WHERE user_id = ?1 AND farm_id = ?2",
              [viewer, farm_id],
              |_| Ok(()),
            )
            .optional()?
            .is_some(),
        )
      })
      .await?;
    Ok(found)
  }

  async fn toggle_follow(&self, actor: UserId, farm_id: FarmId) -> Result<FollowState> {
    let now_str = encode_dt(Utc::now());

    // The edge change and the counter change share one IMMEDIATE transaction:
    // the write lock is held from the owner lookup until commit, and an early
    // return drops `tx`, rolling back.
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let owner: Option<UserId> = tx
          .query_row("SELECT owner_id FROM farm_profiles WHERE id = ?1", [farm_id], |r| r.get(0))
          .optional()?;
        let Some(owner) = owner else {
          return Ok(ToggleOutcome::NoSuchFarm);
        };
        if owner == actor {
          return Ok(ToggleOutcome::OwnFarm);
        }

        let inserted = tx.execute(
          "INSERT INTO farm_follows (user_id, farm_id, followed_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (user_id, farm_id) DO NOTHING",
          rusqlite::params![actor, farm_id, now_str],
        )? == 1;

        if inserted {
          tx.execute(
            "UPDATE farm_profiles SET follower_count = follower_count + 1 WHERE id = ?1",
            [farm_id],
          )?;
        } else {
          tx.execute(
            "DELETE FROM farm_follows WHERE user_id = ?1 AND farm_id = ?2",
            [actor, farm_id],
          )?;
          tx.execute(
            "UPDATE farm_profiles SET follower_count = MAX(0, follower_count - 1) WHERE id = ?1",
            [farm_id],
          )?;
        }

        let follower_count: i64 = tx.query_row(
          "SELECT follower_count FROM farm_profiles WHERE id = ?1",
          [farm_id],
          |r| r.get(0),
        )?;
        tx.commit()?;

        Ok(ToggleOutcome::Done(FollowState { is_following: inserted, follower_count }))
      })
      .await?;

    match outcome {
      ToggleOutcome::NoSuchFarm => Err(farmhub_core::Error::FarmNotFound(farm_id).into()),
      ToggleOutcome::OwnFarm => {
        Err(farmhub_core::Error::SelfFollow { user: actor, farm: farm_id }.into())
      }
      ToggleOutcome::Done(state) => {
        tracing::debug!(
          user_id = actor,
          farm_id,
          is_following = state.is_following,
          follower_count = state.follower_count,
          "toggled follow"
        );
        Ok(state)
      }
    }
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn record_refresh_token(&self, token: OutstandingToken) -> Result<()> {
    let issued_str  = encode_dt(token.issued_at);
    let expires_str = encode_dt(token.expires_at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO outstanding_tokens (jti, user_id, issued_at, expires_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![token.jti, token.user_id, issued_str, expires_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn is_token_blacklisted(&self, jti: &str) -> Result<bool> {
    let jti = jti.to_owned();
    let found = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row("SELECT 1 FROM blacklisted_tokens WHERE jti = ?1", [jti], |_| Ok(()))
            .optional()?
            .is_some(),
        )
      })
      .await?;
    Ok(found)
  }

  async fn blacklist_token(&self, jti: String, at: DateTime<Utc>) -> Result<bool> {
    let at_str = encode_dt(at);
    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO blacklisted_tokens (jti, blacklisted_at) VALUES (?1, ?2)",
          rusqlite::params![jti, at_str],
        )?)
      })
      .await?;
    Ok(inserted == 1)
  }

  async fn blacklist_user_tokens(&self, user_id: UserId, at: DateTime<Utc>) -> Result<usize> {
    let at_str = encode_dt(at);
    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO blacklisted_tokens (jti, blacklisted_at)
           SELECT jti, ?2 FROM outstanding_tokens WHERE user_id = ?1",
          rusqlite::params![user_id, at_str],
        )?)
      })
      .await?;
    tracing::debug!(user_id, revoked = inserted, "blacklisted user tokens");
    Ok(inserted)
  }
}
