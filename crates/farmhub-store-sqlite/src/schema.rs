//! SQL schema for the Farmhub SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id                     INTEGER PRIMARY KEY AUTOINCREMENT,
    username               TEXT NOT NULL UNIQUE,
    email                  TEXT NOT NULL UNIQUE,
    name                   TEXT NOT NULL,
    password_hash          TEXT NOT NULL,   -- argon2 PHC string
    user_type              TEXT NOT NULL DEFAULT 'CONSUMER',
    status                 TEXT NOT NULL DEFAULT 'ACTIVE',
    is_active              INTEGER NOT NULL DEFAULT 1,
    is_marketing_consented INTEGER NOT NULL DEFAULT 0,
    date_joined            TEXT NOT NULL,   -- RFC 3339 UTC, fixed precision
    last_login             TEXT,
    withdrawn_at           TEXT,
    blocked_at             TEXT
);

CREATE TABLE IF NOT EXISTS farm_profiles (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id         INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    farm_name        TEXT,
    farm_description TEXT,
    farm_image       TEXT,
    location         TEXT,
    contact_phone    TEXT,
    contact_email    TEXT,
    -- Cached count of farm_follows rows; only the follow toggle writes it.
    follower_count   INTEGER NOT NULL DEFAULT 0 CHECK (follower_count >= 0),
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

-- Existence of a row is the follow state; there is no soft-delete flag.
CREATE TABLE IF NOT EXISTS farm_follows (
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    farm_id     INTEGER NOT NULL REFERENCES farm_profiles(id) ON DELETE CASCADE,
    followed_at TEXT NOT NULL,
    PRIMARY KEY (user_id, farm_id)
);

-- Every refresh token ever issued.
CREATE TABLE IF NOT EXISTS outstanding_tokens (
    jti        TEXT PRIMARY KEY,
    user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    issued_at  TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS blacklisted_tokens (
    jti            TEXT PRIMARY KEY,
    blacklisted_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS farm_profiles_created_idx ON farm_profiles(created_at);
CREATE INDEX IF NOT EXISTS farm_follows_farm_idx     ON farm_follows(farm_id);
CREATE INDEX IF NOT EXISTS outstanding_user_idx      ON outstanding_tokens(user_id);

PRAGMA user_version = 1;
";
