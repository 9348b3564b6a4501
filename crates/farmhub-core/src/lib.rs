//! Domain types and the storage trait for the Farmhub marketplace backend.
//!
//! Has no HTTP or database dependencies; the store and API crates build on it.

pub mod error;
pub mod farm;
pub mod page;
pub mod session;
pub mod store;
pub mod user;

pub use error::{Error, Result};

/// Primary key of a `users` row.
pub type UserId = i64;

/// Primary key of a `farm_profiles` row.
pub type FarmId = i64;
