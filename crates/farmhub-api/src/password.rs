//! Password hashing and strength checks.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand_core::OsRng;

use crate::error::ApiError;

pub const MIN_LENGTH: usize = 8;

const COMMON: &[&str] = &[
  "password", "password1", "12345678", "123456789", "1234567890", "qwerty123", "qwertyuiop",
  "iloveyou", "abcd1234", "11111111", "00000000", "sunshine", "princess", "letmein1",
  "football", "baseball", "welcome1", "admin123",
];

/// Produce an argon2 PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|h| h.to_string())
    .map_err(|e| ApiError::internal(format!("argon2 error: {e}")))
}

/// Whether `password` matches the stored PHC string. A malformed hash never
/// matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
  let Ok(parsed) = PasswordHash::new(hash) else {
    return false;
  };
  Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

/// Every reason `password` is too weak for an account called `username`.
/// Empty means acceptable.
pub fn weaknesses(password: &str, username: &str) -> Vec<&'static str> {
  let mut out = Vec::new();
  if password.chars().count() < MIN_LENGTH {
    out.push("This password is too short. It must contain at least 8 characters.");
  }
  if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
    out.push("This password is entirely numeric.");
  }
  let lower = password.to_lowercase();
  if COMMON.contains(&lower.as_str()) {
    out.push("This password is too common.");
  }
  let user = username.to_lowercase();
  if user.len() >= 3 && (lower.contains(&user) || user.contains(&lower)) {
    out.push("The password is too similar to the username.");
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hash_and_verify() {
    let hash = hash_password("correct horse").unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(verify_password("correct horse", &hash));
    assert!(!verify_password("wrong horse", &hash));
    assert!(!verify_password("correct horse", "not-a-phc-string"));
  }

  #[test]
  fn weak_passwords() {
    assert!(weaknesses("Gr33nAcres!", "farmer").is_empty());
    assert_eq!(weaknesses("short", "bob").len(), 1);
    assert!(weaknesses("12345678", "bob").contains(&"This password is entirely numeric."));
    assert!(weaknesses("Password", "bob").contains(&"This password is too common."));
    assert!(
      weaknesses("alice-farm-2024", "alice")
        .contains(&"The password is too similar to the username.")
    );
  }
}
