//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error is rendered inside the standard [`Envelope`] with
//! `"success": false`. Internal errors are logged here and replaced by a
//! generic message so no detail reaches the caller.

use std::collections::BTreeMap;

use axum::{
  Json,
  extract::rejection::{JsonRejection, QueryRejection},
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use farmhub_core::store::MarketStore;
use serde::Serialize;
use thiserror::Error;

use crate::envelope::Envelope;

/// Key used for errors that do not belong to a single input field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

// ─── Field errors ─────────────────────────────────────────────────────────────

/// Validation messages grouped by the input field they concern.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
  pub fn new() -> Self { Self::default() }

  /// A single message for a single field.
  pub fn single(field: &str, message: impl Into<String>) -> Self {
    let mut errors = Self::new();
    errors.add(field, message);
    errors
  }

  pub fn add(&mut self, field: &str, message: impl Into<String>) {
    self.0.entry(field.to_owned()).or_default().push(message.into());
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn get(&self, field: &str) -> Option<&[String]> {
    self.0.get(field).map(Vec::as_slice)
  }

  /// Take a required field, recording an error if it is missing or blank.
  pub fn require(&mut self, field: &str, value: Option<String>) -> String {
    match value {
      Some(v) if !v.trim().is_empty() => v,
      Some(_) => {
        self.add(field, "This field may not be blank.");
        String::new()
      }
      None => {
        self.add(field, "This field is required.");
        String::new()
      }
    }
  }

  /// `Ok(())` if no error was recorded, otherwise a validation error carrying
  /// every recorded message.
  pub fn finish(self, message: impl Into<String>) -> Result<(), ApiError> {
    if self.is_empty() {
      Ok(())
    } else {
      Err(ApiError::Validation { message: message.into(), errors: self })
    }
  }
}

// ─── Error ────────────────────────────────────────────────────────────────────

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("validation failed: {message}")]
  Validation { message: String, errors: FieldErrors },

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn validation(field: &str, message: impl Into<String>) -> Self {
    let message = message.into();
    Self::Validation {
      errors: FieldErrors::single(field, message.clone()),
      message,
    }
  }

  pub fn internal(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
    Self::Internal(err.into())
  }

  /// Translate a store error, mapping domain failures to their HTTP class
  /// and everything else to an internal error.
  pub fn store<S: MarketStore>(err: S::Error) -> Self {
    use farmhub_core::Error as Core;

    let Some(core) = S::as_core_error(&err) else {
      return Self::Internal(Box::new(err));
    };
    match core {
      Core::FarmNotFound(_) => Self::NotFound("Farm not found.".into()),
      Core::UserNotFound(_) => Self::NotFound("User not found.".into()),
      Core::InvalidPage(_) => Self::NotFound("Invalid page.".into()),
      Core::SelfFollow { .. } => Self::validation("farm_id", "You cannot follow your own farm."),
      Core::DuplicateUsername(_) => {
        Self::validation("username", "A user with that username already exists.")
      }
      Core::DuplicateEmail(_) => Self::validation("email", "A user with that email already exists."),
      Core::NotASeller(_) => Self::Forbidden("Only sellers can manage a farm profile.".into()),
    }
  }

  /// Translate a core error raised outside the store (e.g. pagination input).
  pub fn core(err: farmhub_core::Error) -> Self {
    match err {
      farmhub_core::Error::InvalidPage(_) => {
        Self::validation("page", "A positive page number and page size are required.")
      }
      other => Self::internal(other),
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      Self::Validation { .. } => StatusCode::BAD_REQUEST,
      Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      Self::Forbidden(_) => StatusCode::FORBIDDEN,
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self {
    Self::validation(NON_FIELD_ERRORS, rejection.body_text())
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    Self::validation(NON_FIELD_ERRORS, rejection.body_text())
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let (message, data) = match self {
      Self::Validation { message, errors } => (message, serde_json::to_value(errors).ok()),
      Self::Unauthorized(m) | Self::Forbidden(m) | Self::NotFound(m) => (m, None),
      Self::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        ("An internal error occurred while processing the request.".to_owned(), None)
      }
    };

    let mut res = (status, Json(Envelope { success: false, data, message })).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer realm=\"farmhub\""));
    }
    res
  }
}
