//! The response envelope shared by every endpoint.
//!
//! Success and failure bodies have the same shape:
//!
//! ```json
//! { "success": true, "data": { ... }, "message": "Farm list retrieved." }
//! ```

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;

/// The JSON body of every response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
  pub success: bool,
  pub data:    T,
  pub message: String,
}

/// A successful handler result: status code, payload and a human-readable
/// message. Failures go through [`crate::ApiError`] instead.
#[derive(Debug)]
pub struct ApiResponse<T> {
  status:  StatusCode,
  data:    T,
  message: String,
}

impl<T: Serialize> ApiResponse<T> {
  /// `200 OK`.
  pub fn ok(data: T, message: impl Into<String>) -> Self {
    Self { status: StatusCode::OK, data, message: message.into() }
  }

  /// `201 Created`.
  pub fn created(data: T, message: impl Into<String>) -> Self {
    Self { status: StatusCode::CREATED, data, message: message.into() }
  }
}

impl ApiResponse<()> {
  /// `200 OK` with `"data": null`.
  pub fn message(message: impl Into<String>) -> Self { Self::ok((), message) }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
  fn into_response(self) -> Response {
    let body = Envelope { success: true, data: self.data, message: self.message };
    (self.status, Json(body)).into_response()
  }
}
