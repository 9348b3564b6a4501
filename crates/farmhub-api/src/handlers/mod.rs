pub mod admin;
pub mod auth;
pub mod farms;

use crate::envelope::ApiResponse;

/// Liveness probe; touches nothing.
pub async fn health() -> ApiResponse<()> { ApiResponse::message("ok") }
