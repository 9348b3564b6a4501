//! Administrator-only endpoints.

use std::str::FromStr;

use axum::extract::{Query, State, rejection::QueryRejection};
use farmhub_core::{
  page::{Page, PageRequest},
  store::MarketStore,
  user::{User, UserOrdering, UserQuery, UserStatus, UserType},
};
use serde::{Deserialize, Serialize};

use crate::{AppState, envelope::ApiResponse, error::ApiError, extract::AdminUser};

#[derive(Debug, Default, Deserialize)]
pub struct UserListParams {
  pub page:      Option<u32>,
  pub page_size: Option<u32>,
  pub search:    Option<String>,
  pub user_type: Option<String>,
  pub status:    Option<String>,
  pub ordering:  Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserDirectory {
  #[serde(flatten)]
  pub page:        Page<User>,
  /// Every non-admin account, ignoring the filters.
  pub total_users: u64,
}

impl UserListParams {
  /// Unknown roles and orderings fall back to no filter and the default
  /// order; an unknown status is rejected.
  fn to_query(&self) -> Result<UserQuery, ApiError> {
    let status = match self.status.as_deref().map(str::trim) {
      None | Some("") => None,
      Some(s) => Some(UserStatus::from_str(s).map_err(|_| {
        ApiError::validation("status", format!("\"{s}\" is not a valid status."))
      })?),
    };
    let user_type = self
      .user_type
      .as_deref()
      .and_then(|s| UserType::from_str(s.trim()).ok())
      .filter(|t| *t != UserType::Admin);
    let ordering = self
      .ordering
      .as_deref()
      .and_then(|s| UserOrdering::from_str(s.trim()).ok())
      .unwrap_or_default();

    Ok(UserQuery {
      search: self
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned),
      user_type,
      status,
      ordering,
    })
  }
}

/// `GET /admin/users`
pub async fn list_users<S>(
  State(state): State<AppState<S>>,
  AdminUser(admin): AdminUser,
  params: Result<Query<UserListParams>, QueryRejection>,
) -> Result<ApiResponse<UserDirectory>, ApiError>
where
  S: MarketStore + Clone + 'static,
{
  let Query(params) = params?;
  let page = PageRequest::new(params.page, params.page_size).map_err(ApiError::core)?;
  let query = params.to_query()?;

  let users = state
    .store
    .list_users(&query, page)
    .await
    .map_err(ApiError::store::<S>)?;
  let total_users = state
    .store
    .count_non_admin_users()
    .await
    .map_err(ApiError::store::<S>)?;

  tracing::debug!(admin_id = admin.id, count = users.count, "listed users");
  Ok(ApiResponse::ok(UserDirectory { page: users, total_users }, "User list retrieved."))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params(user_type: Option<&str>, status: Option<&str>, ordering: Option<&str>) -> UserListParams {
    UserListParams {
      user_type: user_type.map(Into::into),
      status: status.map(Into::into),
      ordering: ordering.map(Into::into),
      search: Some("  ".into()),
      ..Default::default()
    }
  }

  #[test]
  fn lenient_role_and_ordering() {
    let q = params(Some("ADMIN"), None, Some("bogus")).to_query().unwrap();
    assert_eq!(q.user_type, None);
    assert_eq!(q.ordering, UserOrdering::NewestFirst);
    assert_eq!(q.search, None);

    let q = params(Some("SELLER"), Some("WITHDRAWN"), Some("-name")).to_query().unwrap();
    assert_eq!(q.user_type, Some(UserType::Seller));
    assert_eq!(q.status, Some(UserStatus::Withdrawn));
    assert_eq!(q.ordering, UserOrdering::NameDesc);
  }

  #[test]
  fn unknown_status_rejected() {
    assert!(matches!(
      params(None, Some("SLEEPING"), None).to_query(),
      Err(ApiError::Validation { .. })
    ));
  }
}
