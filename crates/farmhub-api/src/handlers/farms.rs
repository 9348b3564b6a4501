//! Farm listing, detail, follow toggle and the seller's own profile.

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, PathRejection, QueryRejection},
  },
};
use farmhub_core::{
  FarmId,
  farm::{FarmListing, FarmProfile, FarmProfileInput, FarmQuery, FollowState},
  page::{Page, PageRequest},
  store::MarketStore,
};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  envelope::ApiResponse,
  error::{ApiError, FieldErrors},
  extract::AuthUser,
};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub page:      Option<u32>,
  pub page_size: Option<u32>,
  pub search:    Option<String>,
  #[serde(default)]
  pub following: bool,
}

/// A farm as seen by one viewer.
#[derive(Debug, Serialize)]
pub struct FarmDetail {
  #[serde(flatten)]
  pub farm:         FarmProfile,
  pub is_following: bool,
}

fn farm_id(path: Result<Path<FarmId>, PathRejection>) -> Result<FarmId, ApiError> {
  path
    .map(|Path(id)| id)
    .map_err(|_| ApiError::validation("farm_id", "A valid integer is required."))
}

/// `GET /farms`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  AuthUser(viewer): AuthUser,
  params: Result<Query<ListParams>, QueryRejection>,
) -> Result<ApiResponse<Page<FarmListing>>, ApiError>
where
  S: MarketStore + Clone + 'static,
{
  let Query(params) = params?;
  let page = PageRequest::new(params.page, params.page_size).map_err(ApiError::core)?;
  let query = FarmQuery {
    search:         params.search.filter(|s| !s.trim().is_empty()),
    following_only: params.following,
  };

  let farms = state
    .store
    .list_farms(Some(viewer.id), &query, page)
    .await
    .map_err(ApiError::store::<S>)?;

  Ok(ApiResponse::ok(farms, "Farm list retrieved."))
}

/// `GET /farms/{farm_id}`
pub async fn detail<S>(
  State(state): State<AppState<S>>,
  AuthUser(viewer): AuthUser,
  path: Result<Path<FarmId>, PathRejection>,
) -> Result<ApiResponse<FarmDetail>, ApiError>
where
  S: MarketStore + Clone + 'static,
{
  let id = farm_id(path)?;
  let farm = state
    .store
    .get_farm(id)
    .await
    .map_err(ApiError::store::<S>)?
    .ok_or_else(|| ApiError::NotFound("Farm not found.".into()))?;
  let is_following = state
    .store
    .is_following(Some(viewer.id), id)
    .await
    .map_err(ApiError::store::<S>)?;

  Ok(ApiResponse::ok(FarmDetail { farm, is_following }, "Farm retrieved."))
}

/// `POST /farms/{farm_id}/follow`
pub async fn toggle_follow<S>(
  State(state): State<AppState<S>>,
  AuthUser(actor): AuthUser,
  path: Result<Path<FarmId>, PathRejection>,
) -> Result<ApiResponse<FollowState>, ApiError>
where
  S: MarketStore + Clone + 'static,
{
  let id = farm_id(path)?;
  let follow = state
    .store
    .toggle_follow(actor.id, id)
    .await
    .map_err(ApiError::store::<S>)?;

  let message = if follow.is_following {
    "Followed the farm."
  } else {
    "Unfollowed the farm."
  };
  Ok(ApiResponse::ok(follow, message))
}

/// Length limits on profile fields, in characters.
const FIELD_LIMITS: &[(&str, usize)] = &[
  ("farm_name", 100),
  ("farm_image", 500),
  ("location", 200),
  ("contact_phone", 20),
];

fn validate_profile(input: &FarmProfileInput) -> Result<(), ApiError> {
  let mut errors = FieldErrors::new();
  let values = [
    input.farm_name.as_deref(),
    input.farm_image.as_deref(),
    input.location.as_deref(),
    input.contact_phone.as_deref(),
  ];
  for ((field, max), value) in FIELD_LIMITS.iter().zip(values) {
    if value.is_some_and(|v| v.chars().count() > *max) {
      errors.add(field, format!("Ensure this field has no more than {max} characters."));
    }
  }
  if let Some(email) = input.contact_email.as_deref()
    && !email.is_empty()
    && !looks_like_email(email)
  {
    errors.add("contact_email", "Enter a valid email address.");
  }
  errors.finish("Invalid farm profile.")
}

pub(crate) fn looks_like_email(s: &str) -> bool {
  match s.split_once('@') {
    Some((local, domain)) => {
      !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
    }
    None => false,
  }
}

/// `PUT /farms/me`
pub async fn upsert_mine<S>(
  State(state): State<AppState<S>>,
  AuthUser(owner): AuthUser,
  body: Result<Json<FarmProfileInput>, JsonRejection>,
) -> Result<ApiResponse<FarmProfile>, ApiError>
where
  S: MarketStore + Clone + 'static,
{
  if !owner.user_type.can_own_farm() {
    return Err(ApiError::Forbidden("Only sellers can manage a farm profile.".into()));
  }
  let Json(input) = body?;
  validate_profile(&input)?;

  let (farm, created) = state
    .store
    .upsert_farm_profile(owner.id, input)
    .await
    .map_err(ApiError::store::<S>)?;

  Ok(if created {
    ApiResponse::created(farm, "Farm profile created.")
  } else {
    ApiResponse::ok(farm, "Farm profile updated.")
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn profile_limits() {
    let ok = FarmProfileInput {
      farm_name: Some("Green Acres".into()),
      contact_email: Some("hello@greenacres.example".into()),
      ..Default::default()
    };
    assert!(validate_profile(&ok).is_ok());

    let bad = FarmProfileInput {
      farm_name: Some("x".repeat(101)),
      contact_email: Some("nope".into()),
      ..Default::default()
    };
    let Err(ApiError::Validation { errors, .. }) = validate_profile(&bad) else {
      panic!("expected validation error");
    };
    assert!(errors.get("farm_name").is_some());
    assert!(errors.get("contact_email").is_some());
    assert!(errors.get("location").is_none());
  }

  #[test]
  fn email_shape() {
    assert!(looks_like_email("a@b.co"));
    assert!(!looks_like_email("@b.co"));
    assert!(!looks_like_email("a@localhost"));
    assert!(!looks_like_email("a@b."));
  }
}
