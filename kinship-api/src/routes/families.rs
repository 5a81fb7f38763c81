/// Family endpoints
///
/// - `POST /v1/families`: create a family owned by the caller
/// - `GET /v1/families/search?q=`: find families to join
/// - `GET /v1/families/:id`: details with owner name and member count
/// - `GET /v1/families/:id/members`: members only

use super::parse_id;
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use kinship_shared::{
    auth::{authorization::require_family_member, middleware::AuthContext},
    models::{family::Family, user::PublicUser},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFamilyRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct FamilyDetails {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub owner_name: Option<String>,
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creates a family and attaches the caller as its owner
///
/// # Errors
///
/// - `409 already_in_family`: the caller already belongs to a family
pub async fn create_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateFamilyRequest>,
) -> ApiResult<(StatusCode, Json<Family>)> {
    req.validate()?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Family name must not be blank".to_string()));
    }

    let family = state.membership().create_family(&auth, name).await?;
    Ok((StatusCode::CREATED, Json(family)))
}

pub async fn search_families(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthContext>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<Family>>> {
    let q = query.q.trim();
    if q.is_empty() {
        return Err(ApiError::BadRequest("Query parameter q is required".to_string()));
    }

    let families = state.store.search_families(q).await?;
    tracing::debug!(query = q, results = families.len(), "Family search");

    Ok(Json(families))
}

pub async fn get_family(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<FamilyDetails>> {
    let family_id = parse_id(&id, "family")?;

    let family = state
        .store
        .find_family_by_id(family_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Family {} not found", family_id)))?;

    let owner_name = state
        .store
        .find_user_by_id(family.owner_id)
        .await?
        .map(|owner| owner.display_name());
    let member_count = state.store.count_members(family.id).await?;

    Ok(Json(FamilyDetails {
        id: family.id,
        name: family.name,
        owner_id: family.owner_id,
        owner_name,
        member_count,
        created_at: family.created_at,
        updated_at: family.updated_at,
    }))
}

/// Lists the members of a family the caller belongs to
///
/// # Errors
///
/// - `403 forbidden`: the caller is not a member
/// - `404 family_not_found`
pub async fn list_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<PublicUser>>> {
    let family_id = parse_id(&id, "family")?;

    let (family, _) = require_family_member(&*state.store, &auth, family_id).await?;
    let members = state.store.list_members(family.id).await?;

    Ok(Json(members.iter().map(|m| m.to_public()).collect()))
}
