/// Family calendar endpoints
///
/// - `GET /v1/events`: every family event, earliest first
/// - `POST /v1/events`
/// - `GET /v1/events/:id`
/// - `PUT /v1/events/:id`: partial update
/// - `DELETE /v1/events/:id`: `204`, any member
///
/// The caller must belong to a family (`400 no_family`). Events of other
/// families are `404 not_found`.

use super::parse_id;
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use kinship_shared::{
    auth::middleware::AuthContext,
    events::NewEvent,
    models::event::{Event, UpdateEvent},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[serde(default)]
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: String,

    pub starts_at: DateTime<Utc>,

    pub ends_at: DateTime<Utc>,

    #[serde(default)]
    #[validate(length(max = 300, message = "Location must be at most 300 characters"))]
    pub location: String,

    #[serde(default)]
    pub participants: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateEventRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    pub starts_at: Option<DateTime<Utc>>,

    pub ends_at: Option<DateTime<Utc>>,

    #[validate(length(max = 300, message = "Location must be at most 300 characters"))]
    pub location: Option<String>,

    pub participants: Option<Vec<Uuid>>,
}

impl From<UpdateEventRequest> for UpdateEvent {
    fn from(req: UpdateEventRequest) -> Self {
        UpdateEvent {
            title: req.title,
            description: req.description,
            starts_at: req.starts_at,
            ends_at: req.ends_at,
            location: req.location,
            participants: req.participants,
        }
    }
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Event>>> {
    Ok(Json(state.events().list(&auth).await?))
}

pub async fn get_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Event>> {
    let id = parse_id(&id, "event")?;
    Ok(Json(state.events().get(&auth, id).await?))
}

/// Creates an event; participants other than the caller get a `new_event`
/// notification.
///
/// # Errors
///
/// - `400 invalid_schedule`: `ends_at` before `starts_at`
/// - `400 invalid_participant`: a participant outside the caller's family
pub async fn create_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateEventRequest>,
) -> ApiResult<(StatusCode, Json<Event>)> {
    req.validate()?;
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title must not be blank".to_string()));
    }

    let event = state
        .events()
        .create(
            &auth,
            NewEvent {
                title: req.title,
                description: req.description,
                starts_at: req.starts_at,
                ends_at: req.ends_at,
                location: req.location,
                participants: req.participants,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn update_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<UpdateEventRequest>,
) -> ApiResult<Json<Event>> {
    let id = parse_id(&id, "event")?;
    req.validate()?;

    let update = UpdateEvent::from(req);
    if update.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }
    if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("Title must not be blank".to_string()));
    }

    Ok(Json(state.events().update(&auth, id, update).await?))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "event")?;
    state.events().delete(&auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_maps_to_update() {
        let req: UpdateEventRequest =
            serde_json::from_str(r#"{"ends_at":"2026-03-01T20:00:00Z","location":"Casa"}"#).unwrap();
        let update = UpdateEvent::from(req);

        assert!(update.ends_at.is_some());
        assert_eq!(update.location.as_deref(), Some("Casa"));
        assert!(update.starts_at.is_none());
        assert!(!update.is_empty());
    }

    #[test]
    fn test_create_request_requires_schedule() {
        let missing = serde_json::from_str::<CreateEventRequest>(r#"{"title":"Cena"}"#);
        assert!(missing.is_err());

        let req: CreateEventRequest = serde_json::from_str(
            r#"{"title":"Cena","starts_at":"2026-03-01T20:00:00Z","ends_at":"2026-03-01T22:00:00Z"}"#,
        )
        .unwrap();
        assert!(req.participants.is_empty());
        assert!(req.location.is_empty());
    }
}
