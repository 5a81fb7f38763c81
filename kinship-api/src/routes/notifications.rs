/// Notification endpoints
///
/// - `GET /v1/notifications`: the caller's inbox, newest first
/// - `GET /v1/notifications/:id`: open one (a pending notification becomes read)
/// - `PUT /v1/notifications/:id/read`: mark read, idempotent
/// - `POST /v1/notifications`: fan-out to members of the caller's family
///
/// Every lookup is scoped to the caller; someone else's notification is a
/// plain `404 not_found`.

use super::{parse_id, Ack};
use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use kinship_shared::{
    auth::middleware::AuthContext,
    models::notification::{Notification, NotificationType},
    notifications::FanOut,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateNotificationsRequest {
    #[serde(rename = "type")]
    pub kind: NotificationType,

    pub recipients: Vec<Uuid>,

    #[serde(default)]
    pub payload: JsonValue,
}

#[derive(Debug, Serialize)]
pub struct ReadAck {
    #[serde(flatten)]
    pub ack: Ack,
    pub notification: Notification,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Notification>>> {
    let inbox = state.notifications().list(&auth).await?;
    Ok(Json(inbox))
}

pub async fn get_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Notification>> {
    let id = parse_id(&id, "notification")?;
    let notification = state.notifications().open(&auth, id).await?;
    Ok(Json(notification))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<ReadAck>> {
    let id = parse_id(&id, "notification")?;
    let notification = state.notifications().mark_read(&auth, id).await?;

    Ok(Json(ReadAck {
        ack: Ack::new("Notification marked as read"),
        notification,
    }))
}

/// Creates one notification per recipient
///
/// ```json
/// { "type": "new_event", "recipients": ["…"], "payload": { "resource_id": "…", "title": "Dinner" } }
/// ```
///
/// # Errors
///
/// - `400 no_family`: the caller has no family
/// - `400 no_recipients`, `400 invalid_recipient`, `400 invalid_payload`
pub async fn create_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateNotificationsRequest>,
) -> ApiResult<(StatusCode, Json<Vec<Notification>>)> {
    let created = state
        .notifications()
        .fan_out(
            &auth,
            FanOut {
                kind: req.kind,
                recipients: req.recipients,
                payload: req.payload,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}
