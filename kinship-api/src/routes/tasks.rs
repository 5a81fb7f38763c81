/// Family task board endpoints
///
/// - `GET /v1/tasks`: `{tasks, is_owner}`
/// - `POST /v1/tasks`
/// - `GET /v1/tasks/:id`
/// - `PUT /v1/tasks/:id`: partial update
/// - `DELETE /v1/tasks/:id`: owner or creator
/// - `POST /v1/tasks/:id/advance`: next status in the cycle
///
/// The caller must belong to a family (`400 no_family`). Tasks of other
/// families are `404 not_found`.

use super::{parse_id, Ack};
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
    models::task::{Task, TaskPriority, TaskStatus, UpdateTask},
    tasks::{NewTask, TaskList},
};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[serde(default)]
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: String,

    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub priority: TaskPriority,

    #[serde(default)]
    pub assigned_to: Vec<Uuid>,
}

/// Absent fields are left alone; `"due_date": null` clears the due date.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Option<DateTime<Utc>>>,

    pub status: Option<TaskStatus>,

    pub priority: Option<TaskPriority>,

    pub assigned_to: Option<Vec<Uuid>>,
}

/// Distinguishes an explicit `null` from a missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl From<UpdateTaskRequest> for UpdateTask {
    fn from(req: UpdateTaskRequest) -> Self {
        UpdateTask {
            title: req.title,
            description: req.description,
            due_date: req.due_date,
            status: req.status,
            priority: req.priority,
            assigned_to: req.assigned_to,
        }
    }
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<TaskList>> {
    Ok(Json(state.tasks().list(&auth).await?))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    let id = parse_id(&id, "task")?;
    Ok(Json(state.tasks().get(&auth, id).await?))
}

/// Creates a task; assignees other than the caller get a `new_task` notification.
///
/// # Errors
///
/// - `400 invalid_assignee`: an assignee outside the caller's family
pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    req.validate()?;
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title must not be blank".to_string()));
    }

    let task = state
        .tasks()
        .create(
            &auth,
            NewTask {
                title: req.title,
                description: req.description,
                due_date: req.due_date,
                priority: req.priority,
                assigned_to: req.assigned_to,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let id = parse_id(&id, "task")?;
    req.validate()?;

    let update = UpdateTask::from(req);
    if update.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }
    if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("Title must not be blank".to_string()));
    }

    Ok(Json(state.tasks().update(&auth, id, update).await?))
}

pub async fn advance_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    let id = parse_id(&id, "task")?;
    Ok(Json(state.tasks().advance(&auth, id).await?))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Ack>> {
    let id = parse_id(&id, "task")?;
    state.tasks().delete(&auth, id).await?;
    Ok(Json(Ack::new("Task deleted")))
}
