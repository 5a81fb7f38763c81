/// Notifications
///
/// Per-recipient inbox entries. The membership kinds carry a payload whose
/// shape is fixed by the type; every other kind carries a free-form
/// [`Notice`] object. Status moves once, `pending → read`.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE notifications (
///     id UUID PRIMARY KEY,
///     family_id UUID NOT NULL REFERENCES families(id),
///     recipient_id UUID NOT NULL REFERENCES users(id),
///     kind notification_type NOT NULL,
///     payload JSONB NOT NULL,
///     status notification_status NOT NULL DEFAULT 'pending',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     read_at TIMESTAMPTZ
/// );
/// ```
///
/// # Wire shape
///
/// ```json
/// {
///   "id": "…",
///   "family_id": "…",
///   "recipient_id": "…",
///   "type": "join_request",
///   "payload": { "request_id": "…", "user_name": "Ana García" },
///   "status": "pending",
///   "created_at": "…",
///   "read_at": null
/// }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Closed set of notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    JoinRequest,
    JoinApproved,
    JoinRejected,
    NewTask,
    ModifiedTask,
    NewEvent,
    ModifiedEvent,
    TaskCompleted,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::JoinRequest => "join_request",
            NotificationType::JoinApproved => "join_approved",
            NotificationType::JoinRejected => "join_rejected",
            NotificationType::NewTask => "new_task",
            NotificationType::ModifiedTask => "modified_task",
            NotificationType::NewEvent => "new_event",
            NotificationType::ModifiedEvent => "modified_event",
            NotificationType::TaskCompleted => "task_completed",
        }
    }

    /// Kinds only the membership workflow may produce.
    pub fn is_membership(&self) -> bool {
        matches!(
            self,
            NotificationType::JoinRequest
                | NotificationType::JoinApproved
                | NotificationType::JoinRejected
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Read,
}

/// Payload of the producer-defined kinds (tasks, events, completions)
///
/// Only `resource_id`, `title` and `changed_by` are interpreted here. Every
/// other field a producer sends is kept verbatim in `extra`, so a bare
/// `{"message": "..."}` is a valid notice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// The task or event the notice is about
    #[serde(
        default,
        alias = "task_id",
        alias = "event_id",
        alias = "taskId",
        alias = "eventId",
        skip_serializing_if = "Option::is_none"
    )]
    pub resource_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Display name of whoever triggered the notification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Notice {
    pub fn about(resource_id: Uuid, title: impl Into<String>, changed_by: impl Into<String>) -> Self {
        Self {
            resource_id: Some(resource_id),
            title: Some(title.into()),
            changed_by: Some(changed_by.into()),
            extra: Map::new(),
        }
    }
}

/// Notification content: the type tag together with its payload.
///
/// The three membership kinds have a fixed shape; the rest carry a [`Notice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum NotificationPayload {
    JoinRequest {
        request_id: Uuid,
        user_name: String,
    },
    JoinApproved {
        /// Family id
        family: Uuid,
        #[serde(default)]
        family_name: String,
    },
    JoinRejected {
        family: Uuid,
        #[serde(default)]
        family_name: String,
    },
    NewTask(Notice),
    ModifiedTask(Notice),
    NewEvent(Notice),
    ModifiedEvent(Notice),
    TaskCompleted(Notice),
}

impl NotificationPayload {
    pub fn kind(&self) -> NotificationType {
        match self {
            NotificationPayload::JoinRequest { .. } => NotificationType::JoinRequest,
            NotificationPayload::JoinApproved { .. } => NotificationType::JoinApproved,
            NotificationPayload::JoinRejected { .. } => NotificationType::JoinRejected,
            NotificationPayload::NewTask(_) => NotificationType::NewTask,
            NotificationPayload::ModifiedTask(_) => NotificationType::ModifiedTask,
            NotificationPayload::NewEvent(_) => NotificationType::NewEvent,
            NotificationPayload::ModifiedEvent(_) => NotificationType::ModifiedEvent,
            NotificationPayload::TaskCompleted(_) => NotificationType::TaskCompleted,
        }
    }

    /// Rebuilds a payload from its stored type and JSON body.
    ///
    /// # Errors
    ///
    /// Fails when `payload` does not have the shape `kind` requires.
    pub fn from_parts(kind: NotificationType, payload: JsonValue) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json!({ "type": kind, "payload": payload }))
    }

    /// The JSON body without the type tag, as stored in the `payload` column.
    pub fn body(&self) -> Result<JsonValue, serde_json::Error> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("payload")
            .map(JsonValue::take)
            .unwrap_or(JsonValue::Null))
    }
}

/// An inbox entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub family_id: Uuid,
    pub recipient_id: Uuid,
    #[serde(flatten)]
    pub content: NotificationPayload,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn kind(&self) -> NotificationType {
        self.content.kind()
    }

    pub fn is_read(&self) -> bool {
        self.status == NotificationStatus::Read
    }
}

/// Input for inserting one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub family_id: Uuid,
    pub recipient_id: Uuid,
    pub content: NotificationPayload,
}

/// Raw row; the payload is checked against its type on conversion.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub family_id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationType,
    pub payload: JsonValue,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = serde_json::Error;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: row.id,
            family_id: row.family_id,
            recipient_id: row.recipient_id,
            content: NotificationPayload::from_parts(row.kind, row.payload)?,
            status: row.status,
            created_at: row.created_at,
            read_at: row.read_at,
        })
    }
}

const NOTIFICATION_COLUMNS: &str =
    "id, family_id, recipient_id, kind, payload, status, created_at, read_at";

impl NotificationRow {
    pub async fn insert<'e, E>(
        executor: E,
        data: &NewNotification,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let body = data
            .content
            .body()
            .map_err(|e| sqlx::Error::Protocol(format!("notification payload: {e}")))?;

        sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications (id, family_id, recipient_id, kind, payload, status)
             VALUES ($1, $2, $3, $4, $5, 'pending')
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(data.family_id)
        .bind(data.recipient_id)
        .bind(data.content.kind())
        .bind(body)
        .fetch_one(executor)
        .await
    }

    /// A recipient's inbox, newest first.
    pub async fn list_by_recipient<'e, E>(
        executor: E,
        recipient_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE recipient_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(recipient_id)
        .fetch_all(executor)
        .await
    }

    /// Recipient-scoped lookup: someone else's notification is `None`.
    pub async fn find_for_recipient<'e, E>(
        executor: E,
        id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE id = $1 AND recipient_id = $2"
        ))
        .bind(id)
        .bind(recipient_id)
        .fetch_optional(executor)
        .await
    }

    /// Idempotent: an already-read row keeps its original `read_at`.
    pub async fn mark_read<'e, E>(
        executor: E,
        id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, NotificationRow>(&format!(
            "UPDATE notifications
             SET status = 'read', read_at = COALESCE(read_at, NOW())
             WHERE id = $1 AND recipient_id = $2
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(id)
        .bind(recipient_id)
        .fetch_optional(executor)
        .await
    }
}
