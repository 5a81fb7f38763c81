/// Family calendar events
///
/// A dated entry on the family calendar with an optional free-text location
/// and a list of participating members.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE events (
///     id UUID PRIMARY KEY,
///     family_id UUID NOT NULL REFERENCES families(id) ON DELETE CASCADE,
///     title VARCHAR(200) NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     starts_at TIMESTAMPTZ NOT NULL,
///     ends_at TIMESTAMPTZ NOT NULL,
///     location VARCHAR(300) NOT NULL DEFAULT '',
///     participants UUID[] NOT NULL DEFAULT '{}',
///     created_by UUID NOT NULL REFERENCES users(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CHECK (ends_at >= starts_at)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub family_id: Uuid,
    pub title: String,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub location: String,
    pub participants: Vec<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// An event may not end before it starts. Zero-length events are fine.
    pub fn has_valid_schedule(&self) -> bool {
        self.ends_at >= self.starts_at
    }

    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }
}

/// Input for [`Event::create`]
#[derive(Debug, Clone)]
pub struct CreateEvent {
    pub family_id: Uuid,
    pub title: String,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub location: String,
    pub participants: Vec<Uuid>,
    pub created_by: Uuid,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateEvent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub participants: Option<Vec<Uuid>>,
}

impl UpdateEvent {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.starts_at.is_none()
            && self.ends_at.is_none()
            && self.location.is_none()
            && self.participants.is_none()
    }

    pub fn apply_to(&self, event: &mut Event) {
        if let Some(title) = &self.title {
            event.title = title.clone();
        }
        if let Some(description) = &self.description {
            event.description = description.clone();
        }
        if let Some(starts_at) = self.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(ends_at) = self.ends_at {
            event.ends_at = ends_at;
        }
        if let Some(location) = &self.location {
            event.location = location.clone();
        }
        if let Some(participants) = &self.participants {
            event.participants = participants.clone();
        }
    }
}

const EVENT_COLUMNS: &str = "id, family_id, title, description, starts_at, ends_at, location, \
                             participants, created_by, created_at, updated_at";

impl Event {
    pub async fn create<'e, E>(executor: E, data: CreateEvent) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Event>(&format!(
            "INSERT INTO events (id, family_id, title, description, starts_at, ends_at, location, participants, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(data.family_id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.starts_at)
        .bind(data.ends_at)
        .bind(data.location)
        .bind(data.participants)
        .bind(data.created_by)
        .fetch_one(executor)
        .await
    }

    pub async fn find_in_family<'e, E>(
        executor: E,
        id: Uuid,
        family_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 AND family_id = $2"
        ))
        .bind(id)
        .bind(family_id)
        .fetch_optional(executor)
        .await
    }

    /// Row-locking variant of [`Event::find_in_family`] for use inside a
    /// transaction.
    pub async fn lock_in_family<'e, E>(
        executor: E,
        id: Uuid,
        family_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 AND family_id = $2 FOR UPDATE"
        ))
        .bind(id)
        .bind(family_id)
        .fetch_optional(executor)
        .await
    }

    /// Earliest first.
    pub async fn list_by_family<'e, E>(executor: E, family_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE family_id = $1
             ORDER BY starts_at, created_at, id"
        ))
        .bind(family_id)
        .fetch_all(executor)
        .await
    }

    pub async fn save<'e, E>(executor: E, event: &Event) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Event>(&format!(
            "UPDATE events
             SET title = $3, description = $4, starts_at = $5, ends_at = $6,
                 location = $7, participants = $8, updated_at = NOW()
             WHERE id = $1 AND family_id = $2
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(event.id)
        .bind(event.family_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.starts_at)
        .bind(event.ends_at)
        .bind(&event.location)
        .bind(&event.participants)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete<'e, E>(executor: E, id: Uuid, family_id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM events WHERE id = $1 AND family_id = $2")
            .bind(id)
            .bind(family_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
