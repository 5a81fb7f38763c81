/// Family tasks
///
/// Chores and to-dos shared inside a family. Status cycles through three
/// values and wraps around:
///
/// ```text
/// pending → in_progress → completed → pending
/// ```
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_status AS ENUM ('pending', 'in_progress', 'completed');
/// CREATE TYPE task_priority AS ENUM ('low', 'medium', 'high');
///
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY,
///     family_id UUID NOT NULL REFERENCES families(id) ON DELETE CASCADE,
///     title VARCHAR(200) NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     due_date TIMESTAMPTZ,
///     status task_status NOT NULL DEFAULT 'pending',
///     priority task_priority NOT NULL DEFAULT 'medium',
///     assigned_to UUID[] NOT NULL DEFAULT '{}',
///     created_by UUID NOT NULL REFERENCES users(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    /// Next step of the cycle; `completed` wraps back to `pending`.
    pub fn next(self) -> TaskStatus {
        match self {
            TaskStatus::Pending => TaskStatus::InProgress,
            TaskStatus::InProgress => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub family_id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assigned_to: Vec<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_assigned_to(&self, user_id: Uuid) -> bool {
        self.assigned_to.contains(&user_id)
    }
}

/// Input for [`Task::create`]
#[derive(Debug, Clone)]
pub struct CreateTask {
    pub family_id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: TaskPriority,
    pub assigned_to: Vec<Uuid>,
    pub created_by: Uuid,
}

/// Partial update. `None` leaves a field untouched; `due_date: Some(None)`
/// clears it.
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assigned_to: Option<Vec<Uuid>>,
}

impl UpdateTask {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.assigned_to.is_none()
    }

    /// Applies the update to an in-memory copy.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(assigned_to) = &self.assigned_to {
            task.assigned_to = assigned_to.clone();
        }
    }
}

const TASK_COLUMNS: &str = "id, family_id, title, description, due_date, status, priority, \
                            assigned_to, created_by, created_at, updated_at";

impl Task {
    pub async fn create<'e, E>(executor: E, data: CreateTask) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks (id, family_id, title, description, due_date, priority, assigned_to, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(data.family_id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.due_date)
        .bind(data.priority)
        .bind(data.assigned_to)
        .bind(data.created_by)
        .fetch_one(executor)
        .await
    }

    /// Family-scoped lookup; tasks of other families are `None`.
    pub async fn find_in_family<'e, E>(
        executor: E,
        id: Uuid,
        family_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND family_id = $2"
        ))
        .bind(id)
        .bind(family_id)
        .fetch_optional(executor)
        .await
    }

    /// Like [`Task::find_in_family`] but takes a row lock held until the
    /// surrounding transaction ends.
    pub async fn lock_in_family<'e, E>(
        executor: E,
        id: Uuid,
        family_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND family_id = $2 FOR UPDATE"
        ))
        .bind(id)
        .bind(family_id)
        .fetch_optional(executor)
        .await
    }

    /// Tasks of a family, optionally only those assigned to `assignee`.
    /// Soonest due first, undated last.
    pub async fn list_by_family<'e, E>(
        executor: E,
        family_id: Uuid,
        assignee: Option<Uuid>,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE family_id = $1 AND ($2::uuid IS NULL OR $2 = ANY(assigned_to))
             ORDER BY due_date ASC NULLS LAST, created_at, id"
        ))
        .bind(family_id)
        .bind(assignee)
        .fetch_all(executor)
        .await
    }

    /// Writes every field of `task` back. Callers read, apply an
    /// [`UpdateTask`], then save inside one transaction.
    pub async fn save<'e, E>(executor: E, task: &Task) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks
             SET title = $3, description = $4, due_date = $5, status = $6,
                 priority = $7, assigned_to = $8, updated_at = NOW()
             WHERE id = $1 AND family_id = $2
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(task.id)
        .bind(task.family_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.due_date)
        .bind(task.status)
        .bind(task.priority)
        .bind(&task.assigned_to)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete<'e, E>(executor: E, id: Uuid, family_id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND family_id = $2")
            .bind(id)
            .bind(family_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
