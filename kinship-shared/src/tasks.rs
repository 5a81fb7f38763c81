//! Task board: shared family tasks.
//!
//! Every operation is scoped to the caller's family. Task changes notify the
//! people involved, but those notifications are best-effort: a task write
//! never fails because its notification could not be stored.

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::authorization::{require_family, require_user, AuthzError};
use crate::auth::middleware::AuthContext;
use crate::models::family::Family;
use crate::models::notification::{NewNotification, Notice, NotificationPayload};
use crate::models::task::{CreateTask, Task, TaskPriority, TaskStatus, UpdateTask};
use crate::models::user::User;
use crate::notifications::NotificationCenter;
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("you must belong to a family to manage tasks")]
    NoFamily,

    #[error("task not found")]
    NotFound,

    #[error("assignee {0} is not a member of your family")]
    InvalidAssignee(Uuid),

    #[error("only the family owner or the task creator may delete a task")]
    Forbidden,

    #[error("user not found")]
    UserNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TaskError {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::NoFamily => "no_family",
            TaskError::NotFound => "not_found",
            TaskError::InvalidAssignee(_) => "invalid_assignee",
            TaskError::Forbidden => "forbidden",
            TaskError::UserNotFound => "user_not_found",
            TaskError::Store(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            TaskError::NoFamily | TaskError::InvalidAssignee(_) => StatusCode::BAD_REQUEST,
            TaskError::NotFound => StatusCode::NOT_FOUND,
            TaskError::Forbidden => StatusCode::FORBIDDEN,
            TaskError::UserNotFound => StatusCode::UNAUTHORIZED,
            TaskError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthzError> for TaskError {
    fn from(e: AuthzError) -> Self {
        match e {
            AuthzError::UserNotFound => TaskError::UserNotFound,
            AuthzError::Store(e) => TaskError::Store(e),
            AuthzError::NotOwner => TaskError::Forbidden,
            AuthzError::NoFamily | AuthzError::NotMember(_) | AuthzError::FamilyNotFound(_) => {
                TaskError::NoFamily
            }
        }
    }
}

pub type TaskResult<T> = Result<T, TaskError>;

/// Input for [`TaskBoard::create`]
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: TaskPriority,
    pub assigned_to: Vec<Uuid>,
}

/// What a member sees on the board
#[derive(Debug, Clone, Serialize)]
pub struct TaskList {
    pub tasks: Vec<Task>,
    pub is_owner: bool,
}

/// Caller resolved against their family
struct Actor {
    user: User,
    family: Family,
}

impl Actor {
    fn is_owner(&self) -> bool {
        self.family.is_owned_by(self.user.id)
    }
}

#[derive(Clone)]
pub struct TaskBoard {
    store: Arc<dyn Store>,
    notifications: NotificationCenter,
}

impl TaskBoard {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            notifications: NotificationCenter::new(store.clone()),
            store,
        }
    }

    async fn actor(&self, auth: &AuthContext) -> TaskResult<Actor> {
        let user = require_user(&*self.store, auth).await?;
        let family_id = require_family(&user)?;
        let family = self
            .store
            .find_family_by_id(family_id)
            .await?
            .ok_or(TaskError::NoFamily)?;
        Ok(Actor { user, family })
    }

    /// De-duplicates assignees and checks each belongs to the family.
    async fn check_assignees(&self, family_id: Uuid, assignees: Vec<Uuid>) -> TaskResult<Vec<Uuid>> {
        let mut seen = HashSet::new();
        let assignees: Vec<Uuid> = assignees.into_iter().filter(|id| seen.insert(*id)).collect();
        if assignees.is_empty() {
            return Ok(assignees);
        }

        let members: HashSet<Uuid> = self
            .store
            .list_members(family_id)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();
        match assignees.iter().find(|id| !members.contains(id)) {
            Some(outsider) => Err(TaskError::InvalidAssignee(*outsider)),
            None => Ok(assignees),
        }
    }

    fn notice(task: &Task, actor: &Actor) -> Notice {
        Notice::about(task.id, task.title.clone(), actor.user.display_name())
    }

    fn to_assignees(
        task: &Task,
        actor: &Actor,
        content: impl Fn(Notice) -> NotificationPayload,
    ) -> Vec<NewNotification> {
        task.assigned_to
            .iter()
            .filter(|id| **id != actor.user.id)
            .map(|recipient_id| NewNotification {
                family_id: task.family_id,
                recipient_id: *recipient_id,
                content: content(Self::notice(task, actor)),
            })
            .collect()
    }

    /// `task_completed` to the owner when a task has just been completed by
    /// someone else.
    fn completion_notice(before: &Task, after: &Task, actor: &Actor) -> Option<NewNotification> {
        let completed_now =
            before.status != TaskStatus::Completed && after.status == TaskStatus::Completed;
        if !completed_now || actor.is_owner() {
            return None;
        }
        Some(NewNotification {
            family_id: after.family_id,
            recipient_id: actor.family.owner_id,
            content: NotificationPayload::TaskCompleted(Self::notice(after, actor)),
        })
    }

    /// The owner sees every family task, other members only their own.
    pub async fn list(&self, auth: &AuthContext) -> TaskResult<TaskList> {
        let actor = self.actor(auth).await?;
        let is_owner = actor.is_owner();
        let assignee = if is_owner { None } else { Some(actor.user.id) };

        let tasks = self.store.list_tasks(actor.family.id, assignee).await?;
        Ok(TaskList { tasks, is_owner })
    }

    pub async fn get(&self, auth: &AuthContext, id: Uuid) -> TaskResult<Task> {
        let actor = self.actor(auth).await?;
        self.store
            .find_task(id, actor.family.id)
            .await?
            .ok_or(TaskError::NotFound)
    }

    /// Creates a task and tells its assignees about it.
    pub async fn create(&self, auth: &AuthContext, input: NewTask) -> TaskResult<Task> {
        let actor = self.actor(auth).await?;
        let assigned_to = self.check_assignees(actor.family.id, input.assigned_to).await?;

        let task = self
            .store
            .create_task(CreateTask {
                family_id: actor.family.id,
                title: input.title.trim().to_string(),
                description: input.description,
                due_date: input.due_date,
                priority: input.priority,
                assigned_to,
                created_by: actor.user.id,
            })
            .await?;
        info!(task_id = %task.id, family_id = %task.family_id, "Task created");

        self.notifications
            .notify_best_effort(Self::to_assignees(&task, &actor, NotificationPayload::NewTask))
            .await;
        Ok(task)
    }

    /// Applies a partial update and notifies assignees, plus the owner when
    /// the task became completed.
    pub async fn update(&self, auth: &AuthContext, id: Uuid, mut update: UpdateTask) -> TaskResult<Task> {
        let actor = self.actor(auth).await?;
        if let Some(assignees) = update.assigned_to.take() {
            update.assigned_to = Some(self.check_assignees(actor.family.id, assignees).await?);
        }
        if let Some(title) = update.title.as_mut() {
            *title = title.trim().to_string();
        }

        let (before, after) = self
            .store
            .update_task(id, actor.family.id, update)
            .await?
            .ok_or(TaskError::NotFound)?;
        info!(task_id = %after.id, status = after.status.as_str(), "Task updated");

        let mut batch = Self::to_assignees(&after, &actor, NotificationPayload::ModifiedTask);
        batch.extend(Self::completion_notice(&before, &after, &actor));
        self.notifications.notify_best_effort(batch).await;
        Ok(after)
    }

    /// Moves the task one step along `pending → in_progress → completed → pending`.
    ///
    /// The next status is computed by the store against the locked row, so
    /// concurrent advances each move the task one step.
    pub async fn advance(&self, auth: &AuthContext, id: Uuid) -> TaskResult<Task> {
        let actor = self.actor(auth).await?;
        let (before, after) = self
            .store
            .advance_task(id, actor.family.id)
            .await?
            .ok_or(TaskError::NotFound)?;
        info!(
            task_id = %after.id,
            from = before.status.as_str(),
            to = after.status.as_str(),
            "Task advanced"
        );

        if let Some(notice) = Self::completion_notice(&before, &after, &actor) {
            self.notifications.notify_best_effort(vec![notice]).await;
        }
        Ok(after)
    }

    /// Deletes a task. Only the family owner or the task's creator may.
    pub async fn delete(&self, auth: &AuthContext, id: Uuid) -> TaskResult<()> {
        let actor = self.actor(auth).await?;
        let task = self
            .store
            .find_task(id, actor.family.id)
            .await?
            .ok_or(TaskError::NotFound)?;

        if !actor.is_owner() && task.created_by != actor.user.id {
            return Err(TaskError::Forbidden);
        }
        if !self.store.delete_task(id, actor.family.id).await? {
            return Err(TaskError::NotFound);
        }

        info!(task_id = %id, family_id = %actor.family.id, "Task deleted");
        Ok(())
    }
}
