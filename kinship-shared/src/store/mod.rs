//! Persistence boundary.
//!
//! Services talk to storage through the traits in this module so the same
//! workflow code runs against Postgres in production and against the
//! in-process [`MemoryStore`] in tests and local runs.
//!
//! Multi-row units of work are single trait methods
//! ([`JoinRequestStore::submit_join_request`],
//! [`JoinRequestStore::decide_join_request`], [`Directory::create_family`]):
//! each backend commits them atomically or not at all. Read-modify-write
//! updates ([`TaskStore::advance_task`], [`EventStore::update_event`]) run
//! against the row as stored at write time.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::address::{AddressFields, FamilyAddress};
use crate::models::event::{CreateEvent, Event, UpdateEvent};
use crate::models::family::{CreateFamily, Family};
use crate::models::join_request::{Decision, JoinRequest, NewJoinRequest};
use crate::models::notification::{NewNotification, Notification};
use crate::models::task::{CreateTask, Task, UpdateTask};
use crate::models::user::{CreateUser, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness rule was violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row could not be decoded into its domain type
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// True for unique-constraint violations, from either backend.
    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::Conflict(_) => true,
            StoreError::Database(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Users and families.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Fails with a conflict when the email is taken.
    async fn create_user(&self, data: CreateUser) -> StoreResult<User>;

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn list_members(&self, family_id: Uuid) -> StoreResult<Vec<User>>;

    async fn count_members(&self, family_id: Uuid) -> StoreResult<i64>;

    /// Returns false when the user does not exist.
    async fn set_user_family(&self, user_id: Uuid, family_id: Option<Uuid>) -> StoreResult<bool>;

    /// Creates the family and points its owner at it, atomically.
    async fn create_family(&self, data: CreateFamily) -> StoreResult<Family>;

    async fn find_family_by_id(&self, id: Uuid) -> StoreResult<Option<Family>>;

    async fn search_families(&self, query: &str) -> StoreResult<Vec<Family>>;

    async fn find_family_address(&self, family_id: Uuid) -> StoreResult<Option<FamilyAddress>>;

    /// Creates or replaces the family's address. The flag is true when it
    /// was created.
    async fn upsert_family_address(
        &self,
        family_id: Uuid,
        fields: AddressFields,
    ) -> StoreResult<(FamilyAddress, bool)>;
}

/// Join requests and the writes coupled to them.
#[async_trait]
pub trait JoinRequestStore: Send + Sync {
    /// Inserts the pending request together with the owner notification.
    ///
    /// Returns `None`, writing nothing, when a pending request for the same
    /// (user, family) already exists. If the notification cannot be written
    /// the request is not persisted either.
    async fn submit_join_request(
        &self,
        request: NewJoinRequest,
        owner_notification: NewNotification,
    ) -> StoreResult<Option<JoinRequest>>;

    async fn find_join_request(&self, id: Uuid) -> StoreResult<Option<JoinRequest>>;

    async fn find_pending_join_request(
        &self,
        user_id: Uuid,
        family_id: Uuid,
    ) -> StoreResult<Option<JoinRequest>>;

    async fn list_pending_join_requests(&self, family_id: Uuid) -> StoreResult<Vec<JoinRequest>>;

    /// Decides a pending request in one unit of work: the status
    /// compare-and-swap, the requester's family assignment on approval, and
    /// the requester notification.
    ///
    /// Returns `None`, writing nothing, if the request is missing, belongs to
    /// another family, or is no longer pending.
    async fn decide_join_request(
        &self,
        request_id: Uuid,
        family_id: Uuid,
        decision: Decision,
        requester_notification: NewNotification,
    ) -> StoreResult<Option<JoinRequest>>;
}

/// Per-recipient inbox.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts all rows or none.
    async fn insert_notifications(&self, batch: Vec<NewNotification>) -> StoreResult<Vec<Notification>>;

    /// Newest first.
    async fn list_notifications(&self, recipient_id: Uuid) -> StoreResult<Vec<Notification>>;

    async fn find_notification(&self, id: Uuid, recipient_id: Uuid) -> StoreResult<Option<Notification>>;

    /// Idempotent; `None` when the id is unknown or owned by someone else.
    async fn mark_notification_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
    ) -> StoreResult<Option<Notification>>;
}

/// Family tasks. Every lookup is family-scoped.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, data: CreateTask) -> StoreResult<Task>;

    async fn find_task(&self, id: Uuid, family_id: Uuid) -> StoreResult<Option<Task>>;

    async fn list_tasks(&self, family_id: Uuid, assignee: Option<Uuid>) -> StoreResult<Vec<Task>>;

    /// Returns the task before and after the update.
    async fn update_task(
        &self,
        id: Uuid,
        family_id: Uuid,
        update: UpdateTask,
    ) -> StoreResult<Option<(Task, Task)>>;

    /// Moves the status one step along its cycle, computed from the stored
    /// row inside the write. Returns the task before and after.
    async fn advance_task(&self, id: Uuid, family_id: Uuid) -> StoreResult<Option<(Task, Task)>>;

    async fn delete_task(&self, id: Uuid, family_id: Uuid) -> StoreResult<bool>;
}

/// Family calendar. Every lookup is family-scoped.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create_event(&self, data: CreateEvent) -> StoreResult<Event>;

    async fn find_event(&self, id: Uuid, family_id: Uuid) -> StoreResult<Option<Event>>;

    /// Earliest first.
    async fn list_events(&self, family_id: Uuid) -> StoreResult<Vec<Event>>;

    /// Applies the update to the stored row and returns it before and after.
    ///
    /// Fails with [`StoreError::Conflict`], writing nothing, when the result
    /// would end before it starts.
    async fn update_event(
        &self,
        id: Uuid,
        family_id: Uuid,
        update: UpdateEvent,
    ) -> StoreResult<Option<(Event, Event)>>;

    async fn delete_event(&self, id: Uuid, family_id: Uuid) -> StoreResult<bool>;
}

/// Everything the services need from storage.
#[async_trait]
pub trait Store: Directory + JoinRequestStore + NotificationStore + TaskStore + EventStore {
    /// Short label for health output, e.g. `"postgres"`.
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> StoreResult<()>;
}
