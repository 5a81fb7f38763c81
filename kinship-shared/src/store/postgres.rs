//! Postgres-backed [`Store`].

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{
    Directory, EventStore, JoinRequestStore, NotificationStore, Store, StoreError, StoreResult,
    TaskStore,
};
use crate::db::pool;
use crate::models::address::{AddressFields, FamilyAddress};
use crate::models::event::{CreateEvent, Event, UpdateEvent};
use crate::models::family::{CreateFamily, Family};
use crate::models::join_request::{Decision, JoinRequest, NewJoinRequest};
use crate::models::notification::{NewNotification, Notification, NotificationRow};
use crate::models::task::{CreateTask, Task, UpdateTask};
use crate::models::user::{CreateUser, User};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode_all(rows: Vec<NotificationRow>) -> StoreResult<Vec<Notification>> {
    rows.into_iter()
        .map(|row| Notification::try_from(row).map_err(StoreError::from))
        .collect()
}

fn decode_one(row: Option<NotificationRow>) -> StoreResult<Option<Notification>> {
    row.map(Notification::try_from).transpose().map_err(StoreError::from)
}

fn unique_violation_as_conflict(e: sqlx::Error, what: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(what.to_string())
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl Directory for PgStore {
    async fn create_user(&self, data: CreateUser) -> StoreResult<User> {
        User::create(&self.pool, data)
            .await
            .map_err(|e| unique_violation_as_conflict(e, "email already registered"))
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(User::find_by_email(&self.pool, email).await?)
    }

    async fn list_members(&self, family_id: Uuid) -> StoreResult<Vec<User>> {
        Ok(User::list_by_family(&self.pool, family_id).await?)
    }

    async fn count_members(&self, family_id: Uuid) -> StoreResult<i64> {
        Ok(User::count_by_family(&self.pool, family_id).await?)
    }

    async fn set_user_family(&self, user_id: Uuid, family_id: Option<Uuid>) -> StoreResult<bool> {
        Ok(User::set_family(&self.pool, user_id, family_id).await?)
    }

    async fn create_family(&self, data: CreateFamily) -> StoreResult<Family> {
        let mut tx = self.pool.begin().await?;

        let owner_id = data.owner_id;
        let family = Family::create(&mut *tx, data).await?;
        if !User::claim_family(&mut *tx, owner_id, family.id).await? {
            // Dropping the transaction discards the family row.
            return Err(StoreError::Conflict(format!(
                "owner {owner_id} does not exist or already has a family"
            )));
        }

        tx.commit().await?;
        debug!(family_id = %family.id, "Family row committed");
        Ok(family)
    }

    async fn find_family_by_id(&self, id: Uuid) -> StoreResult<Option<Family>> {
        Ok(Family::find_by_id(&self.pool, id).await?)
    }

    async fn search_families(&self, query: &str) -> StoreResult<Vec<Family>> {
        Ok(Family::search(&self.pool, query).await?)
    }

    async fn find_family_address(&self, family_id: Uuid) -> StoreResult<Option<FamilyAddress>> {
        Ok(FamilyAddress::find_by_family(&self.pool, family_id).await?)
    }

    async fn upsert_family_address(
        &self,
        family_id: Uuid,
        fields: AddressFields,
    ) -> StoreResult<(FamilyAddress, bool)> {
        Ok(FamilyAddress::upsert(&self.pool, family_id, fields).await?)
    }
}

#[async_trait]
impl JoinRequestStore for PgStore {
    async fn submit_join_request(
        &self,
        request: NewJoinRequest,
        owner_notification: NewNotification,
    ) -> StoreResult<Option<JoinRequest>> {
        let mut tx = self.pool.begin().await?;

        let Some(created) = JoinRequest::insert_pending(&mut *tx, request).await? else {
            // Dropping the transaction rolls it back.
            return Ok(None);
        };
        NotificationRow::insert(&mut *tx, &owner_notification).await?;

        tx.commit().await?;
        Ok(Some(created))
    }

    async fn find_join_request(&self, id: Uuid) -> StoreResult<Option<JoinRequest>> {
        Ok(JoinRequest::find_by_id(&self.pool, id).await?)
    }

    async fn find_pending_join_request(
        &self,
        user_id: Uuid,
        family_id: Uuid,
    ) -> StoreResult<Option<JoinRequest>> {
        Ok(JoinRequest::find_pending(&self.pool, user_id, family_id).await?)
    }

    async fn list_pending_join_requests(&self, family_id: Uuid) -> StoreResult<Vec<JoinRequest>> {
        Ok(JoinRequest::list_pending_by_family(&self.pool, family_id).await?)
    }

    async fn decide_join_request(
        &self,
        request_id: Uuid,
        family_id: Uuid,
        decision: Decision,
        requester_notification: NewNotification,
    ) -> StoreResult<Option<JoinRequest>> {
        let mut tx = self.pool.begin().await?;

        let Some(decided) = JoinRequest::decide(&mut *tx, request_id, family_id, decision).await?
        else {
            return Ok(None);
        };

        if decision == Decision::Approve
            && !User::set_family(&mut *tx, decided.user_id, Some(family_id)).await?
        {
            return Err(StoreError::Conflict(format!(
                "requester {} does not exist",
                decided.user_id
            )));
        }
        NotificationRow::insert(&mut *tx, &requester_notification).await?;

        tx.commit().await?;
        Ok(Some(decided))
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_notifications(&self, batch: Vec<NewNotification>) -> StoreResult<Vec<Notification>> {
        let mut tx = self.pool.begin().await?;

        let mut rows = Vec::with_capacity(batch.len());
        for item in &batch {
            rows.push(NotificationRow::insert(&mut *tx, item).await?);
        }

        tx.commit().await?;
        decode_all(rows)
    }

    async fn list_notifications(&self, recipient_id: Uuid) -> StoreResult<Vec<Notification>> {
        decode_all(NotificationRow::list_by_recipient(&self.pool, recipient_id).await?)
    }

    async fn find_notification(&self, id: Uuid, recipient_id: Uuid) -> StoreResult<Option<Notification>> {
        decode_one(NotificationRow::find_for_recipient(&self.pool, id, recipient_id).await?)
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
    ) -> StoreResult<Option<Notification>> {
        decode_one(NotificationRow::mark_read(&self.pool, id, recipient_id).await?)
    }
}

impl PgStore {
    /// Read-modify-write of one task under a row lock.
    async fn modify_task(
        &self,
        id: Uuid,
        family_id: Uuid,
        change: impl FnOnce(&mut Task) + Send,
    ) -> StoreResult<Option<(Task, Task)>> {
        let mut tx = self.pool.begin().await?;

        let Some(before) = Task::lock_in_family(&mut *tx, id, family_id).await? else {
            return Ok(None);
        };

        let mut draft = before.clone();
        change(&mut draft);
        let Some(after) = Task::save(&mut *tx, &draft).await? else {
            return Ok(None);
        };

        tx.commit().await?;
        Ok(Some((before, after)))
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn create_task(&self, data: CreateTask) -> StoreResult<Task> {
        Ok(Task::create(&self.pool, data).await?)
    }

    async fn find_task(&self, id: Uuid, family_id: Uuid) -> StoreResult<Option<Task>> {
        Ok(Task::find_in_family(&self.pool, id, family_id).await?)
    }

    async fn list_tasks(&self, family_id: Uuid, assignee: Option<Uuid>) -> StoreResult<Vec<Task>> {
        Ok(Task::list_by_family(&self.pool, family_id, assignee).await?)
    }

    async fn update_task(
        &self,
        id: Uuid,
        family_id: Uuid,
        update: UpdateTask,
    ) -> StoreResult<Option<(Task, Task)>> {
        self.modify_task(id, family_id, |draft| update.apply_to(draft)).await
    }

    async fn advance_task(&self, id: Uuid, family_id: Uuid) -> StoreResult<Option<(Task, Task)>> {
        self.modify_task(id, family_id, |draft| draft.status = draft.status.next())
            .await
    }

    async fn delete_task(&self, id: Uuid, family_id: Uuid) -> StoreResult<bool> {
        Ok(Task::delete(&self.pool, id, family_id).await?)
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn create_event(&self, data: CreateEvent) -> StoreResult<Event> {
        Ok(Event::create(&self.pool, data).await?)
    }

    async fn find_event(&self, id: Uuid, family_id: Uuid) -> StoreResult<Option<Event>> {
        Ok(Event::find_in_family(&self.pool, id, family_id).await?)
    }

    async fn list_events(&self, family_id: Uuid) -> StoreResult<Vec<Event>> {
        Ok(Event::list_by_family(&self.pool, family_id).await?)
    }

    async fn update_event(
        &self,
        id: Uuid,
        family_id: Uuid,
        update: UpdateEvent,
    ) -> StoreResult<Option<(Event, Event)>> {
        let mut tx = self.pool.begin().await?;

        let Some(before) = Event::lock_in_family(&mut *tx, id, family_id).await? else {
            return Ok(None);
        };

        let mut draft = before.clone();
        update.apply_to(&mut draft);
        if !draft.has_valid_schedule() {
            return Err(StoreError::Conflict(format!("event {id} would end before it starts")));
        }
        let Some(after) = Event::save(&mut *tx, &draft).await? else {
            return Ok(None);
        };

        tx.commit().await?;
        Ok(Some((before, after)))
    }

    async fn delete_event(&self, id: Uuid, family_id: Uuid) -> StoreResult<bool> {
        Ok(Event::delete(&self.pool, id, family_id).await?)
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> StoreResult<()> {
        pool::health_check(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}
