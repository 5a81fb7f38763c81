//! In-process [`Store`].
//!
//! All collections sit behind one async mutex, so every trait method is a
//! single atomic step. Used by the test suites and by `STORAGE_BACKEND=memory`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    Directory, EventStore, JoinRequestStore, NotificationStore, Store, StoreError, StoreResult,
    TaskStore,
};
use crate::models::address::{AddressFields, FamilyAddress};
use crate::models::event::{CreateEvent, Event, UpdateEvent};
use crate::models::family::{CreateFamily, Family, SEARCH_LIMIT};
use crate::models::join_request::{Decision, JoinRequest, JoinRequestStatus, NewJoinRequest};
use crate::models::notification::{NewNotification, Notification, NotificationStatus};
use crate::models::task::{CreateTask, Task, UpdateTask};
use crate::models::user::{normalize_email, CreateUser, User};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    families: HashMap<Uuid, Family>,
    /// Insertion order doubles as creation order.
    join_requests: Vec<JoinRequest>,
    notifications: Vec<Notification>,
    tasks: Vec<Task>,
    events: Vec<Event>,
    addresses: HashMap<Uuid, FamilyAddress>,
}

impl State {
    fn build_notification(data: NewNotification) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            family_id: data.family_id,
            recipient_id: data.recipient_id,
            content: data.content,
            status: NotificationStatus::Pending,
            created_at: Utc::now(),
            read_at: None,
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_notification_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent notification write fail until switched off.
    pub fn fail_notification_writes(&self, fail: bool) {
        self.fail_notification_writes.store(fail, Ordering::SeqCst);
    }

    fn check_notification_writes(&self) -> StoreResult<()> {
        if self.fail_notification_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("notification writes disabled".to_string()));
        }
        Ok(())
    }

    /// Every stored join request, for assertions in tests.
    pub async fn join_requests(&self) -> Vec<JoinRequest> {
        self.state.lock().await.join_requests.clone()
    }

    /// Every stored notification in insertion order, for assertions in tests.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn create_user(&self, data: CreateUser) -> StoreResult<User> {
        let mut state = self.state.lock().await;

        let email = normalize_email(&data.email);
        if state.users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash: data.password_hash,
            first_name: data.first_name,
            last_name: data.last_name,
            second_last_name: data.second_last_name,
            role: data.role,
            family_id: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = normalize_email(email);
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_members(&self, family_id: Uuid) -> StoreResult<Vec<User>> {
        let state = self.state.lock().await;
        let mut members: Vec<User> = state
            .users
            .values()
            .filter(|u| u.belongs_to(family_id))
            .cloned()
            .collect();
        members.sort_by_key(|u| (u.created_at, u.id));
        Ok(members)
    }

    async fn count_members(&self, family_id: Uuid) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state.users.values().filter(|u| u.belongs_to(family_id)).count() as i64)
    }

    async fn set_user_family(&self, user_id: Uuid, family_id: Option<Uuid>) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&user_id) {
            Some(user) => {
                user.family_id = family_id;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_family(&self, data: CreateFamily) -> StoreResult<Family> {
        let mut state = self.state.lock().await;

        let now = Utc::now();
        let family = Family {
            id: Uuid::new_v4(),
            name: data.name.trim().to_string(),
            owner_id: data.owner_id,
            created_at: now,
            updated_at: now,
        };

        let Some(owner) = state.users.get_mut(&data.owner_id) else {
            return Err(StoreError::Conflict(format!("owner {} does not exist", data.owner_id)));
        };
        if owner.family_id.is_some() {
            return Err(StoreError::Conflict(format!("owner {} already has a family", data.owner_id)));
        }
        owner.family_id = Some(family.id);
        owner.updated_at = now;

        state.families.insert(family.id, family.clone());
        Ok(family)
    }

    async fn find_family_by_id(&self, id: Uuid) -> StoreResult<Option<Family>> {
        Ok(self.state.lock().await.families.get(&id).cloned())
    }

    async fn search_families(&self, query: &str) -> StoreResult<Vec<Family>> {
        let state = self.state.lock().await;
        let mut found: Vec<Family> = state
            .families
            .values()
            .filter(|f| f.matches_query(query))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        found.truncate(SEARCH_LIMIT as usize);
        Ok(found)
    }

    async fn find_family_address(&self, family_id: Uuid) -> StoreResult<Option<FamilyAddress>> {
        Ok(self.state.lock().await.addresses.get(&family_id).cloned())
    }

    async fn upsert_family_address(
        &self,
        family_id: Uuid,
        fields: AddressFields,
    ) -> StoreResult<(FamilyAddress, bool)> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let created_at = state.addresses.get(&family_id).map(|a| a.created_at);

        let address = FamilyAddress {
            family_id,
            street: fields.street,
            number: fields.number,
            block: fields.block,
            staircase: fields.staircase,
            floor: fields.floor,
            door: fields.door,
            postal_code: fields.postal_code,
            city: fields.city,
            province: fields.province,
            country: fields.country,
            created_at: created_at.unwrap_or(now),
            updated_at: now,
        };
        state.addresses.insert(family_id, address.clone());
        Ok((address, created_at.is_none()))
    }
}

#[async_trait]
impl JoinRequestStore for MemoryStore {
    async fn submit_join_request(
        &self,
        request: NewJoinRequest,
        owner_notification: NewNotification,
    ) -> StoreResult<Option<JoinRequest>> {
        let mut state = self.state.lock().await;

        let duplicate = state.join_requests.iter().any(|r| {
            r.user_id == request.user_id
                && r.family_id == request.family_id
                && r.status == JoinRequestStatus::Pending
        });
        if duplicate {
            return Ok(None);
        }
        self.check_notification_writes()?;

        let now = Utc::now();
        let created = JoinRequest {
            id: request.id,
            user_id: request.user_id,
            family_id: request.family_id,
            status: JoinRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state.join_requests.push(created.clone());
        state
            .notifications
            .push(State::build_notification(owner_notification));
        Ok(Some(created))
    }

    async fn find_join_request(&self, id: Uuid) -> StoreResult<Option<JoinRequest>> {
        let state = self.state.lock().await;
        Ok(state.join_requests.iter().find(|r| r.id == id).cloned())
    }

    async fn find_pending_join_request(
        &self,
        user_id: Uuid,
        family_id: Uuid,
    ) -> StoreResult<Option<JoinRequest>> {
        let state = self.state.lock().await;
        Ok(state
            .join_requests
            .iter()
            .find(|r| {
                r.user_id == user_id
                    && r.family_id == family_id
                    && r.status == JoinRequestStatus::Pending
            })
            .cloned())
    }

    async fn list_pending_join_requests(&self, family_id: Uuid) -> StoreResult<Vec<JoinRequest>> {
        let state = self.state.lock().await;
        Ok(state
            .join_requests
            .iter()
            .filter(|r| r.family_id == family_id && r.status == JoinRequestStatus::Pending)
            .cloned()
            .collect())
    }

    async fn decide_join_request(
        &self,
        request_id: Uuid,
        family_id: Uuid,
        decision: Decision,
        requester_notification: NewNotification,
    ) -> StoreResult<Option<JoinRequest>> {
        let mut state = self.state.lock().await;

        let Some(index) = state
            .join_requests
            .iter()
            .position(|r| r.id == request_id && r.family_id == family_id)
        else {
            return Ok(None);
        };
        let Some(next) = state.join_requests[index].status.apply(decision) else {
            return Ok(None);
        };

        // Validate every write before applying any of them.
        let requester_id = state.join_requests[index].user_id;
        if decision == Decision::Approve && !state.users.contains_key(&requester_id) {
            return Err(StoreError::Conflict(format!("requester {requester_id} does not exist")));
        }
        self.check_notification_writes()?;

        let now = Utc::now();
        if decision == Decision::Approve {
            if let Some(user) = state.users.get_mut(&requester_id) {
                user.family_id = Some(family_id);
                user.updated_at = now;
            }
        }
        let request = &mut state.join_requests[index];
        request.status = next;
        request.updated_at = now;
        let decided = request.clone();

        state
            .notifications
            .push(State::build_notification(requester_notification));
        Ok(Some(decided))
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notifications(&self, batch: Vec<NewNotification>) -> StoreResult<Vec<Notification>> {
        self.check_notification_writes()?;

        let mut state = self.state.lock().await;
        let created: Vec<Notification> = batch.into_iter().map(State::build_notification).collect();
        state.notifications.extend(created.iter().cloned());
        Ok(created)
    }

    async fn list_notifications(&self, recipient_id: Uuid) -> StoreResult<Vec<Notification>> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect())
    }

    async fn find_notification(&self, id: Uuid, recipient_id: Uuid) -> StoreResult<Option<Notification>> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .iter()
            .find(|n| n.id == id && n.recipient_id == recipient_id)
            .cloned())
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
    ) -> StoreResult<Option<Notification>> {
        let mut state = self.state.lock().await;
        let Some(notification) = state
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == recipient_id)
        else {
            return Ok(None);
        };

        if notification.status != NotificationStatus::Read {
            notification.status = NotificationStatus::Read;
            notification.read_at = Some(Utc::now());
        }
        Ok(Some(notification.clone()))
    }
}

impl MemoryStore {
    async fn modify_task(
        &self,
        id: Uuid,
        family_id: Uuid,
        change: impl FnOnce(&mut Task) + Send,
    ) -> Option<(Task, Task)> {
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id && t.family_id == family_id)?;

        let before = task.clone();
        change(task);
        task.updated_at = Utc::now();
        Some((before, task.clone()))
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, data: CreateTask) -> StoreResult<Task> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            family_id: data.family_id,
            title: data.title,
            description: data.description,
            due_date: data.due_date,
            status: Default::default(),
            priority: data.priority,
            assigned_to: data.assigned_to,
            created_by: data.created_by,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.tasks.push(task.clone());
        Ok(task)
    }

    async fn find_task(&self, id: Uuid, family_id: Uuid) -> StoreResult<Option<Task>> {
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .iter()
            .find(|t| t.id == id && t.family_id == family_id)
            .cloned())
    }

    async fn list_tasks(&self, family_id: Uuid, assignee: Option<Uuid>) -> StoreResult<Vec<Task>> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .iter()
            .filter(|t| t.family_id == family_id)
            .filter(|t| assignee.map_or(true, |a| t.is_assigned_to(a)))
            .cloned()
            .collect();
        // Soonest due first, undated last; the sort is stable so creation
        // order breaks ties.
        tasks.sort_by_key(|t| (t.due_date.is_none(), t.due_date));
        Ok(tasks)
    }

    async fn update_task(
        &self,
        id: Uuid,
        family_id: Uuid,
        update: UpdateTask,
    ) -> StoreResult<Option<(Task, Task)>> {
        Ok(self
            .modify_task(id, family_id, |task| update.apply_to(task))
            .await)
    }

    async fn advance_task(&self, id: Uuid, family_id: Uuid) -> StoreResult<Option<(Task, Task)>> {
        Ok(self
            .modify_task(id, family_id, |task| task.status = task.status.next())
            .await)
    }

    async fn delete_task(&self, id: Uuid, family_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.tasks.len();
        state.tasks.retain(|t| !(t.id == id && t.family_id == family_id));
        Ok(state.tasks.len() < before)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn create_event(&self, data: CreateEvent) -> StoreResult<Event> {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            family_id: data.family_id,
            title: data.title,
            description: data.description,
            starts_at: data.starts_at,
            ends_at: data.ends_at,
            location: data.location,
            participants: data.participants,
            created_by: data.created_by,
            created_at: now,
            updated_at: now,
        };
        if !event.has_valid_schedule() {
            return Err(StoreError::Conflict("event would end before it starts".to_string()));
        }
        self.state.lock().await.events.push(event.clone());
        Ok(event)
    }

    async fn find_event(&self, id: Uuid, family_id: Uuid) -> StoreResult<Option<Event>> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .find(|e| e.id == id && e.family_id == family_id)
            .cloned())
    }

    async fn list_events(&self, family_id: Uuid) -> StoreResult<Vec<Event>> {
        let state = self.state.lock().await;
        let mut events: Vec<Event> = state
            .events
            .iter()
            .filter(|e| e.family_id == family_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.starts_at);
        Ok(events)
    }

    async fn update_event(
        &self,
        id: Uuid,
        family_id: Uuid,
        update: UpdateEvent,
    ) -> StoreResult<Option<(Event, Event)>> {
        let mut state = self.state.lock().await;
        let Some(event) = state
            .events
            .iter_mut()
            .find(|e| e.id == id && e.family_id == family_id)
        else {
            return Ok(None);
        };

        let mut draft = event.clone();
        update.apply_to(&mut draft);
        if !draft.has_valid_schedule() {
            return Err(StoreError::Conflict(format!("event {id} would end before it starts")));
        }
        draft.updated_at = Utc::now();

        let before = std::mem::replace(event, draft);
        Ok(Some((before, event.clone())))
    }

    async fn delete_event(&self, id: Uuid, family_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.events.len();
        state.events.retain(|e| !(e.id == id && e.family_id == family_id));
        Ok(state.events.len() < before)
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
