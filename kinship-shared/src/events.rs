//! Family calendar.
//!
//! Events belong to the caller's family and every member may read, create,
//! edit and delete them. Participants other than the actor get a
//! `new_event` or `modified_event` notification, written best-effort like
//! the task board's.

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::auth::authorization::{require_family, require_user, AuthzError};
use crate::auth::middleware::AuthContext;
use crate::models::event::{CreateEvent, Event, UpdateEvent};
use crate::models::notification::{NewNotification, Notice, NotificationPayload};
use crate::models::user::User;
use crate::notifications::NotificationCenter;
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("you must belong to a family to manage events")]
    NoFamily,

    #[error("event not found")]
    NotFound,

    #[error("an event cannot end before it starts")]
    InvalidSchedule,

    #[error("participant {0} is not a member of your family")]
    InvalidParticipant(Uuid),

    #[error("user not found")]
    UserNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EventError {
    pub fn kind(&self) -> &'static str {
        match self {
            EventError::NoFamily => "no_family",
            EventError::NotFound => "not_found",
            EventError::InvalidSchedule => "invalid_schedule",
            EventError::InvalidParticipant(_) => "invalid_participant",
            EventError::UserNotFound => "user_not_found",
            EventError::Store(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            EventError::NoFamily | EventError::InvalidSchedule | EventError::InvalidParticipant(_) => {
                StatusCode::BAD_REQUEST
            }
            EventError::NotFound => StatusCode::NOT_FOUND,
            EventError::UserNotFound => StatusCode::UNAUTHORIZED,
            EventError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthzError> for EventError {
    fn from(e: AuthzError) -> Self {
        match e {
            AuthzError::UserNotFound => EventError::UserNotFound,
            AuthzError::Store(e) => EventError::Store(e),
            AuthzError::NoFamily
            | AuthzError::NotOwner
            | AuthzError::NotMember(_)
            | AuthzError::FamilyNotFound(_) => EventError::NoFamily,
        }
    }
}

pub type EventResult<T> = Result<T, EventError>;

/// Input for [`EventBoard::create`]
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub location: String,
    pub participants: Vec<Uuid>,
}

#[derive(Clone)]
pub struct EventBoard {
    store: Arc<dyn Store>,
    notifications: NotificationCenter,
}

impl EventBoard {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            notifications: NotificationCenter::new(store.clone()),
            store,
        }
    }

    async fn actor(&self, auth: &AuthContext) -> EventResult<(User, Uuid)> {
        let user = require_user(&*self.store, auth).await?;
        let family_id = require_family(&user)?;
        Ok((user, family_id))
    }

    async fn check_participants(&self, family_id: Uuid, participants: Vec<Uuid>) -> EventResult<Vec<Uuid>> {
        let mut seen = HashSet::new();
        let participants: Vec<Uuid> = participants.into_iter().filter(|id| seen.insert(*id)).collect();
        if participants.is_empty() {
            return Ok(participants);
        }

        let members: HashSet<Uuid> = self
            .store
            .list_members(family_id)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();
        match participants.iter().find(|id| !members.contains(id)) {
            Some(outsider) => Err(EventError::InvalidParticipant(*outsider)),
            None => Ok(participants),
        }
    }

    fn to_participants(
        event: &Event,
        actor: &User,
        content: impl Fn(Notice) -> NotificationPayload,
    ) -> Vec<NewNotification> {
        event
            .participants
            .iter()
            .filter(|id| **id != actor.id)
            .map(|recipient_id| {
                let mut notice = Notice::about(event.id, event.title.clone(), actor.display_name());
                notice
                    .extra
                    .insert("starts_at".to_string(), event.starts_at.to_rfc3339().into());
                NewNotification {
                    family_id: event.family_id,
                    recipient_id: *recipient_id,
                    content: content(notice),
                }
            })
            .collect()
    }

    /// Every event of the caller's family, earliest first.
    pub async fn list(&self, auth: &AuthContext) -> EventResult<Vec<Event>> {
        let (_, family_id) = self.actor(auth).await?;
        Ok(self.store.list_events(family_id).await?)
    }

    pub async fn get(&self, auth: &AuthContext, id: Uuid) -> EventResult<Event> {
        let (_, family_id) = self.actor(auth).await?;
        self.store
            .find_event(id, family_id)
            .await?
            .ok_or(EventError::NotFound)
    }

    /// Creates an event and tells its participants about it.
    pub async fn create(&self, auth: &AuthContext, input: NewEvent) -> EventResult<Event> {
        let (actor, family_id) = self.actor(auth).await?;
        if input.ends_at < input.starts_at {
            return Err(EventError::InvalidSchedule);
        }
        let participants = self.check_participants(family_id, input.participants).await?;

        let event = self
            .store
            .create_event(CreateEvent {
                family_id,
                title: input.title.trim().to_string(),
                description: input.description,
                starts_at: input.starts_at,
                ends_at: input.ends_at,
                location: input.location.trim().to_string(),
                participants,
                created_by: actor.id,
            })
            .await?;
        info!(event_id = %event.id, family_id = %event.family_id, "Event created");

        self.notifications
            .notify_best_effort(Self::to_participants(&event, &actor, NotificationPayload::NewEvent))
            .await;
        Ok(event)
    }

    /// Applies a partial update and tells the participants of the result.
    ///
    /// The schedule is checked against the stored row inside the write, so a
    /// change to only one end cannot leave the event ending before it starts.
    pub async fn update(&self, auth: &AuthContext, id: Uuid, mut update: UpdateEvent) -> EventResult<Event> {
        let (actor, family_id) = self.actor(auth).await?;
        if let (Some(starts_at), Some(ends_at)) = (update.starts_at, update.ends_at) {
            if ends_at < starts_at {
                return Err(EventError::InvalidSchedule);
            }
        }
        if let Some(participants) = update.participants.take() {
            update.participants = Some(self.check_participants(family_id, participants).await?);
        }
        if let Some(title) = update.title.as_mut() {
            *title = title.trim().to_string();
        }
        if let Some(location) = update.location.as_mut() {
            *location = location.trim().to_string();
        }

        let (_, after) = self
            .store
            .update_event(id, family_id, update)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => EventError::InvalidSchedule,
                e => EventError::Store(e),
            })?
            .ok_or(EventError::NotFound)?;
        info!(event_id = %after.id, family_id = %family_id, "Event updated");

        self.notifications
            .notify_best_effort(Self::to_participants(&after, &actor, NotificationPayload::ModifiedEvent))
            .await;
        Ok(after)
    }

    /// Any member of the family may delete one of its events.
    pub async fn delete(&self, auth: &AuthContext, id: Uuid) -> EventResult<()> {
        let (_, family_id) = self.actor(auth).await?;
        if !self.store.delete_event(id, family_id).await? {
            return Err(EventError::NotFound);
        }

        info!(event_id = %id, family_id = %family_id, "Event deleted");
        Ok(())
    }
}
