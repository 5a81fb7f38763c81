//! Notification centre: the per-recipient inbox.
//!
//! Reads and the read-marker are scoped to the caller, so one user can never
//! see or touch another user's entries. Writes come from two places: the
//! membership workflow (inside its own unit of work, see
//! [`crate::membership`]) and fan-out from other features, either through
//! [`NotificationCenter::fan_out`] or best-effort through
//! [`NotificationCenter::notify_best_effort`].

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::authorization::{require_family, require_user, AuthzError};
use crate::auth::middleware::AuthContext;
use crate::models::notification::{NewNotification, Notification, NotificationPayload, NotificationType};
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification not found")]
    NotFound,

    #[error("you must belong to a family to send notifications")]
    NoFamily,

    #[error("at least one recipient is required")]
    NoRecipients,

    #[error("recipient {0} is not a member of your family")]
    InvalidRecipient(Uuid),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("user not found")]
    UserNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl NotificationError {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationError::NotFound => "not_found",
            NotificationError::NoFamily => "no_family",
            NotificationError::NoRecipients => "no_recipients",
            NotificationError::InvalidRecipient(_) => "invalid_recipient",
            NotificationError::InvalidPayload(_) => "invalid_payload",
            NotificationError::UserNotFound => "user_not_found",
            NotificationError::Store(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            NotificationError::NotFound => StatusCode::NOT_FOUND,
            NotificationError::NoFamily
            | NotificationError::NoRecipients
            | NotificationError::InvalidRecipient(_)
            | NotificationError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            NotificationError::UserNotFound => StatusCode::UNAUTHORIZED,
            NotificationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthzError> for NotificationError {
    fn from(e: AuthzError) -> Self {
        match e {
            AuthzError::UserNotFound => NotificationError::UserNotFound,
            AuthzError::NoFamily | AuthzError::NotMember(_) | AuthzError::NotOwner => {
                NotificationError::NoFamily
            }
            AuthzError::FamilyNotFound(_) => NotificationError::NoFamily,
            AuthzError::Store(e) => NotificationError::Store(e),
        }
    }
}

pub type NotificationResult<T> = Result<T, NotificationError>;

/// A fan-out request: one notification per recipient, same type and payload.
#[derive(Debug, Clone)]
pub struct FanOut {
    pub kind: NotificationType,
    pub recipients: Vec<Uuid>,
    pub payload: JsonValue,
}

#[derive(Clone)]
pub struct NotificationCenter {
    store: Arc<dyn Store>,
}

impl NotificationCenter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The caller's inbox, newest first.
    pub async fn list(&self, auth: &AuthContext) -> NotificationResult<Vec<Notification>> {
        let inbox = self.store.list_notifications(auth.user_id).await?;
        debug!(user_id = %auth.user_id, count = inbox.len(), "Listed notifications");
        Ok(inbox)
    }

    /// One of the caller's notifications. Unknown ids and other users'
    /// notifications are both [`NotificationError::NotFound`].
    pub async fn get(&self, auth: &AuthContext, id: Uuid) -> NotificationResult<Notification> {
        self.store
            .find_notification(id, auth.user_id)
            .await?
            .ok_or(NotificationError::NotFound)
    }

    /// Marks a notification read. Repeating the call is a harmless no-op.
    pub async fn mark_read(&self, auth: &AuthContext, id: Uuid) -> NotificationResult<Notification> {
        let notification = self
            .store
            .mark_notification_read(id, auth.user_id)
            .await?
            .ok_or(NotificationError::NotFound)?;

        debug!(notification_id = %id, user_id = %auth.user_id, "Notification marked read");
        Ok(notification)
    }

    /// Fetches a notification and marks it read if it is still pending.
    pub async fn open(&self, auth: &AuthContext, id: Uuid) -> NotificationResult<Notification> {
        let notification = self.get(auth, id).await?;
        if notification.is_read() {
            return Ok(notification);
        }
        self.mark_read(auth, id).await
    }

    /// Creates one pending notification per distinct recipient, scoped to the
    /// sender's family.
    ///
    /// All rows are written or none. Join notifications cannot be sent this
    /// way; only the membership workflow produces them. Every other type
    /// takes any JSON object as payload, and a missing payload is `{}`.
    ///
    /// # Errors
    ///
    /// - [`NotificationError::NoFamily`] when the sender has no family
    /// - [`NotificationError::InvalidRecipient`] for a recipient outside it
    /// - [`NotificationError::InvalidPayload`] for a join type, a payload that
    ///   is not an object, or a known field of the wrong type
    pub async fn fan_out(&self, auth: &AuthContext, request: FanOut) -> NotificationResult<Vec<Notification>> {
        let sender = require_user(&*self.store, auth).await?;
        let family_id = require_family(&sender)?;

        if request.kind.is_membership() {
            return Err(NotificationError::InvalidPayload(format!(
                "{} notifications are produced by the membership workflow",
                request.kind.as_str()
            )));
        }

        let payload = match request.payload {
            JsonValue::Null => JsonValue::Object(Default::default()),
            other => other,
        };
        let content = NotificationPayload::from_parts(request.kind, payload)
            .map_err(|e| NotificationError::InvalidPayload(e.to_string()))?;

        let mut seen = HashSet::new();
        let recipients: Vec<Uuid> = request
            .recipients
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();
        if recipients.is_empty() {
            return Err(NotificationError::NoRecipients);
        }

        let members: HashSet<Uuid> = self
            .store
            .list_members(family_id)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();
        if let Some(outsider) = recipients.iter().find(|id| !members.contains(id)) {
            return Err(NotificationError::InvalidRecipient(*outsider));
        }

        let batch = recipients
            .into_iter()
            .map(|recipient_id| NewNotification {
                family_id,
                recipient_id,
                content: content.clone(),
            })
            .collect();
        let created = self.store.insert_notifications(batch).await?;

        info!(
            sender_id = %sender.id,
            family_id = %family_id,
            kind = content.kind().as_str(),
            count = created.len(),
            "Notifications fanned out"
        );
        Ok(created)
    }

    /// Writes notifications that are a side effect of some other action.
    ///
    /// Failures are logged and swallowed; the caller's action has already
    /// succeeded and does not depend on delivery. Returns how many were
    /// stored.
    pub async fn notify_best_effort(&self, batch: Vec<NewNotification>) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let kind = batch[0].content.kind();
        let expected = batch.len();

        match self.store.insert_notifications(batch).await {
            Ok(created) => created.len(),
            Err(e) => {
                warn!(
                    error = %e,
                    kind = kind.as_str(),
                    count = expected,
                    "Dropping side-effect notifications"
                );
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::family::CreateFamily;
    use crate::models::notification::Notice;
    use crate::models::user::{CreateUser, FamilyRole};
    use crate::store::{Directory, MemoryStore};
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryStore>,
        center: NotificationCenter,
        owner: AuthContext,
        member: AuthContext,
        outsider: AuthContext,
        family_id: Uuid,
    }

    async fn user(store: &MemoryStore, email: &str) -> AuthContext {
        let user = store
            .create_user(CreateUser {
                email: email.to_string(),
                password_hash: "hash".to_string(),
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                second_last_name: None,
                role: FamilyRole::Other,
            })
            .await
            .unwrap();
        AuthContext {
            user_id: user.id,
            email: user.email,
        }
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let owner = user(&store, "owner@example.com").await;
        let member = user(&store, "member@example.com").await;
        let outsider = user(&store, "outsider@example.com").await;

        let family = store
            .create_family(CreateFamily {
                name: "Smith".to_string(),
                owner_id: owner.user_id,
            })
            .await
            .unwrap();
        store.set_user_family(member.user_id, Some(family.id)).await.unwrap();

        Fixture {
            center: NotificationCenter::new(store.clone()),
            store,
            owner,
            member,
            outsider,
            family_id: family.id,
        }
    }

    fn new_task_payload() -> JsonValue {
        json!({ "task_id": Uuid::new_v4(), "title": "Dishes" })
    }

    #[tokio::test]
    async fn test_fan_out_deduplicates_recipients() {
        let f = fixture().await;

        let created = f
            .center
            .fan_out(
                &f.owner,
                FanOut {
                    kind: NotificationType::NewTask,
                    recipients: vec![f.member.user_id, f.member.user_id, f.owner.user_id],
                    payload: new_task_payload(),
                },
            )
            .await
            .unwrap();

        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|n| n.family_id == f.family_id && !n.is_read()));
        assert_eq!(f.center.list(&f.member).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fan_out_requires_family() {
        let f = fixture().await;
        let err = f
            .center
            .fan_out(
                &f.outsider,
                FanOut {
                    kind: NotificationType::NewTask,
                    recipients: vec![f.owner.user_id],
                    payload: new_task_payload(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, NotificationError::NoFamily));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_fan_out_rejects_outside_recipient() {
        let f = fixture().await;
        let err = f
            .center
            .fan_out(
                &f.owner,
                FanOut {
                    kind: NotificationType::NewTask,
                    recipients: vec![f.member.user_id, f.outsider.user_id],
                    payload: new_task_payload(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, NotificationError::InvalidRecipient(id) if id == f.outsider.user_id));
        assert!(f.store.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_validates_payload_and_kind() {
        let f = fixture().await;

        let bad_shape = f
            .center
            .fan_out(
                &f.owner,
                FanOut {
                    kind: NotificationType::NewEvent,
                    recipients: vec![f.member.user_id],
                    payload: json!({ "title": 3 }),
                },
            )
            .await;
        assert!(matches!(bad_shape, Err(NotificationError::InvalidPayload(_))));

        let not_an_object = f
            .center
            .fan_out(
                &f.owner,
                FanOut {
                    kind: NotificationType::TaskCompleted,
                    recipients: vec![f.member.user_id],
                    payload: json!(["done"]),
                },
            )
            .await;
        assert!(matches!(not_an_object, Err(NotificationError::InvalidPayload(_))));

        let membership_kind = f
            .center
            .fan_out(
                &f.owner,
                FanOut {
                    kind: NotificationType::JoinApproved,
                    recipients: vec![f.member.user_id],
                    payload: json!({ "family": f.family_id, "family_name": "Smith" }),
                },
            )
            .await;
        assert!(matches!(membership_kind, Err(NotificationError::InvalidPayload(_))));

        let nobody = f
            .center
            .fan_out(
                &f.owner,
                FanOut {
                    kind: NotificationType::NewTask,
                    recipients: vec![],
                    payload: new_task_payload(),
                },
            )
            .await;
        assert!(matches!(nobody, Err(NotificationError::NoRecipients)));
    }

    #[tokio::test]
    async fn test_fan_out_accepts_free_form_payload() {
        let f = fixture().await;
        let message = "La tarea \"Fregar\" ha sido completada.";

        let created = f
            .center
            .fan_out(
                &f.member,
                FanOut {
                    kind: NotificationType::TaskCompleted,
                    recipients: vec![f.owner.user_id],
                    payload: json!({ "message": message }),
                },
            )
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        let NotificationPayload::TaskCompleted(notice) = &created[0].content else {
            panic!("expected task_completed, got {:?}", created[0].content);
        };
        assert_eq!(notice.extra["message"], message);
        assert_eq!(notice.resource_id, None);
    }

    #[tokio::test]
    async fn test_fan_out_reads_resource_id_and_defaults_missing_payload() {
        let f = fixture().await;
        let event_id = Uuid::new_v4();

        let with_id = f
            .center
            .fan_out(
                &f.owner,
                FanOut {
                    kind: NotificationType::ModifiedEvent,
                    recipients: vec![f.member.user_id],
                    payload: json!({ "eventId": event_id, "title": "Cena" }),
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            &with_id[0].content,
            NotificationPayload::ModifiedEvent(n) if n.resource_id == Some(event_id)
        ));

        let empty = f
            .center
            .fan_out(
                &f.owner,
                FanOut {
                    kind: NotificationType::NewTask,
                    recipients: vec![f.member.user_id],
                    payload: JsonValue::Null,
                },
            )
            .await
            .unwrap();
        assert_eq!(empty[0].content, NotificationPayload::NewTask(Notice::default()));
    }

    #[tokio::test]
    async fn test_get_and_mark_read_are_recipient_scoped() {
        let f = fixture().await;
        let created = f
            .center
            .fan_out(
                &f.owner,
                FanOut {
                    kind: NotificationType::NewTask,
                    recipients: vec![f.member.user_id],
                    payload: new_task_payload(),
                },
            )
            .await
            .unwrap();
        let id = created[0].id;

        assert!(matches!(f.center.get(&f.owner, id).await, Err(NotificationError::NotFound)));
        assert!(matches!(f.center.mark_read(&f.owner, id).await, Err(NotificationError::NotFound)));
        assert!(!f.center.get(&f.member, id).await.unwrap().is_read());
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        let f = fixture().await;
        let created = f
            .center
            .fan_out(
                &f.owner,
                FanOut {
                    kind: NotificationType::NewTask,
                    recipients: vec![f.member.user_id],
                    payload: new_task_payload(),
                },
            )
            .await
            .unwrap();

        let first = f.center.mark_read(&f.member, created[0].id).await.unwrap();
        let second = f.center.mark_read(&f.member, created[0].id).await.unwrap();
        assert!(first.is_read() && second.is_read());
        assert_eq!(first.read_at, second.read_at);
    }

    #[tokio::test]
    async fn test_open_marks_pending_as_read() {
        let f = fixture().await;
        let created = f
            .center
            .fan_out(
                &f.owner,
                FanOut {
                    kind: NotificationType::NewTask,
                    recipients: vec![f.member.user_id],
                    payload: new_task_payload(),
                },
            )
            .await
            .unwrap();

        let opened = f.center.open(&f.member, created[0].id).await.unwrap();
        assert!(opened.is_read());
        assert!(f.center.get(&f.member, created[0].id).await.unwrap().is_read());
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let f = fixture().await;
        let batch = vec![NewNotification {
            family_id: f.family_id,
            recipient_id: f.member.user_id,
            content: NotificationPayload::NewTask(Notice::about(Uuid::new_v4(), "Dishes", "Test User")),
        }];

        f.store.fail_notification_writes(true);
        assert_eq!(f.center.notify_best_effort(batch.clone()).await, 0);

        f.store.fail_notification_writes(false);
        assert_eq!(f.center.notify_best_effort(batch).await, 1);
        assert_eq!(f.center.notify_best_effort(vec![]).await, 0);
    }
}
