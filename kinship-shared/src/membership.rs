//! Membership workflow engine.
//!
//! Owns the join-request lifecycle:
//!
//! ```text
//! create ─▶ pending ─┬─ approve ─▶ approved   (requester joins, gets join_approved)
//!                    └─ reject  ─▶ denied     (requester gets join_rejected)
//! ```
//!
//! Each mutating call re-checks its preconditions against storage. The write
//! side of every step is a single atomic store call, so a request and its
//! notification are committed together or not at all, and a request can be
//! decided exactly once even under concurrent deciders.

use std::sync::Arc;

use axum::http::StatusCode;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::authorization::{require_family_owner, require_user, AuthzError};
use crate::auth::middleware::AuthContext;
use crate::models::family::{CreateFamily, Family};
use crate::models::join_request::{Decision, JoinRequest, NewJoinRequest};
use crate::models::notification::{NewNotification, NotificationPayload};
use crate::models::user::User;
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("family not found")]
    FamilyNotFound,

    #[error("you are already a member of this family")]
    AlreadyMember,

    #[error("a join request for this family is already pending")]
    DuplicateRequest,

    #[error("only the family owner can decide join requests")]
    Forbidden,

    #[error("join request not found or already processed")]
    NotFoundOrAlreadyProcessed,

    #[error("user not found")]
    UserNotFound,

    /// Creating a family while already belonging to one
    #[error("you already belong to a family")]
    AlreadyInFamily,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MembershipError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            MembershipError::FamilyNotFound => "family_not_found",
            MembershipError::AlreadyMember => "already_member",
            MembershipError::DuplicateRequest => "duplicate_request",
            MembershipError::Forbidden => "forbidden",
            MembershipError::NotFoundOrAlreadyProcessed => "not_found_or_already_processed",
            MembershipError::UserNotFound => "user_not_found",
            MembershipError::AlreadyInFamily => "already_in_family",
            MembershipError::Store(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            MembershipError::AlreadyMember | MembershipError::DuplicateRequest => {
                StatusCode::BAD_REQUEST
            }
            MembershipError::Forbidden => StatusCode::FORBIDDEN,
            MembershipError::FamilyNotFound | MembershipError::NotFoundOrAlreadyProcessed => {
                StatusCode::NOT_FOUND
            }
            MembershipError::UserNotFound => StatusCode::UNAUTHORIZED,
            MembershipError::AlreadyInFamily => StatusCode::CONFLICT,
            MembershipError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthzError> for MembershipError {
    fn from(e: AuthzError) -> Self {
        match e {
            AuthzError::UserNotFound => MembershipError::UserNotFound,
            AuthzError::FamilyNotFound(_) => MembershipError::FamilyNotFound,
            AuthzError::NotOwner | AuthzError::NotMember(_) | AuthzError::NoFamily => {
                MembershipError::Forbidden
            }
            AuthzError::Store(e) => MembershipError::Store(e),
        }
    }
}

pub type MembershipResult<T> = Result<T, MembershipError>;

/// Pending request joined with the requester's name, as shown to the owner.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PendingRequest {
    #[serde(flatten)]
    pub request: JoinRequest,
    pub user_name: String,
}

#[derive(Clone)]
pub struct MembershipWorkflow {
    store: Arc<dyn Store>,
}

impl MembershipWorkflow {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates a family owned by the caller and attaches the caller to it.
    ///
    /// # Errors
    ///
    /// [`MembershipError::AlreadyInFamily`] if the caller already belongs to a
    /// family, which keeps both the single-family and single-owner rules.
    pub async fn create_family(&self, auth: &AuthContext, name: &str) -> MembershipResult<Family> {
        let user = require_user(&*self.store, auth).await?;
        if user.family_id.is_some() {
            return Err(MembershipError::AlreadyInFamily);
        }

        // The store attaches the owner only while they are still familyless,
        // so a concurrent create loses with a conflict.
        let family = self
            .store
            .create_family(CreateFamily {
                name: name.to_string(),
                owner_id: user.id,
            })
            .await
            .map_err(|e| match e {
                e if e.is_conflict() => MembershipError::AlreadyInFamily,
                e => MembershipError::Store(e),
            })?;

        info!(family_id = %family.id, owner_id = %user.id, "Family created");
        Ok(family)
    }

    /// Files a join request and notifies the family owner.
    ///
    /// Returns the new request's id. The request and the owner's
    /// `join_request` notification are written as one unit: if the
    /// notification cannot be stored, no request is left behind.
    ///
    /// # Errors
    ///
    /// - [`MembershipError::FamilyNotFound`]
    /// - [`MembershipError::AlreadyMember`] when the caller already belongs to
    ///   the target family
    /// - [`MembershipError::DuplicateRequest`] when a pending request for the
    ///   same family exists, including one committed by a concurrent call
    pub async fn create_join_request(
        &self,
        auth: &AuthContext,
        family_id: Uuid,
    ) -> MembershipResult<Uuid> {
        let family = self
            .store
            .find_family_by_id(family_id)
            .await?
            .ok_or(MembershipError::FamilyNotFound)?;

        let requester = require_user(&*self.store, auth).await?;
        if requester.belongs_to(family.id) {
            return Err(MembershipError::AlreadyMember);
        }

        if self
            .store
            .find_pending_join_request(requester.id, family.id)
            .await?
            .is_some()
        {
            return Err(MembershipError::DuplicateRequest);
        }

        let request = NewJoinRequest::new(requester.id, family.id);
        let owner_notification = NewNotification {
            family_id: family.id,
            recipient_id: family.owner_id,
            content: NotificationPayload::JoinRequest {
                request_id: request.id,
                user_name: requester.display_name(),
            },
        };

        // The pre-check above only gives the friendly error early; the store
        // enforces uniqueness for concurrent submissions.
        let created = self
            .store
            .submit_join_request(request, owner_notification)
            .await?
            .ok_or(MembershipError::DuplicateRequest)?;

        info!(
            request_id = %created.id,
            family_id = %family.id,
            requester_id = %requester.id,
            "Join request submitted"
        );
        Ok(created.id)
    }

    pub async fn approve_request(
        &self,
        auth: &AuthContext,
        family_id: Uuid,
        request_id: Uuid,
    ) -> MembershipResult<JoinRequest> {
        self.decide(auth, family_id, request_id, Decision::Approve).await
    }

    pub async fn reject_request(
        &self,
        auth: &AuthContext,
        family_id: Uuid,
        request_id: Uuid,
    ) -> MembershipResult<JoinRequest> {
        self.decide(auth, family_id, request_id, Decision::Reject).await
    }

    /// Shared path of approve and reject.
    ///
    /// A missing request, one from another family, and one already decided
    /// all yield [`MembershipError::NotFoundOrAlreadyProcessed`], so a caller
    /// learns nothing about requests it may not see.
    async fn decide(
        &self,
        auth: &AuthContext,
        family_id: Uuid,
        request_id: Uuid,
        decision: Decision,
    ) -> MembershipResult<JoinRequest> {
        let family = require_family_owner(&*self.store, auth, family_id).await?;

        let request = self
            .store
            .find_join_request(request_id)
            .await?
            .filter(|r| r.family_id == family.id && !r.status.is_terminal())
            .ok_or(MembershipError::NotFoundOrAlreadyProcessed)?;

        let content = match decision {
            Decision::Approve => NotificationPayload::JoinApproved {
                family: family.id,
                family_name: family.name.clone(),
            },
            Decision::Reject => NotificationPayload::JoinRejected {
                family: family.id,
                family_name: family.name.clone(),
            },
        };
        let requester_notification = NewNotification {
            family_id: family.id,
            recipient_id: request.user_id,
            content,
        };

        let decided = self
            .store
            .decide_join_request(request.id, family.id, decision, requester_notification)
            .await?
            .ok_or(MembershipError::NotFoundOrAlreadyProcessed)?;

        info!(
            request_id = %decided.id,
            family_id = %family.id,
            requester_id = %decided.user_id,
            decision = decision.as_str(),
            status = decided.status.as_str(),
            "Join request decided"
        );
        Ok(decided)
    }

    /// Pending requests of a family with requester names, oldest first.
    /// Owner only.
    pub async fn list_pending_requests(
        &self,
        auth: &AuthContext,
        family_id: Uuid,
    ) -> MembershipResult<Vec<PendingRequest>> {
        let family = require_family_owner(&*self.store, auth, family_id).await?;

        let requests = self.store.list_pending_join_requests(family.id).await?;
        let mut pending = Vec::with_capacity(requests.len());
        for request in requests {
            let user_name = self
                .store
                .find_user_by_id(request.user_id)
                .await?
                .as_ref()
                .map(User::display_name)
                .unwrap_or_default();
            pending.push(PendingRequest { request, user_name });
        }

        debug!(family_id = %family.id, count = pending.len(), "Listed pending join requests");
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::join_request::JoinRequestStatus;
    use crate::models::notification::NotificationType;
    use crate::models::user::{CreateUser, FamilyRole};
    use crate::store::{Directory, JoinRequestStore, MemoryStore, NotificationStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        workflow: MembershipWorkflow,
        owner: AuthContext,
        family: Family,
        requester: AuthContext,
    }

    async fn seed_user(store: &MemoryStore, email: &str, first: &str, second: Option<&str>) -> AuthContext {
        let user = store
            .create_user(CreateUser {
                email: email.to_string(),
                password_hash: "hash".to_string(),
                first_name: first.to_string(),
                last_name: "García".to_string(),
                second_last_name: second.map(str::to_string),
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
        let workflow = MembershipWorkflow::new(store.clone());

        let owner = seed_user(&store, "bea@example.com", "Bea", None).await;
        let family = workflow.create_family(&owner, "Los García").await.unwrap();
        let requester = seed_user(&store, "ana@example.com", "Ana", Some("López")).await;

        Fixture {
            store,
            workflow,
            owner,
            family,
            requester,
        }
    }

    async fn family_of(store: &MemoryStore, auth: &AuthContext) -> Option<Uuid> {
        store.find_user_by_id(auth.user_id).await.unwrap().unwrap().family_id
    }

    #[tokio::test]
    async fn test_create_join_request_notifies_owner() {
        let f = fixture().await;

        let request_id = f.workflow.create_join_request(&f.requester, f.family.id).await.unwrap();

        let request = f.store.find_join_request(request_id).await.unwrap().unwrap();
        assert_eq!(request.status, JoinRequestStatus::Pending);
        assert_eq!(request.user_id, f.requester.user_id);

        let inbox = f.store.list_notifications(f.owner.user_id).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(
            inbox[0].content,
            NotificationPayload::JoinRequest {
                request_id,
                user_name: "Ana García López".to_string(),
            }
        );
        assert_eq!(inbox[0].family_id, f.family.id);
        assert!(!inbox[0].is_read());
    }

    #[tokio::test]
    async fn test_second_request_is_duplicate() {
        let f = fixture().await;

        f.workflow.create_join_request(&f.requester, f.family.id).await.unwrap();
        let err = f
            .workflow
            .create_join_request(&f.requester, f.family.id)
            .await
            .unwrap_err();

        assert!(matches!(err, MembershipError::DuplicateRequest));
        assert_eq!(err.kind(), "duplicate_request");
        assert_eq!(f.store.join_requests().await.len(), 1);
        assert_eq!(f.store.notifications().await.len(), 1);
    }

    #[tokio::test]
    async fn test_member_cannot_request_own_family() {
        let f = fixture().await;

        let err = f.workflow.create_join_request(&f.owner, f.family.id).await.unwrap_err();

        assert!(matches!(err, MembershipError::AlreadyMember));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(f.store.join_requests().await.is_empty());
        assert!(f.store.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_family() {
        let f = fixture().await;
        let err = f
            .workflow
            .create_join_request(&f.requester, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::FamilyNotFound));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failed_owner_notification_leaves_no_request() {
        let f = fixture().await;
        f.store.fail_notification_writes(true);

        let err = f
            .workflow
            .create_join_request(&f.requester, f.family.id)
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::Store(_)));
        assert!(f.store.join_requests().await.is_empty());

        // Nothing orphaned, so a retry goes through.
        f.store.fail_notification_writes(false);
        assert!(f.workflow.create_join_request(&f.requester, f.family.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_approve_joins_family_and_notifies_requester() {
        let f = fixture().await;
        let request_id = f.workflow.create_join_request(&f.requester, f.family.id).await.unwrap();

        let decided = f
            .workflow
            .approve_request(&f.owner, f.family.id, request_id)
            .await
            .unwrap();

        assert_eq!(decided.status, JoinRequestStatus::Approved);
        assert_eq!(family_of(&f.store, &f.requester).await, Some(f.family.id));

        let inbox = f.store.list_notifications(f.requester.user_id).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind(), NotificationType::JoinApproved);
        assert_eq!(
            inbox[0].content,
            NotificationPayload::JoinApproved {
                family: f.family.id,
                family_name: "Los García".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_decisions_are_one_shot() {
        let f = fixture().await;
        let request_id = f.workflow.create_join_request(&f.requester, f.family.id).await.unwrap();
        f.workflow.approve_request(&f.owner, f.family.id, request_id).await.unwrap();

        for result in [
            f.workflow.approve_request(&f.owner, f.family.id, request_id).await,
            f.workflow.reject_request(&f.owner, f.family.id, request_id).await,
        ] {
            assert!(matches!(result, Err(MembershipError::NotFoundOrAlreadyProcessed)));
        }

        let request = f.store.find_join_request(request_id).await.unwrap().unwrap();
        assert_eq!(request.status, JoinRequestStatus::Approved);
        assert_eq!(f.store.list_notifications(f.requester.user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reject_leaves_requester_unattached() {
        let f = fixture().await;
        let request_id = f.workflow.create_join_request(&f.requester, f.family.id).await.unwrap();

        let decided = f
            .workflow
            .reject_request(&f.owner, f.family.id, request_id)
            .await
            .unwrap();

        assert_eq!(decided.status, JoinRequestStatus::Denied);
        assert_eq!(family_of(&f.store, &f.requester).await, None);

        let inbox = f.store.list_notifications(f.requester.user_id).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind(), NotificationType::JoinRejected);

        // A denied request no longer blocks a fresh one.
        assert!(f.workflow.create_join_request(&f.requester, f.family.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_owner_is_forbidden_regardless_of_status() {
        let f = fixture().await;
        let outsider = seed_user(&f.store, "carl@example.com", "Carl", None).await;
        let pending = f.workflow.create_join_request(&f.requester, f.family.id).await.unwrap();

        for request_id in [pending, Uuid::new_v4()] {
            let err = f
                .workflow
                .approve_request(&outsider, f.family.id, request_id)
                .await
                .unwrap_err();
            assert!(matches!(err, MembershipError::Forbidden));
            assert_eq!(err.status(), StatusCode::FORBIDDEN);

            let err = f
                .workflow
                .reject_request(&f.requester, f.family.id, request_id)
                .await
                .unwrap_err();
            assert!(matches!(err, MembershipError::Forbidden));
        }

        let request = f.store.find_join_request(pending).await.unwrap().unwrap();
        assert_eq!(request.status, JoinRequestStatus::Pending);
        assert_eq!(family_of(&f.store, &f.requester).await, None);
        assert!(f.store.list_notifications(f.requester.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_of_another_family_is_hidden() {
        let f = fixture().await;
        let other_owner = seed_user(&f.store, "dan@example.com", "Dan", None).await;
        let other = f.workflow.create_family(&other_owner, "Los Pérez").await.unwrap();
        let request_id = f.workflow.create_join_request(&f.requester, f.family.id).await.unwrap();

        let err = f
            .workflow
            .approve_request(&other_owner, other.id, request_id)
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::NotFoundOrAlreadyProcessed));
    }

    #[tokio::test]
    async fn test_failed_requester_notification_rolls_back_decision() {
        let f = fixture().await;
        let request_id = f.workflow.create_join_request(&f.requester, f.family.id).await.unwrap();
        f.store.fail_notification_writes(true);

        assert!(f
            .workflow
            .approve_request(&f.owner, f.family.id, request_id)
            .await
            .is_err());

        let request = f.store.find_join_request(request_id).await.unwrap().unwrap();
        assert_eq!(request.status, JoinRequestStatus::Pending);
        assert_eq!(family_of(&f.store, &f.requester).await, None);
    }

    #[tokio::test]
    async fn test_concurrent_decisions_commit_once() {
        let f = fixture().await;
        let request_id = f.workflow.create_join_request(&f.requester, f.family.id).await.unwrap();

        let (a, b) = tokio::join!(
            f.workflow.approve_request(&f.owner, f.family.id, request_id),
            f.workflow.reject_request(&f.owner, f.family.id, request_id),
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(f.store.list_notifications(f.requester.user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_create_one_request() {
        let f = fixture().await;

        let (a, b) = tokio::join!(
            f.workflow.create_join_request(&f.requester, f.family.id),
            f.workflow.create_join_request(&f.requester, f.family.id),
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(f.store.join_requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_family_refuses_existing_member() {
        let f = fixture().await;
        let err = f.workflow.create_family(&f.owner, "Second").await.unwrap_err();
        assert!(matches!(err, MembershipError::AlreadyInFamily));
        assert_eq!(err.kind(), "already_in_family");
    }

    #[tokio::test]
    async fn test_concurrent_family_creation_attaches_once() {
        let store = Arc::new(MemoryStore::new());
        let workflow = MembershipWorkflow::new(store.clone());
        let owner = seed_user(&store, "eva@example.com", "Eva", None).await;

        let (a, b) = tokio::join!(
            workflow.create_family(&owner, "Uno"),
            workflow.create_family(&owner, "Dos"),
        );

        let (created, lost) = match (a, b) {
            (Ok(family), Err(e)) | (Err(e), Ok(family)) => (family, e),
            other => panic!("expected exactly one family, got {other:?}"),
        };
        assert!(matches!(lost, MembershipError::AlreadyInFamily));
        assert_eq!(family_of(&store, &owner).await, Some(created.id));

        let uno = store.search_families("Uno").await.unwrap();
        let dos = store.search_families("Dos").await.unwrap();
        assert_eq!(uno.len() + dos.len(), 1);
    }

    #[tokio::test]
    async fn test_store_conflict_on_create_maps_to_already_in_family() {
        let f = fixture().await;

        // Skips the workflow pre-check and goes straight to the store.
        let err = f
            .store
            .create_family(CreateFamily {
                name: "Otra".to_string(),
                owner_id: f.owner.user_id,
            })
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(family_of(&f.store, &f.owner).await, Some(f.family.id));
        assert!(f.store.search_families("Otra").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_pending_requests_is_owner_only() {
        let f = fixture().await;
        f.workflow.create_join_request(&f.requester, f.family.id).await.unwrap();

        let pending = f.workflow.list_pending_requests(&f.owner, f.family.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].user_name, "Ana García López");

        assert!(matches!(
            f.workflow.list_pending_requests(&f.requester, f.family.id).await,
            Err(MembershipError::Forbidden)
        ));
    }
}
