/// Join requests
///
/// A user's petition to join a family. Status is monotonic:
///
/// ```text
/// pending → approved
/// pending → denied
/// ```
///
/// Decided requests are terminal. At most one `pending` request exists per
/// (user, family) pair, backed by a partial unique index.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE join_request_status AS ENUM ('pending', 'approved', 'denied');
///
/// CREATE TABLE join_requests (
///     id UUID PRIMARY KEY,
///     user_id UUID NOT NULL REFERENCES users(id),
///     family_id UUID NOT NULL REFERENCES families(id),
///     status join_request_status NOT NULL DEFAULT 'pending',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE UNIQUE INDEX uq_join_requests_one_pending
///     ON join_requests(user_id, family_id) WHERE status = 'pending';
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Lifecycle of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "join_request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Denied,
}

/// What the family owner decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Status a pending request moves to under this decision.
    pub fn target_status(&self) -> JoinRequestStatus {
        match self {
            Decision::Approve => JoinRequestStatus::Approved,
            Decision::Reject => JoinRequestStatus::Denied,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

impl JoinRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRequestStatus::Pending => "pending",
            JoinRequestStatus::Approved => "approved",
            JoinRequestStatus::Denied => "denied",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JoinRequestStatus::Pending)
    }

    /// The only transition table there is: a pending request can be decided
    /// once. Returns `None` for any other source state.
    pub fn apply(self, decision: Decision) -> Option<JoinRequestStatus> {
        match self {
            JoinRequestStatus::Pending => Some(decision.target_status()),
            JoinRequestStatus::Approved | JoinRequestStatus::Denied => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct JoinRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub family_id: Uuid,
    pub status: JoinRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`JoinRequest::insert_pending`]. The id is chosen by the caller so
/// the owner notification can reference it before the row exists.
#[derive(Debug, Clone, Copy)]
pub struct NewJoinRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub family_id: Uuid,
}

impl NewJoinRequest {
    pub fn new(user_id: Uuid, family_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            family_id,
        }
    }
}

const JOIN_REQUEST_COLUMNS: &str = "id, user_id, family_id, status, created_at, updated_at";

impl JoinRequest {
    /// Inserts a pending request.
    ///
    /// Returns `None` when a pending request for the same pair already exists;
    /// the partial unique index makes this race-free.
    pub async fn insert_pending<'e, E>(
        executor: E,
        data: NewJoinRequest,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, JoinRequest>(&format!(
            "INSERT INTO join_requests (id, user_id, family_id, status)
             VALUES ($1, $2, $3, 'pending')
             ON CONFLICT (user_id, family_id) WHERE status = 'pending' DO NOTHING
             RETURNING {JOIN_REQUEST_COLUMNS}"
        ))
        .bind(data.id)
        .bind(data.user_id)
        .bind(data.family_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, JoinRequest>(&format!(
            "SELECT {JOIN_REQUEST_COLUMNS} FROM join_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_pending<'e, E>(
        executor: E,
        user_id: Uuid,
        family_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, JoinRequest>(&format!(
            "SELECT {JOIN_REQUEST_COLUMNS} FROM join_requests
             WHERE user_id = $1 AND family_id = $2 AND status = 'pending'"
        ))
        .bind(user_id)
        .bind(family_id)
        .fetch_optional(executor)
        .await
    }

    /// Pending requests of a family, oldest first.
    pub async fn list_pending_by_family<'e, E>(
        executor: E,
        family_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, JoinRequest>(&format!(
            "SELECT {JOIN_REQUEST_COLUMNS} FROM join_requests
             WHERE family_id = $1 AND status = 'pending'
             ORDER BY created_at, id"
        ))
        .bind(family_id)
        .fetch_all(executor)
        .await
    }

    /// Compare-and-swap from `pending` to the decision's target status.
    ///
    /// Returns `None` if the request does not exist, belongs to another family,
    /// or has already been decided. Concurrent deciders cannot both succeed.
    pub async fn decide<'e, E>(
        executor: E,
        id: Uuid,
        family_id: Uuid,
        decision: Decision,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, JoinRequest>(&format!(
            "UPDATE join_requests
             SET status = $3, updated_at = NOW()
             WHERE id = $1 AND family_id = $2 AND status = 'pending'
             RETURNING {JOIN_REQUEST_COLUMNS}"
        ))
        .bind(id)
        .bind(family_id)
        .bind(decision.target_status())
        .fetch_optional(executor)
        .await
    }
}
