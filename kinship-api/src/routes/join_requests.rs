/// Join request endpoints
///
/// | Method & path | Success |
/// |---|---|
/// | `POST /v1/families/:id/join-request` | `201 {request_id}` |
/// | `PUT /v1/families/:id/join-requests/:request_id/approve` | `200` ack |
/// | `PUT /v1/families/:id/join-requests/:request_id/reject` | `200` ack |
/// | `GET /v1/families/:id/join-requests` | `200` pending requests, oldest first |
///
/// Error bodies carry the stable code from
/// [`MembershipError::kind`](kinship_shared::membership::MembershipError::kind).

use super::{parse_id, Ack};
use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use kinship_shared::{
    auth::middleware::AuthContext,
    membership::PendingRequest,
    models::join_request::{Decision, JoinRequest},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRequestCreated {
    pub request_id: Uuid,
}

/// Decision acknowledgement, echoing the final state of the request
#[derive(Debug, Serialize)]
pub struct DecisionAck {
    #[serde(flatten)]
    pub ack: Ack,
    pub request: JoinRequest,
}

pub async fn create_join_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<JoinRequestCreated>)> {
    let family_id = parse_id(&id, "family")?;

    let request_id = state
        .membership()
        .create_join_request(&auth, family_id)
        .await?;

    Ok((StatusCode::CREATED, Json(JoinRequestCreated { request_id })))
}

pub async fn approve_request(
    state: State<AppState>,
    auth: Extension<AuthContext>,
    Path((id, request_id)): Path<(String, String)>,
) -> ApiResult<Json<DecisionAck>> {
    decide(state, auth, &id, &request_id, Decision::Approve).await
}

pub async fn reject_request(
    state: State<AppState>,
    auth: Extension<AuthContext>,
    Path((id, request_id)): Path<(String, String)>,
) -> ApiResult<Json<DecisionAck>> {
    decide(state, auth, &id, &request_id, Decision::Reject).await
}

async fn decide(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    family_id: &str,
    request_id: &str,
    decision: Decision,
) -> ApiResult<Json<DecisionAck>> {
    let family_id = parse_id(family_id, "family")?;
    let request_id = parse_id(request_id, "request")?;

    let membership = state.membership();
    let request = match decision {
        Decision::Approve => {
            membership
                .approve_request(&auth, family_id, request_id)
                .await?
        }
        Decision::Reject => {
            membership
                .reject_request(&auth, family_id, request_id)
                .await?
        }
    };

    Ok(Json(DecisionAck {
        ack: Ack::new(format!("Request {}", request.status.as_str())),
        request,
    }))
}

pub async fn list_pending_requests(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<PendingRequest>>> {
    let family_id = parse_id(&id, "family")?;

    let pending = state
        .membership()
        .list_pending_requests(&auth, family_id)
        .await?;

    Ok(Json(pending))
}
