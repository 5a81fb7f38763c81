/// Route handlers, one module per resource
///
/// - `health`: liveness and storage probe
/// - `auth`: register, login, current profile
/// - `families`: create, search, details, members
/// - `join_requests`: submit, approve, reject, list pending
/// - `notifications`: inbox, open, mark read, fan-out
/// - `tasks`: the family task board
/// - `events`: the family calendar
/// - `address`: the family postal address

pub mod address;
pub mod auth;
pub mod events;
pub mod families;
pub mod health;
pub mod join_requests;
pub mod notifications;
pub mod tasks;

use crate::error::ApiError;
use serde::Serialize;
use uuid::Uuid;

/// Parses a path identifier, rejecting malformed values with `400 invalid_id`.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::InvalidId(format!("Invalid {} id: {}", what, raw)))
}

/// Plain acknowledgement body
#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
