/// HTTP error mapping
///
/// Every handler returns `ApiResult<T>`. Errors render as
///
/// ```json
/// { "error": "duplicate_request", "message": "…", "details": [ … ] }
/// ```
///
/// where `error` is a stable machine-readable code and `details` appears only
/// for validation failures. Internal errors are logged and replaced with a
/// generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use kinship_shared::addresses::AddressError;
use kinship_shared::auth::authorization::AuthzError;
use kinship_shared::auth::jwt::JwtError;
use kinship_shared::auth::middleware::AuthError;
use kinship_shared::auth::password::PasswordError;
use kinship_shared::events::EventError;
use kinship_shared::membership::MembershipError;
use kinship_shared::notifications::NotificationError;
use kinship_shared::store::StoreError;
use kinship_shared::tasks::TaskError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// 400 with code `bad_request`
    BadRequest(String),

    /// 400 with code `invalid_id`
    InvalidId(String),

    Unauthorized(String),

    Forbidden(String),

    NotFound(String),

    Conflict(String),

    /// 422 with per-field details
    ValidationError(Vec<ValidationErrorDetail>),

    /// A domain error with its own status and code
    Domain {
        status: StatusCode,
        code: &'static str,
        message: String,
    },

    InternalError(String),

    ServiceUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidId(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Domain { status, .. } => *status,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::InvalidId(_) => "invalid_id",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::ValidationError(_) => "validation_error",
            ApiError::Domain { code, .. } => *code,
            ApiError::InternalError(_) => "internal_error",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
        }
    }

    fn domain(status: StatusCode, code: &'static str, message: String) -> Self {
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            return ApiError::InternalError(message);
        }
        ApiError::Domain {
            status,
            code,
            message,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::InvalidId(msg) => write!(f, "Invalid id: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::Domain { code, message, .. } => write!(f, "{}: {}", code, message),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, details) = match self {
            ApiError::ValidationError(errors) => {
                ("Request validation failed".to_string(), Some(errors))
            }
            ApiError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ("An internal error occurred".to_string(), None)
            }
            ApiError::BadRequest(msg)
            | ApiError::InvalidId(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::Domain { message: msg, .. } => (msg, None),
        };

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Unavailable(msg) => ApiError::ServiceUnavailable(msg),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<MembershipError> for ApiError {
    fn from(err: MembershipError) -> Self {
        ApiError::domain(err.status(), err.kind(), err.to_string())
    }
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        ApiError::domain(err.status(), err.kind(), err.to_string())
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        ApiError::domain(err.status(), err.kind(), err.to_string())
    }
}

impl From<EventError> for ApiError {
    fn from(err: EventError) -> Self {
        ApiError::domain(err.status(), err.kind(), err.to_string())
    }
}

impl From<AddressError> for ApiError {
    fn from(err: AddressError) -> Self {
        ApiError::domain(err.status(), err.kind(), err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        let message = err.to_string();
        match err {
            AuthzError::UserNotFound => ApiError::Unauthorized(message),
            AuthzError::FamilyNotFound(_) => ApiError::domain(StatusCode::NOT_FOUND, "family_not_found", message),
            AuthzError::NotOwner | AuthzError::NotMember(_) => ApiError::Forbidden(message),
            AuthzError::NoFamily => ApiError::domain(StatusCode::BAD_REQUEST, "no_family", message),
            AuthzError::Store(e) => e.into(),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("password operation failed: {}", err))
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Create(msg) => ApiError::InternalError(format!("token creation failed: {}", msg)),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| ValidationErrorDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("User not found".to_string());
        assert_eq!(err.to_string(), "Not found: User not found");
    }

    #[test]
    fn test_membership_errors_keep_their_codes() {
        let err = ApiError::from(MembershipError::AlreadyMember);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "already_member");

        let err = ApiError::from(MembershipError::DuplicateRequest);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "duplicate_request");

        let err = ApiError::from(MembershipError::NotFoundOrAlreadyProcessed);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "not_found_or_already_processed");
    }

    #[test]
    fn test_event_and_address_errors() {
        let err = ApiError::from(EventError::InvalidSchedule);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "invalid_schedule");

        let err = ApiError::from(AddressError::MissingField("city"));
        assert_eq!(err.code(), "missing_field");
        assert_eq!(err.to_string(), "missing_field: city is required");

        let err = ApiError::from(AddressError::NoFamily);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_authorization_errors() {
        let err = ApiError::from(AuthzError::NotOwner);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = ApiError::from(AuthzError::NoFamily);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "no_family");

        let err = ApiError::from(AuthzError::UserNotFound);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_store_failures_are_internal() {
        let err = ApiError::from(MembershipError::Store(StoreError::Corrupt("bad row".to_string())));
        assert!(matches!(err, ApiError::InternalError(_)));
        assert_eq!(err.code(), "internal_error");
    }

    #[derive(Validate)]
    struct Probe {
        #[validate(email(message = "must be a valid email"))]
        email: String,
        #[validate(length(min = 1))]
        name: String,
    }

    #[test]
    fn test_validation_errors_list_fields() {
        let probe = Probe {
            email: "nope".to_string(),
            name: String::new(),
        };
        let err = ApiError::from(probe.validate().unwrap_err());

        match err {
            ApiError::ValidationError(details) => {
                assert_eq!(details.len(), 2);
                assert_eq!(details[0].field, "email");
                assert_eq!(details[0].message, "must be a valid email");
                assert_eq!(details[1].field, "name");
                assert_eq!(details[1].message, "length");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
