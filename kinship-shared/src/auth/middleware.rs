/// Request identity
///
/// Turns the `Authorization: Bearer <jwt>` header into an [`AuthContext`].
/// The HTTP layer stores the context in request extensions and handlers pass
/// it explicitly into every service call; business code never looks at
/// headers.
///
/// # Example
///
/// ```
/// use axum::http::{header, HeaderMap, HeaderValue};
/// use chrono::Duration;
/// use kinship_shared::auth::jwt::{create_token, Claims};
/// use kinship_shared::auth::middleware::authenticate;
/// use uuid::Uuid;
///
/// let secret = "a-development-secret-of-32-bytes!";
/// let user_id = Uuid::new_v4();
/// let token = create_token(&Claims::new(user_id, "ana@example.com", Duration::hours(1)), secret).unwrap();
///
/// let mut headers = HeaderMap::new();
/// headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
///
/// let auth = authenticate(&headers, secret).unwrap();
/// assert_eq!(auth.user_id, user_id);
/// ```

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::{validate_token, JwtError};

/// The authenticated caller of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingCredentials,

    #[error("expected a Bearer token")]
    InvalidFormat,

    #[error("token expired")]
    Expired,

    #[error("invalid token")]
    InvalidToken,
}

/// Extracts the raw token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidFormat)
}

/// Validates the bearer credential and returns the caller's identity.
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<AuthContext, AuthError> {
    let token = bearer_token(headers)?;

    let claims = validate_token(token, secret).map_err(|e| match e {
        JwtError::Expired => AuthError::Expired,
        _ => AuthError::InvalidToken,
    })?;

    Ok(AuthContext {
        user_id: claims.sub,
        email: claims.email,
    })
}
