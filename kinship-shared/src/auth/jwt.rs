/// Access tokens
///
/// HS256 bearer tokens with a fixed validity window. There is no refresh
/// flow and no revocation list: a token is valid until it expires.
///
/// # Example
///
/// ```
/// use chrono::Duration;
/// use kinship_shared::auth::jwt::{create_token, validate_token, Claims};
/// use uuid::Uuid;
///
/// let secret = "a-development-secret-of-32-bytes!";
/// let claims = Claims::new(Uuid::new_v4(), "ana@example.com", Duration::hours(24));
/// let token = create_token(&claims, secret).unwrap();
///
/// let decoded = validate_token(&token, secret).unwrap();
/// assert_eq!(decoded.email, "ana@example.com");
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value of the `iss` claim
pub const ISSUER: &str = "kinship";

/// Default validity window
pub const DEFAULT_TTL_HOURS: i64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("failed to create token: {0}")]
    Create(String),

    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,

    pub email: String,

    pub iss: String,

    pub iat: i64,

    pub nbf: i64,

    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, email: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now().timestamp();

        Self {
            sub: user_id,
            email: email.into(),
            iss: ISSUER.to_string(),
            iat: now,
            nbf: now,
            exp: now + ttl.num_seconds(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Seconds left before expiry, zero once expired.
    pub fn expires_in(&self) -> i64 {
        (self.exp - Utc::now().timestamp()).max(0)
    }
}

pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::Create(e.to_string()))
}

/// Checks signature, issuer, `exp` and `nbf`.
///
/// # Errors
///
/// [`JwtError::Expired`] for an out-of-window token, [`JwtError::Invalid`]
/// for everything else.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid(e.to_string()),
        })
}
