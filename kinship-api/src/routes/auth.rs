/// Account endpoints
///
/// - `POST /v1/auth/register` (public)
/// - `POST /v1/auth/login` (public)
/// - `GET /v1/auth/me`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, ValidationErrorDetail},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use kinship_shared::{
    auth::{
        authorization::require_user,
        jwt::{self, Claims},
        middleware::AuthContext,
        password,
    },
    models::user::{normalize_email, CreateUser, FamilyRole, PublicUser},
    store::StoreError,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

const BAD_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        email(message = "Invalid email format"),
        length(max = 255, message = "Email must be at most 255 characters")
    )]
    pub email: String,

    /// Strength is checked separately, see [`password::validate_password_strength`]
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100, message = "Last name must be 1-100 characters"))]
    pub last_name: String,

    #[validate(length(max = 100, message = "Second last name must be at most 100 characters"))]
    pub second_last_name: Option<String>,

    #[serde(default)]
    pub role: FamilyRole,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,

    /// Seconds until the token expires
    pub expires_in: i64,

    pub user: PublicUser,
}

/// Registers a new account
///
/// # Errors
///
/// - `422 validation_error`: malformed fields or weak password
/// - `409 email_taken`: the email is already registered (case-insensitive)
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    req.validate()?;

    password::validate_password_strength(&req.password).map_err(|message| {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: "password".to_string(),
            message: message.to_string(),
        }])
    })?;

    let password_hash = password::hash_password(&req.password)?;

    let second_last_name = req
        .second_last_name
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let user = state
        .store
        .create_user(CreateUser {
            email: normalize_email(&req.email),
            password_hash,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            second_last_name,
            role: req.role,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::Domain {
                status: StatusCode::CONFLICT,
                code: "email_taken",
                message: "Email is already registered".to_string(),
            },
            other => other.into(),
        })?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id.to_string(),
        }),
    ))
}

/// Exchanges credentials for an access token
///
/// Unknown email and wrong password produce the same `401`.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate()?;

    let user = state
        .store
        .find_user_by_email(&req.email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(BAD_CREDENTIALS.to_string()))?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
        return Err(ApiError::Unauthorized(BAD_CREDENTIALS.to_string()));
    }

    let claims = Claims::new(user.id, user.email.clone(), state.config.jwt.ttl());
    let access_token = jwt::create_token(&claims, state.jwt_secret())?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        expires_in: claims.expires_in(),
        user: user.to_public(),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<PublicUser>> {
    let user = require_user(&*state.store, &auth).await?;
    Ok(Json(user.to_public()))
}
