/// User accounts
///
/// A user belongs to at most one family at a time. The `family_id` pointer is
/// only changed by family creation and by an approved join request.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE family_role AS ENUM ('mother', 'father', 'son', 'daughter', 'other');
///
/// CREATE TABLE users (
///     id UUID PRIMARY KEY,
///     email VARCHAR(255) NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     first_name VARCHAR(100) NOT NULL,
///     last_name VARCHAR(100) NOT NULL,
///     second_last_name VARCHAR(100),
///     role family_role NOT NULL DEFAULT 'other',
///     family_id UUID REFERENCES families(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use kinship_shared::models::user::{CreateUser, FamilyRole, User};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let user = User::create(&pool, CreateUser {
///     email: "ana@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     first_name: "Ana".to_string(),
///     last_name: "García".to_string(),
///     second_last_name: Some("López".to_string()),
///     role: FamilyRole::Mother,
/// })
/// .await?;
///
/// assert_eq!(user.display_name(), "Ana García López");
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Role a person plays inside their family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "family_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FamilyRole {
    Mother,
    Father,
    Son,
    Daughter,
    #[default]
    Other,
}

impl FamilyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FamilyRole::Mother => "mother",
            FamilyRole::Father => "father",
            FamilyRole::Son => "son",
            FamilyRole::Daughter => "daughter",
            FamilyRole::Other => "other",
        }
    }
}

/// A registered account
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Stored lowercased; see [`normalize_email`]
    pub email: String,

    /// Argon2id PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,
    pub second_last_name: Option<String>,
    pub role: FamilyRole,

    /// The single family this user belongs to, if any
    pub family_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`User::create`]
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub second_last_name: Option<String>,
    pub role: FamilyRole,
}

/// Profile shape returned to other users and to the account owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub second_last_name: Option<String>,
    pub role: FamilyRole,
    pub family_id: Option<Uuid>,
}

/// Lowercases and trims an email so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, second_last_name, \
                            role, family_id, created_at, updated_at";

impl User {
    /// Name shown to other family members: "first last[ second_last]".
    pub fn display_name(&self) -> String {
        match self.second_last_name.as_deref().map(str::trim) {
            Some(second) if !second.is_empty() => {
                format!("{} {} {}", self.first_name, self.last_name, second)
            }
            _ => format!("{} {}", self.first_name, self.last_name),
        }
    }

    pub fn belongs_to(&self, family_id: Uuid) -> bool {
        self.family_id == Some(family_id)
    }

    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            second_last_name: self.second_last_name.clone(),
            role: self.role,
            family_id: self.family_id,
        }
    }

    /// Inserts a new account with no family.
    ///
    /// # Errors
    ///
    /// A duplicate email surfaces as a unique-violation database error.
    pub async fn create<'e, E>(executor: E, data: CreateUser) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, second_last_name, role)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(normalize_email(&data.email))
        .bind(data.password_hash)
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.second_last_name)
        .bind(data.role)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(normalize_email(email))
            .fetch_optional(executor)
            .await
    }

    /// Members of a family ordered by join time.
    pub async fn list_by_family<'e, E>(executor: E, family_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE family_id = $1 ORDER BY created_at, id"
        ))
        .bind(family_id)
        .fetch_all(executor)
        .await
    }

    pub async fn count_by_family<'e, E>(executor: E, family_id: Uuid) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE family_id = $1")
            .bind(family_id)
            .fetch_one(executor)
            .await
    }

    /// Points the user at a family. Returns false when the user does not exist.
    pub async fn set_family<'e, E>(
        executor: E,
        user_id: Uuid,
        family_id: Option<Uuid>,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("UPDATE users SET family_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(family_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Attaches a familyless user to a family.
    ///
    /// Returns false when the user does not exist or already belongs to a
    /// family. The row lock taken by the `UPDATE` makes concurrent claims
    /// serialize, and only the first one matches.
    pub async fn claim_family<'e, E>(
        executor: E,
        user_id: Uuid,
        family_id: Uuid,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE users SET family_id = $2, updated_at = NOW() WHERE id = $1 AND family_id IS NULL",
        )
        .bind(user_id)
        .bind(family_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
