/// Families
///
/// A family is a named group with exactly one owner. The owner is fixed at
/// creation time and is attached to the family in the same unit of work.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE families (
///     id UUID PRIMARY KEY,
///     name VARCHAR(100) NOT NULL,
///     owner_id UUID NOT NULL REFERENCES users(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Family {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`Family::create`]
#[derive(Debug, Clone)]
pub struct CreateFamily {
    pub name: String,
    pub owner_id: Uuid,
}

/// Upper bound on search results.
pub const SEARCH_LIMIT: i64 = 20;

impl Family {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    /// Case-insensitive substring match on the name, or exact id match.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim();
        if let Ok(id) = Uuid::parse_str(query) {
            if self.id == id {
                return true;
            }
        }
        self.name.to_lowercase().contains(&query.to_lowercase())
    }

    /// Inserts the family row only. Attaching the owner is the caller's job.
    pub async fn create<'e, E>(executor: E, data: CreateFamily) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Family>(
            r#"
            INSERT INTO families (id, name, owner_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, owner_id, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.name.trim().to_string())
        .bind(data.owner_id)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Family>(
            "SELECT id, name, owner_id, created_at, updated_at FROM families WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// See [`Family::matches_query`] for the matching rule.
    pub async fn search<'e, E>(executor: E, query: &str) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = query.trim();
        let exact_id = Uuid::parse_str(query).ok();
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));

        sqlx::query_as::<_, Family>(
            r#"
            SELECT id, name, owner_id, created_at, updated_at
            FROM families
            WHERE LOWER(name) LIKE $1 ESCAPE '\' OR id = $2
            ORDER BY name, id
            LIMIT $3
            "#,
        )
        .bind(pattern)
        .bind(exact_id)
        .bind(SEARCH_LIMIT)
        .fetch_all(executor)
        .await
    }
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(name: &str) -> Family {
        Family {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_matches_query_is_case_insensitive() {
        let f = family("Los García");
        assert!(f.matches_query("garcía"));
        assert!(f.matches_query("  LOS "));
        assert!(!f.matches_query("pérez"));
    }

    #[test]
    fn test_matches_query_by_id() {
        let f = family("Smith");
        assert!(f.matches_query(&f.id.to_string()));
        assert!(!f.matches_query(&Uuid::new_v4().to_string()));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }

    #[test]
    fn test_is_owned_by() {
        let f = family("Smith");
        assert!(f.is_owned_by(f.owner_id));
        assert!(!f.is_owned_by(Uuid::new_v4()));
    }
}
