/// Embedded schema migrations
///
/// The SQL files under the workspace `migrations/` directory are compiled into
/// the binary with `sqlx::migrate!`, so a deployed server can bring its own
/// schema up to date at startup.
///
/// # Example
///
/// ```no_run
/// use kinship_shared::db::migrations::{get_migration_status, run_migrations};
/// use kinship_shared::db::pool::{create_pool, PoolSettings};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(PoolSettings {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
///
/// run_migrations(&pool).await?;
/// let status = get_migration_status(&pool).await?;
/// assert!(status.is_up_to_date);
/// # Ok(())
/// # }
/// ```

use sqlx::migrate::{MigrateDatabase, MigrateError, Migrator};
use sqlx::postgres::PgPool;
use sqlx::Postgres;
use tracing::{debug, info, warn};

static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

/// Applied-migration bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Successfully applied migrations
    pub applied: usize,

    /// Migrations embedded in this build
    pub known: usize,

    /// Highest applied version
    pub latest_version: Option<i64>,

    pub is_up_to_date: bool,
}

/// Applies every pending migration.
///
/// # Errors
///
/// Returns the first failing migration's error; sqlx rolls that migration back.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    info!(known = MIGRATOR.iter().count(), "Running database migrations");

    MIGRATOR.run(pool).await.map_err(|e| {
        warn!(error = %e, "Migration failed");
        e
    })?;

    info!("Database schema up to date");
    Ok(())
}

/// Reports how far the database schema is behind this build.
pub async fn get_migration_status(pool: &PgPool) -> Result<MigrationStatus, sqlx::Error> {
    let known = MIGRATOR.iter().filter(|m| !m.migration_type.is_down_migration()).count();

    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = 'public' AND table_name = '_sqlx_migrations'
        )",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        debug!("No migrations table yet");
        return Ok(MigrationStatus {
            applied: 0,
            known,
            latest_version: None,
            is_up_to_date: known == 0,
        });
    }

    let (applied, latest_version): (i64, Option<i64>) = sqlx::query_as(
        "SELECT COUNT(*), MAX(version) FROM _sqlx_migrations WHERE success = true",
    )
    .fetch_one(pool)
    .await?;

    let applied = applied as usize;
    Ok(MigrationStatus {
        applied,
        known,
        latest_version,
        is_up_to_date: applied >= known,
    })
}

/// Creates the database named in `database_url` when it is missing.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), sqlx::Error> {
    if Postgres::database_exists(database_url).await? {
        debug!("Database already exists");
        return Ok(());
    }

    info!("Creating database");
    Postgres::create_database(database_url).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_migrations_are_ordered() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert!(!versions.is_empty());
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }
}
