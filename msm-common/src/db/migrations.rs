//! Database schema migrations
//!
//! Versioned changes applied on top of the `CREATE TABLE IF NOT EXISTS`
//! baseline, tracked in the `schema_version` table.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field already ran them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Keep them idempotent** - use `IF NOT EXISTS` or check `pragma_*` first

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    Ok(())
}

/// Migration v1: instrument names are unique
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS ix_instruments_name ON instruments(name)")
        .execute(pool)
        .await?;
    Ok(())
}

/// Migration v2: lookup indexes for link and performance foreign keys
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    for sql in [
        "CREATE INDEX IF NOT EXISTS ix_plays_musician_id ON plays(musician_id)",
        "CREATE INDEX IF NOT EXISTS ix_performances_musician_id ON performances(musician_id)",
        "CREATE INDEX IF NOT EXISTS ix_performances_instrument_id ON performances(instrument_id)",
        "CREATE INDEX IF NOT EXISTS ix_performances_song_id ON performances(song_id)",
        "CREATE INDEX IF NOT EXISTS ix_user_roles_role_id ON user_roles(role_id)",
    ] {
        sqlx::query(sql).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_database_reaches_current_version() {
        let pool = crate::db::init_in_memory().await.unwrap();

        assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);

        // Re-running is a no-op
        run_migrations(&pool).await.unwrap();
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, CURRENT_SCHEMA_VERSION as i64);
    }

    #[tokio::test]
    async fn test_instrument_name_unique_after_v1() {
        let pool = crate::db::init_in_memory().await.unwrap();

        sqlx::query("INSERT INTO instruments (name) VALUES ('Oboe')")
            .execute(&pool)
            .await
            .unwrap();
        let err: crate::Error = sqlx::query("INSERT INTO instruments (name) VALUES ('Oboe')")
            .execute(&pool)
            .await
            .unwrap_err()
            .into();

        assert!(err.is_unique_violation());
    }
}
