//! Database initialization
//!
//! Creates the database on first run, builds every table idempotently, runs
//! pending migrations and seeds the application roles.

use crate::capability::Role;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Open (creating if needed) the database at `db_path` and bring the schema up to date
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// Every connection to `sqlite::memory:` is a separate database, so the pool
/// is capped at one connection. Callers must not touch the pool while holding
/// a transaction from it.
pub async fn init_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create tables, run migrations and seed roles (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_instruments_table(pool).await?;
    create_musicians_table(pool).await?;
    create_songs_table(pool).await?;

    // Linking tables
    create_plays_table(pool).await?;
    create_performances_table(pool).await?;

    // Identity tables
    create_users_table(pool).await?;
    create_roles_table(pool).await?;
    create_user_roles_table(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;

    create_performance_summaries_view(pool).await?;
    seed_roles(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Instrument names are made unique by migration v1
async fn create_instruments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instruments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL CHECK (length(name) BETWEEN 1 AND 50)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_musicians_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS musicians (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL CHECK (length(first_name) BETWEEN 1 AND 50),
            middle_name TEXT CHECK (middle_name IS NULL OR length(middle_name) <= 50),
            last_name TEXT NOT NULL CHECK (length(last_name) BETWEEN 1 AND 100),
            phone TEXT NOT NULL CHECK (length(phone) = 10)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_songs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL CHECK (length(title) BETWEEN 1 AND 80),
            date_recorded DATE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Play link records (Instrument ↔ Musician)
///
/// An instrument that still has players cannot be deleted; removing a
/// musician drops their plays.
async fn create_plays_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS plays (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            instrument_id INTEGER NOT NULL REFERENCES instruments(id) ON DELETE RESTRICT,
            musician_id INTEGER NOT NULL REFERENCES musicians(id) ON DELETE CASCADE,
            UNIQUE (instrument_id, musician_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_performances_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS performances (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            comments TEXT CHECK (comments IS NULL OR length(comments) <= 2000),
            fee_paid REAL NOT NULL DEFAULT 0 CHECK (fee_paid >= 0),
            song_id INTEGER NOT NULL REFERENCES songs(id) ON DELETE RESTRICT,
            musician_id INTEGER NOT NULL REFERENCES musicians(id) ON DELETE RESTRICT,
            instrument_id INTEGER NOT NULL REFERENCES instruments(id) ON DELETE RESTRICT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            user_name TEXT NOT NULL UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_roles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS roles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_user_roles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_roles (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role_id TEXT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
            PRIMARY KEY (user_id, role_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Per-musician fee statistics behind the performance report
async fn create_performance_summaries_view(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS performance_summaries AS
        SELECT
            m.id AS id,
            m.first_name AS first_name,
            m.middle_name AS middle_name,
            m.last_name AS last_name,
            AVG(p.fee_paid) AS average_fee,
            MAX(p.fee_paid) AS highest_fee,
            MIN(p.fee_paid) AS lowest_fee,
            COUNT(p.id) AS total_performances
        FROM musicians m
        JOIN performances p ON p.musician_id = m.id
        GROUP BY m.id, m.first_name, m.middle_name, m.last_name
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_roles(pool: &SqlitePool) -> Result<()> {
    for role in Role::ALL {
        sqlx::query("INSERT OR IGNORE INTO roles (id, name) VALUES (?, ?)")
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(role.as_str())
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Create `user_name` holding every role when the users table is empty
///
/// Without it nobody could reach the role administration endpoints on a
/// fresh database. Returns whether a user was created.
pub async fn seed_bootstrap_user(pool: &SqlitePool, user_name: &str) -> Result<bool> {
    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    if user_count > 0 {
        return Ok(false);
    }

    let mut tx = pool.begin().await?;
    let user = crate::db::users::UserManager::create_user(&mut tx, user_name).await?;
    for role in Role::ALL {
        crate::db::users::UserManager::add_to_role(&mut tx, &user.id, role.as_str()).await?;
    }
    tx.commit().await?;

    info!("Seeded bootstrap user '{}' with all roles", user_name);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = init_in_memory().await.unwrap();
        init_schema(&pool).await.unwrap();

        let roles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(roles, Role::ALL.len() as i64);
    }

    #[tokio::test]
    async fn test_bootstrap_user_only_on_empty_table() {
        let pool = init_in_memory().await.unwrap();

        assert!(seed_bootstrap_user(&pool, "admin").await.unwrap());
        assert!(!seed_bootstrap_user(&pool, "someone-else").await.unwrap());

        let role_links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_roles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(role_links, Role::ALL.len() as i64);
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let pool = init_in_memory().await.unwrap();

        let result = sqlx::query("INSERT INTO plays (instrument_id, musician_id) VALUES (1, 1)")
            .execute(&pool)
            .await;

        let err: crate::Error = result.unwrap_err().into();
        assert!(err.is_foreign_key_violation());
    }
}
