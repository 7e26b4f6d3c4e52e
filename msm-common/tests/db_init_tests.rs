//! Integration tests for on-disk database initialization

use msm_common::db::init::{init_database, seed_bootstrap_user};
use msm_common::db::migrations::{get_schema_version, CURRENT_SCHEMA_VERSION};
use msm_common::db::{instruments, UserManager};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("music.db");

    let pool = init_database(&db_path).await.unwrap();

    assert!(db_path.exists(), "Database file was not created");
    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_database_reopens_with_data_intact() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("music.db");

    let pool = init_database(&db_path).await.unwrap();
    instruments::insert(
        &pool,
        &instruments::InstrumentDraft {
            name: "Bassoon".to_string(),
        },
    )
    .await
    .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let names: Vec<String> = instruments::list_all(&pool)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();

    assert_eq!(names, vec!["Bassoon"]);
}

#[tokio::test]
async fn test_bootstrap_user_holds_every_role() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("music.db")).await.unwrap();

    assert!(seed_bootstrap_user(&pool, "admin").await.unwrap());

    let mut conn = pool.acquire().await.unwrap();
    let user = UserManager::find_by_name(&mut conn, "admin")
        .await
        .unwrap()
        .expect("bootstrap user exists");
    let roles = UserManager::get_roles(&mut conn, &user.id).await.unwrap();

    assert_eq!(roles, vec!["Admin", "Security", "Staff", "Supervisor"]);
}
