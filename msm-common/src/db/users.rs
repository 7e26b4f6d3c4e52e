//! Users and role membership
//!
//! [`UserManager`] is the identity layer: it owns the `users`, `roles` and
//! `user_roles` tables and addresses roles by name. [`UserRoleLinks`] exposes
//! role membership of one user as a [`LinkStore`] so role edits go through
//! the same reconciler as every other relation.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

use crate::reconcile::{Candidate, LinkStore};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    pub id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct RoleRecord {
    pub id: String,
    pub name: String,
}

/// Roles are selected and linked by name
impl Candidate for RoleRecord {
    type Key = String;

    fn key(&self) -> String {
        self.name.clone()
    }
}

/// Identity operations over a single connection
///
/// Every method takes the connection explicitly so callers decide whether it
/// runs inside a transaction.
pub struct UserManager;

impl UserManager {
    pub async fn create_user(conn: &mut SqliteConnection, user_name: &str) -> Result<User> {
        let user_name = user_name.trim();
        if user_name.is_empty() {
            return Err(Error::InvalidInput("User name cannot be blank".to_string()));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            user_name: user_name.to_string(),
        };
        sqlx::query("INSERT INTO users (id, user_name) VALUES (?, ?)")
            .bind(&user.id)
            .bind(&user.user_name)
            .execute(&mut *conn)
            .await?;

        debug!(user_id = %user.id, user_name = %user.user_name, "Created user");
        Ok(user)
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, user_name FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(user)
    }

    pub async fn find_by_name(conn: &mut SqliteConnection, user_name: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, user_name FROM users WHERE user_name = ?")
            .bind(user_name)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(user)
    }

    pub async fn list_users(conn: &mut SqliteConnection) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT id, user_name FROM users ORDER BY user_name")
            .fetch_all(&mut *conn)
            .await?;
        Ok(users)
    }

    /// Every role, ordered by name
    pub async fn list_roles(conn: &mut SqliteConnection) -> Result<Vec<RoleRecord>> {
        let roles = sqlx::query_as::<_, RoleRecord>("SELECT id, name FROM roles ORDER BY name")
            .fetch_all(&mut *conn)
            .await?;
        Ok(roles)
    }

    /// Names of the roles `user_id` belongs to, ordered by name
    pub async fn get_roles(conn: &mut SqliteConnection, user_id: &str) -> Result<Vec<String>> {
        let names = sqlx::query_scalar(
            r#"
            SELECT r.name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = ?
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(names)
    }

    pub async fn add_to_role(conn: &mut SqliteConnection, user_id: &str, role_name: &str) -> Result<()> {
        let role_id = Self::role_id(conn, role_name).await?;
        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(&role_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Fails with [`Error::Concurrency`] when the membership is already gone
    pub async fn remove_from_role(
        conn: &mut SqliteConnection,
        user_id: &str,
        role_name: &str,
    ) -> Result<()> {
        let role_id = Self::role_id(conn, role_name).await?;
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_id = ?")
            .bind(user_id)
            .bind(&role_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Concurrency(format!(
                "user {} is no longer in role {}",
                user_id, role_name
            )));
        }
        Ok(())
    }

    async fn role_id(conn: &mut SqliteConnection, role_name: &str) -> Result<String> {
        sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
            .bind(role_name)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Role not found: {}", role_name)))
    }
}

/// Transactional link store over one user's role memberships
///
/// Keyed by user id (parent) and role name (related).
pub struct UserRoleLinks {
    tx: Transaction<'static, Sqlite>,
}

impl UserRoleLinks {
    pub async fn begin(pool: &SqlitePool) -> Result<Self> {
        Ok(Self {
            tx: pool.begin().await?,
        })
    }

    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }
}

#[async_trait]
impl LinkStore for UserRoleLinks {
    type ParentKey = String;
    type RelatedKey = String;

    async fn list_links(&mut self, user_id: &String) -> Result<BTreeSet<String>> {
        Ok(UserManager::get_roles(&mut self.tx, user_id)
            .await?
            .into_iter()
            .collect())
    }

    async fn add_link(&mut self, user_id: &String, role_name: &String) -> Result<()> {
        UserManager::add_to_role(&mut self.tx, user_id, role_name).await
    }

    async fn remove_link(&mut self, user_id: &String, role_name: &String) -> Result<()> {
        UserManager::remove_from_role(&mut self.tx, user_id, role_name).await
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
