//! User role administration
//!
//! Only callers holding `Security` reach these routes. Role edits submit the
//! names of every checked role and are reconciled through [`UserRoleLinks`].

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use msm_common::db::users::{RoleRecord, User};
use msm_common::db::{UserManager, UserRoleLinks};
use msm_common::reconcile::parse_selection;
use msm_common::{Error, LinkStore};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::BTreeSet;
use tracing::{info, warn};

use super::auth::{require, CurrentUser, SECURITY_ROLES};
use crate::{ApiError, ApiResult, AppState};

const SELF_EDIT_MESSAGE: &str = "You cannot change your own role assignments.";

const SAVE_FAILED_MESSAGE: &str = "Unable to save changes.";

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub user_name: String,
    pub roles: Vec<String>,
}

/// One checkbox of the role editor
#[derive(Debug, Serialize)]
pub struct RoleOption {
    pub role_id: String,
    pub role_name: String,
    pub assigned: bool,
}

#[derive(Debug, Serialize)]
pub struct UserRolesForm {
    pub id: String,
    pub user_name: String,
    pub roles: Vec<RoleOption>,
    /// False when the caller is looking at their own account
    pub can_submit: bool,
    pub message: Option<String>,
}

impl UserRolesForm {
    fn new(user: User, all_roles: Vec<RoleRecord>, assigned: &BTreeSet<String>, caller_id: &str) -> Self {
        let is_self = user.id == caller_id;
        Self {
            roles: all_roles
                .into_iter()
                .map(|role| RoleOption {
                    assigned: assigned.contains(&role.name),
                    role_id: role.id,
                    role_name: role.name,
                })
                .collect(),
            id: user.id,
            user_name: user.user_name,
            can_submit: !is_self,
            message: is_self.then(|| SELF_EDIT_MESSAGE.to_string()),
        }
    }
}

/// Submitted role editor
#[derive(Debug, Deserialize)]
pub struct UserRolesInput {
    /// Names of the checked roles; absent means none checked
    #[serde(default)]
    pub selected_roles: Option<Vec<String>>,
}

pub fn user_role_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(index))
        .route("/api/users/:id/roles", get(edit_form).put(edit))
}

/// GET /api/users
pub async fn index(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> ApiResult<Json<Vec<UserSummary>>> {
    require(&principal, &SECURITY_ROLES)?;

    let mut conn = acquire(&state).await?;
    let users = UserManager::list_users(&mut conn).await?;

    let mut summaries = Vec::with_capacity(users.len());
    for user in users {
        let roles = UserManager::get_roles(&mut conn, &user.id).await?;
        summaries.push(UserSummary {
            id: user.id,
            user_name: user.user_name,
            roles,
        });
    }
    Ok(Json(summaries))
}

/// GET /api/users/:id/roles
pub async fn edit_form(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<UserRolesForm>> {
    require(&principal, &SECURITY_ROLES)?;

    let mut conn = acquire(&state).await?;
    Ok(Json(load_form(&mut conn, &id, &principal.user_id).await?))
}

/// PUT /api/users/:id/roles
pub async fn edit(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(input): Json<UserRolesInput>,
) -> ApiResult<Json<UserRolesForm>> {
    require(&principal, &SECURITY_ROLES)?;

    if id == principal.user_id {
        warn!(user = %principal.user_name, "Refused self role edit");
        return Err(ApiError::Forbidden(SELF_EDIT_MESSAGE.to_string()));
    }

    let selected = parse_selection::<String>(input.selected_roles.as_deref());

    match save_roles(&state, &id, selected.as_ref()).await {
        Ok(()) => {
            info!(user = %principal.user_name, target_user = %id, "Updated role assignments");
            let mut conn = acquire(&state).await?;
            Ok(Json(load_form(&mut conn, &id, &principal.user_id).await?))
        }
        Err(Error::NotFound(msg)) => Err(ApiError::NotFound(msg)),
        Err(e) => {
            warn!(target_user = %id, "Role update failed: {}", e);
            let mut conn = acquire(&state).await?;
            let form = attempted_form(&mut conn, &id, &principal.user_id, selected.as_ref()).await?;
            Err(ApiError::conflict_with_form(SAVE_FAILED_MESSAGE, &form))
        }
    }
}

async fn acquire(state: &AppState) -> ApiResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
    state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn load_form(conn: &mut SqliteConnection, id: &str, caller_id: &str) -> ApiResult<UserRolesForm> {
    let user = UserManager::find_by_id(conn, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))?;
    let assigned: BTreeSet<String> = UserManager::get_roles(conn, &user.id)
        .await?
        .into_iter()
        .collect();
    let all_roles = UserManager::list_roles(conn).await?;
    Ok(UserRolesForm::new(user, all_roles, &assigned, caller_id))
}

/// Form showing the submitted roles instead of the stored ones
async fn attempted_form(
    conn: &mut SqliteConnection,
    id: &str,
    caller_id: &str,
    selected: Option<&BTreeSet<String>>,
) -> ApiResult<UserRolesForm> {
    let user = UserManager::find_by_id(conn, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))?;
    let all_roles = UserManager::list_roles(conn).await?;
    let attempted: BTreeSet<String> = match selected {
        Some(selected) => all_roles
            .iter()
            .filter(|role| selected.contains(&role.name))
            .map(|role| role.name.clone())
            .collect(),
        None => BTreeSet::new(),
    };
    Ok(UserRolesForm::new(user, all_roles, &attempted, caller_id))
}

/// Reconcile the target user's roles in one transaction
async fn save_roles(
    state: &AppState,
    id: &str,
    selected: Option<&BTreeSet<String>>,
) -> msm_common::Result<()> {
    let mut links = UserRoleLinks::begin(&state.db).await?;

    let user = UserManager::find_by_id(links.conn(), id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {} not found", id)))?;

    let universe = UserManager::list_roles(links.conn()).await?;
    let delta = state
        .reconciler
        .reconcile(&mut links, &user.id, &universe, selected)
        .await?;
    links.commit().await?;

    info!(
        target_user = %user.user_name,
        added = ?delta.adds,
        removed = ?delta.removes,
        "Reconciled user roles"
    );
    Ok(())
}
