//! Caller identity and role gates
//!
//! The caller is named by the `X-User` header, set by the trusted front end,
//! and resolved against the users table on every request. Handlers then check
//! a [`Capability`] before touching any repository.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use msm_common::capability::{Authenticated, Capability};
use msm_common::db::UserManager;
use msm_common::{Principal, Role};
use tracing::warn;

use crate::{ApiError, ApiResult, AppState};

/// Header carrying the caller's user name
pub const USER_HEADER: &str = "x-user";

/// Roles that manage school records
pub const STAFF_ROLES: [Role; 3] = [Role::Admin, Role::Supervisor, Role::Staff];

/// Roles that manage performances
pub const SUPERVISOR_ROLES: [Role; 2] = [Role::Admin, Role::Supervisor];

pub const ADMIN_ROLES: [Role; 1] = [Role::Admin];

pub const SECURITY_ROLES: [Role; 1] = [Role::Security];

/// Any caller that resolved to a user
pub const ANY_USER: Authenticated = Authenticated;

/// The resolved caller of the current request
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_name = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Missing X-User header".to_string()))?;

        let mut conn = state
            .db
            .acquire()
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        let user = UserManager::find_by_name(&mut conn, user_name)
            .await?
            .ok_or_else(|| {
                warn!("Request from unknown user '{}'", user_name);
                ApiError::Unauthorized(format!("Unknown user: {}", user_name))
            })?;
        let roles = UserManager::get_roles(&mut conn, &user.id).await?;

        Ok(CurrentUser(Principal::new(user.id, user.user_name, &roles)))
    }
}

/// Deny with 403 unless `principal` holds `capability`
pub fn require<C: Capability + ?Sized>(principal: &Principal, capability: &C) -> ApiResult<()> {
    if principal.may(capability).is_allowed() {
        Ok(())
    } else {
        warn!(user = %principal.user_name, "Access denied");
        Err(ApiError::Forbidden(
            "You do not have permission to perform this action".to_string(),
        ))
    }
}
