//! Musician endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use msm_common::db::musicians::{self, Musician, MusicianDraft};
use msm_common::db::plays;
use msm_common::pagination::{PageRequest, PaginatedList};
use serde::Serialize;
use tracing::{info, warn};

use super::auth::{require, CurrentUser, ADMIN_ROLES, ANY_USER, STAFF_ROLES};
use super::page_params;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct MusicianView {
    #[serde(flatten)]
    pub musician: Musician,
    pub formal_name: String,
    pub summary: String,
}

impl From<Musician> for MusicianView {
    fn from(musician: Musician) -> Self {
        Self {
            formal_name: musician.formal_name(),
            summary: musician.summary(),
            musician,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MusicianDetails {
    #[serde(flatten)]
    pub musician: MusicianView,
    /// Names of the instruments the musician plays
    pub instruments: Vec<String>,
}

pub fn musician_routes() -> Router<AppState> {
    Router::new()
        .route("/api/musicians", get(index).post(create))
        .route("/api/musicians/:id", get(details).put(edit).delete(delete))
}

/// GET /api/musicians
pub async fn index(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(request): Query<PageRequest>,
) -> ApiResult<Json<PaginatedList<MusicianView>>> {
    require(&principal, &ANY_USER)?;

    let (page, page_size) = page_params(&state, &request);
    let musicians = musicians::list_page(&state.db, page, page_size).await?;
    Ok(Json(musicians.map(MusicianView::from)))
}

/// GET /api/musicians/:id
pub async fn details(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<MusicianDetails>> {
    require(&principal, &ANY_USER)?;

    let musician = musicians::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Musician {} not found", id)))?;
    let instruments = plays::instruments_of(&state.db, id)
        .await?
        .into_iter()
        .map(|i| i.name)
        .collect();

    Ok(Json(MusicianDetails {
        musician: musician.into(),
        instruments,
    }))
}

/// POST /api/musicians
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(draft): Json<MusicianDraft>,
) -> ApiResult<(StatusCode, Json<MusicianView>)> {
    require(&principal, &STAFF_ROLES)?;

    let draft = draft.normalized()?;
    let id = musicians::insert(&state.db, &draft).await?;
    info!(user = %principal.user_name, musician_id = id, "Created musician");

    let musician = musicians::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Musician {} not found", id)))?;
    Ok((StatusCode::CREATED, Json(musician.into())))
}

/// PUT /api/musicians/:id
pub async fn edit(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
    Json(draft): Json<MusicianDraft>,
) -> ApiResult<Json<MusicianView>> {
    require(&principal, &STAFF_ROLES)?;

    let draft = draft.normalized()?;
    if !musicians::update(&state.db, id, &draft).await? {
        return Err(ApiError::NotFound(format!("Musician {} not found", id)));
    }
    info!(user = %principal.user_name, musician_id = id, "Updated musician");

    let musician = musicians::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Musician {} not found", id)))?;
    Ok(Json(musician.into()))
}

/// DELETE /api/musicians/:id
///
/// Plays go with the musician; recorded performances block the delete.
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    require(&principal, &ADMIN_ROLES)?;

    match musicians::delete(&state.db, id).await {
        Ok(true) => {
            info!(user = %principal.user_name, musician_id = id, "Deleted musician");
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(ApiError::NotFound(format!("Musician {} not found", id))),
        Err(e) if e.is_foreign_key_violation() => {
            warn!(musician_id = id, "Refused to delete musician with performances");
            Err(ApiError::conflict(
                "Unable to Delete Musician. Remember, you cannot delete a Musician that has performances.",
            ))
        }
        Err(e) => Err(e.into()),
    }
}
