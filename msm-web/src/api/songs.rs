//! Song endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use msm_common::db::songs::{self, Song, SongDraft};
use msm_common::pagination::{PageRequest, PaginatedList};
use tracing::info;

use super::auth::{require, CurrentUser, ADMIN_ROLES, ANY_USER, STAFF_ROLES};
use super::page_params;
use crate::{ApiError, ApiResult, AppState};

pub fn song_routes() -> Router<AppState> {
    Router::new()
        .route("/api/songs", get(index).post(create))
        .route("/api/songs/:id", get(details).put(edit).delete(delete))
}

async fn find_song(state: &AppState, id: i64) -> ApiResult<Song> {
    songs::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Song {} not found", id)))
}

/// GET /api/songs
pub async fn index(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(request): Query<PageRequest>,
) -> ApiResult<Json<PaginatedList<Song>>> {
    require(&principal, &ANY_USER)?;

    let (page, page_size) = page_params(&state, &request);
    Ok(Json(songs::list_page(&state.db, page, page_size).await?))
}

/// GET /api/songs/:id
pub async fn details(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Song>> {
    require(&principal, &ANY_USER)?;
    Ok(Json(find_song(&state, id).await?))
}

/// POST /api/songs
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(draft): Json<SongDraft>,
) -> ApiResult<(StatusCode, Json<Song>)> {
    require(&principal, &STAFF_ROLES)?;

    let draft = draft.normalized()?;
    let id = songs::insert(&state.db, &draft).await?;
    info!(user = %principal.user_name, song_id = id, "Created song '{}'", draft.title);

    Ok((StatusCode::CREATED, Json(find_song(&state, id).await?)))
}

/// PUT /api/songs/:id
pub async fn edit(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
    Json(draft): Json<SongDraft>,
) -> ApiResult<Json<Song>> {
    require(&principal, &STAFF_ROLES)?;

    let draft = draft.normalized()?;
    if !songs::update(&state.db, id, &draft).await? {
        return Err(ApiError::NotFound(format!("Song {} not found", id)));
    }
    Ok(Json(find_song(&state, id).await?))
}

/// DELETE /api/songs/:id
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    require(&principal, &ADMIN_ROLES)?;

    match songs::delete(&state.db, id).await {
        Ok(true) => {
            info!(user = %principal.user_name, song_id = id, "Deleted song");
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(ApiError::NotFound(format!("Song {} not found", id))),
        Err(e) if e.is_foreign_key_violation() => Err(ApiError::conflict(
            "Unable to Delete Song. Remember, you cannot delete a Song that has performances.",
        )),
        Err(e) => Err(e.into()),
    }
}
