//! Performance endpoints and the fee report

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use msm_common::db::performances::{self, PerformanceDetail, PerformanceDraft};
use msm_common::db::reports::{self, PerformanceReport};
use msm_common::db::{instruments, musicians, songs};
use msm_common::pagination::{PageRequest, PaginatedList};
use serde::Serialize;
use tracing::info;

use super::auth::{require, CurrentUser, STAFF_ROLES, SUPERVISOR_ROLES};
use super::{page_params, ListOption};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct PerformanceView {
    #[serde(flatten)]
    pub detail: PerformanceDetail,
    pub musician_summary: String,
}

impl From<PerformanceDetail> for PerformanceView {
    fn from(detail: PerformanceDetail) -> Self {
        Self {
            musician_summary: detail.musician_summary(),
            detail,
        }
    }
}

/// Select lists for the create/edit form
#[derive(Debug, Serialize)]
pub struct PerformanceOptions {
    /// By instrument name
    pub instruments: Vec<ListOption>,
    /// By musician first name
    pub musicians: Vec<ListOption>,
    /// By song title
    pub songs: Vec<ListOption>,
}

#[derive(Debug, Serialize)]
pub struct ReportRow {
    #[serde(flatten)]
    pub report: PerformanceReport,
    pub summary: String,
}

pub fn performance_routes() -> Router<AppState> {
    Router::new()
        .route("/api/performances", get(index).post(create))
        .route("/api/performances/options", get(options))
        .route("/api/performances/report", get(report))
        .route(
            "/api/performances/:id",
            get(details).put(edit).delete(delete),
        )
}

async fn find_performance(state: &AppState, id: i64) -> ApiResult<PerformanceView> {
    performances::find_detail(&state.db, id)
        .await?
        .map(PerformanceView::from)
        .ok_or_else(|| ApiError::NotFound(format!("Performance {} not found", id)))
}

/// GET /api/performances
pub async fn index(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> ApiResult<Json<Vec<PerformanceView>>> {
    require(&principal, &STAFF_ROLES)?;

    let rows = performances::list_details(&state.db).await?;
    Ok(Json(rows.into_iter().map(PerformanceView::from).collect()))
}

/// GET /api/performances/options
pub async fn options(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> ApiResult<Json<PerformanceOptions>> {
    require(&principal, &SUPERVISOR_ROLES)?;

    let instruments = instruments::list_all(&state.db)
        .await?
        .into_iter()
        .map(|i| ListOption::new(i.id, i.name))
        .collect();

    let mut musicians = musicians::list_all(&state.db).await?;
    musicians.sort_by(|a, b| a.first_name.cmp(&b.first_name).then(a.id.cmp(&b.id)));
    let musicians = musicians
        .into_iter()
        .map(|m| ListOption::new(m.id, m.first_name))
        .collect();

    let songs = songs::list_all(&state.db)
        .await?
        .into_iter()
        .map(|s| ListOption::new(s.id, s.title))
        .collect();

    Ok(Json(PerformanceOptions {
        instruments,
        musicians,
        songs,
    }))
}

/// GET /api/performances/report
pub async fn report(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(request): Query<PageRequest>,
) -> ApiResult<Json<PaginatedList<ReportRow>>> {
    require(&principal, &STAFF_ROLES)?;

    let (page, page_size) = page_params(&state, &request);
    let report = reports::report_page(&state.db, page, page_size).await?;
    Ok(Json(report.map(|report| ReportRow {
        summary: report.summary(),
        report,
    })))
}

/// GET /api/performances/:id
pub async fn details(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<PerformanceView>> {
    require(&principal, &SUPERVISOR_ROLES)?;
    Ok(Json(find_performance(&state, id).await?))
}

/// POST /api/performances
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(draft): Json<PerformanceDraft>,
) -> ApiResult<(StatusCode, Json<PerformanceView>)> {
    require(&principal, &SUPERVISOR_ROLES)?;

    let draft = draft.normalized()?;
    let id = performances::insert(&state.db, &draft).await?;
    info!(user = %principal.user_name, performance_id = id, "Created performance");

    Ok((StatusCode::CREATED, Json(find_performance(&state, id).await?)))
}

/// PUT /api/performances/:id
pub async fn edit(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
    Json(draft): Json<PerformanceDraft>,
) -> ApiResult<Json<PerformanceView>> {
    require(&principal, &SUPERVISOR_ROLES)?;

    let draft = draft.normalized()?;
    if !performances::update(&state.db, id, &draft).await? {
        return Err(ApiError::NotFound(format!("Performance {} not found", id)));
    }
    info!(user = %principal.user_name, performance_id = id, "Updated performance");

    Ok(Json(find_performance(&state, id).await?))
}

/// DELETE /api/performances/:id
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    require(&principal, &SUPERVISOR_ROLES)?;

    if !performances::delete(&state.db, id).await? {
        return Err(ApiError::NotFound(format!("Performance {} not found", id)));
    }
    info!(user = %principal.user_name, performance_id = id, "Deleted performance");
    Ok(StatusCode::NO_CONTENT)
}
