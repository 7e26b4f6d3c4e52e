//! Instrument endpoints
//!
//! The create and edit forms carry a dual listbox of musicians. The
//! submitted `selected_options` are reconciled against the instrument's
//! `plays` rows in the same transaction as the instrument row itself.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use msm_common::db::instruments::{self, Instrument, InstrumentDraft};
use msm_common::db::musicians::{self, Musician};
use msm_common::db::plays::{self, PlayLinks};
use msm_common::pagination::{PageRequest, PaginatedList};
use msm_common::reconcile::{parse_selection, partition};
use msm_common::{Error, IntegrityKind, LinkStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

use super::auth::{require, CurrentUser, ADMIN_ROLES, ANY_USER, STAFF_ROLES};
use super::{page_params, ListOption};
use crate::{ApiError, ApiResult, AppState};

const DELETE_IN_USE_MESSAGE: &str = "Unable to Delete Instrument. Remember, you cannot delete a Instrument that is played by any Musician.";

const SAVE_FAILED_MESSAGE: &str = "Unable to save changes.";

/// Instrument with the musicians who play it
#[derive(Debug, Serialize)]
pub struct InstrumentView {
    pub id: i64,
    pub name: String,
    /// Player summaries, ordered by last name then first name
    pub players: Vec<String>,
}

impl InstrumentView {
    fn new(instrument: Instrument, players: &[Musician]) -> Self {
        Self {
            id: instrument.id,
            name: instrument.name,
            players: players.iter().map(Musician::summary).collect(),
        }
    }
}

/// State of the create/edit form
#[derive(Debug, Serialize)]
pub struct InstrumentForm {
    pub id: Option<i64>,
    pub name: String,
    pub assigned: Vec<ListOption>,
    pub available: Vec<ListOption>,
}

impl InstrumentForm {
    fn new(id: Option<i64>, name: String, universe: &[Musician], assigned: &BTreeSet<i64>) -> Self {
        let split = partition(universe, assigned).map(|m| ListOption::new(m.id, m.formal_name()));
        Self {
            id,
            name,
            assigned: split.assigned,
            available: split.available,
        }
    }
}

/// Submitted create/edit form
#[derive(Debug, Deserialize)]
pub struct InstrumentInput {
    pub name: String,
    /// Musician ids chosen in the listbox; absent means nothing selected
    #[serde(default)]
    pub selected_options: Option<Vec<String>>,
}

pub fn instrument_routes() -> Router<AppState> {
    Router::new()
        .route("/api/instruments", get(index).post(create))
        .route("/api/instruments/new", get(create_form))
        .route(
            "/api/instruments/:id",
            get(details).put(edit).delete(delete),
        )
        .route("/api/instruments/:id/edit", get(edit_form))
}

/// GET /api/instruments
pub async fn index(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(request): Query<PageRequest>,
) -> ApiResult<Json<PaginatedList<InstrumentView>>> {
    require(&principal, &ANY_USER)?;

    let (page, page_size) = page_params(&state, &request);
    let instruments = instruments::list_page(&state.db, page, page_size).await?;
    let ids: Vec<i64> = instruments.items.iter().map(|i| i.id).collect();
    let players = plays::players_by_instrument(&state.db, &ids).await?;

    Ok(Json(instruments.map(|instrument| {
        let playing = players.get(&instrument.id).map(Vec::as_slice).unwrap_or(&[]);
        InstrumentView::new(instrument, playing)
    })))
}

/// GET /api/instruments/:id
pub async fn details(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<InstrumentView>> {
    require(&principal, &STAFF_ROLES)?;

    let instrument = find_instrument(&state, id).await?;
    let players = plays::players_of(&state.db, id).await?;
    Ok(Json(InstrumentView::new(instrument, &players)))
}

/// GET /api/instruments/new
pub async fn create_form(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> ApiResult<Json<InstrumentForm>> {
    require(&principal, &STAFF_ROLES)?;

    let universe = musicians::list_all(&state.db).await?;
    Ok(Json(InstrumentForm::new(
        None,
        String::new(),
        &universe,
        &BTreeSet::new(),
    )))
}

/// POST /api/instruments
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(input): Json<InstrumentInput>,
) -> ApiResult<(StatusCode, Json<InstrumentView>)> {
    require(&principal, &STAFF_ROLES)?;

    let (draft, selected) = read_input(input)?;
    let id = match save_instrument(&state, None, &draft, selected.as_ref()).await {
        Ok(id) => id,
        Err(e) => return Err(save_failed(&state, None, &draft, selected.as_ref(), e).await),
    };

    info!(user = %principal.user_name, instrument_id = id, "Created instrument '{}'", draft.name);
    let instrument = find_instrument(&state, id).await?;
    let players = plays::players_of(&state.db, id).await?;
    Ok((StatusCode::CREATED, Json(InstrumentView::new(instrument, &players))))
}

/// GET /api/instruments/:id/edit
pub async fn edit_form(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<InstrumentForm>> {
    require(&principal, &STAFF_ROLES)?;

    let instrument = find_instrument(&state, id).await?;
    let universe = musicians::list_all(&state.db).await?;
    let current: BTreeSet<i64> = plays::players_of(&state.db, id)
        .await?
        .iter()
        .map(|m| m.id)
        .collect();

    Ok(Json(InstrumentForm::new(
        Some(id),
        instrument.name,
        &universe,
        &current,
    )))
}

/// PUT /api/instruments/:id
pub async fn edit(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<InstrumentInput>,
) -> ApiResult<Json<InstrumentView>> {
    require(&principal, &STAFF_ROLES)?;

    let (draft, selected) = read_input(input)?;
    if let Err(e) = save_instrument(&state, Some(id), &draft, selected.as_ref()).await {
        return Err(save_failed(&state, Some(id), &draft, selected.as_ref(), e).await);
    }

    info!(user = %principal.user_name, instrument_id = id, "Updated instrument '{}'", draft.name);
    let instrument = find_instrument(&state, id).await?;
    let players = plays::players_of(&state.db, id).await?;
    Ok(Json(InstrumentView::new(instrument, &players)))
}

/// DELETE /api/instruments/:id
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    require(&principal, &ADMIN_ROLES)?;

    match instruments::delete(&state.db, id).await {
        Ok(true) => {
            info!(user = %principal.user_name, instrument_id = id, "Deleted instrument");
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(ApiError::NotFound(format!("Instrument {} not found", id))),
        Err(e) if e.is_foreign_key_violation() => {
            warn!(instrument_id = id, "Refused to delete instrument in use: {}", e);
            Err(ApiError::conflict(DELETE_IN_USE_MESSAGE))
        }
        Err(e) => Err(e.into()),
    }
}

async fn find_instrument(state: &AppState, id: i64) -> ApiResult<Instrument> {
    instruments::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Instrument {} not found", id)))
}

fn read_input(input: InstrumentInput) -> ApiResult<(InstrumentDraft, Option<BTreeSet<i64>>)> {
    let selected = parse_selection::<i64>(input.selected_options.as_deref());
    let draft = InstrumentDraft { name: input.name }.normalized()?;
    Ok((draft, selected))
}

/// Write the instrument row and reconcile its players in one transaction
///
/// The musician universe is read inside the transaction so the plan and the
/// writes see the same rows.
async fn save_instrument(
    state: &AppState,
    id: Option<i64>,
    draft: &InstrumentDraft,
    selected: Option<&BTreeSet<i64>>,
) -> msm_common::Result<i64> {
    let mut links = PlayLinks::begin(&state.db).await?;
    let universe = musicians::list_all(links.conn()).await?;

    let id = match id {
        Some(id) => {
            if !instruments::update(links.conn(), id, draft).await? {
                return Err(Error::NotFound(format!("Instrument {} not found", id)));
            }
            id
        }
        None => instruments::insert(links.conn(), draft).await?,
    };

    let delta = state
        .reconciler
        .reconcile(&mut links, &id, &universe, selected)
        .await?;
    links.commit().await?;

    info!(
        instrument_id = id,
        added = delta.adds.len(),
        removed = delta.removes.len(),
        "Saved instrument players"
    );
    Ok(id)
}

/// Unique violation on the instrument name, as opposed to a duplicate `plays` pair
fn is_duplicate_name(err: &Error) -> bool {
    match err {
        Error::Integrity {
            kind: IntegrityKind::Unique,
            message,
        } => message.contains("instruments.name"),
        _ => false,
    }
}

/// Turn a failed save into a response, redisplaying the attempted form when
/// the failure is recoverable
///
/// A vanished instrument is 404 whatever the cause. Constraint failures are
/// recoverable; a concurrent change to the player rows is not.
/// Runs after the transaction was dropped, so it reads from the pool.
async fn save_failed(
    state: &AppState,
    id: Option<i64>,
    draft: &InstrumentDraft,
    selected: Option<&BTreeSet<i64>>,
    err: Error,
) -> ApiError {
    if let Some(id) = id {
        match instruments::exists(&state.db, id).await {
            Ok(false) => return ApiError::NotFound(format!("Instrument {} not found", id)),
            Ok(true) => {}
            Err(e) => return e.into(),
        }
    }

    let message = if is_duplicate_name(&err) {
        format!("An instrument named '{}' already exists", draft.name)
    } else if matches!(err, Error::Integrity { .. }) {
        SAVE_FAILED_MESSAGE.to_string()
    } else if matches!(err, Error::Concurrency(_)) {
        warn!(instrument_id = ?id, "Players changed during save: {}", err);
        return ApiError::Internal(err.to_string());
    } else {
        return err.into();
    };
    warn!(instrument_id = ?id, "Instrument save failed: {}", message);

    let universe = match musicians::list_all(&state.db).await {
        Ok(universe) => universe,
        Err(e) => return e.into(),
    };
    let attempted = selected.cloned().unwrap_or_default();
    let form = InstrumentForm::new(id, draft.name.clone(), &universe, &attempted);
    ApiError::conflict_with_form(message, &form)
}
