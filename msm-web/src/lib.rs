//! msm-web library - music school HTTP service
//!
//! JSON endpoints for instruments, musicians, songs, performances and user
//! role administration. Many-to-many edits (instrument players, user roles)
//! go through [`msm_common::Reconciler`].

use axum::Router;
use msm_common::Reconciler;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;

pub use error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Association reconciler configured with the empty-selection policy
    pub reconciler: Reconciler,
    /// Page size used when a request does not pick a valid one
    pub default_page_size: i64,
}

impl AppState {
    pub fn new(db: SqlitePool, reconciler: Reconciler, default_page_size: i64) -> Self {
        Self {
            db,
            reconciler,
            default_page_size,
        }
    }
}

/// Build application router
///
/// Every route except `/health` resolves the caller from the `X-User` header.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::instrument_routes())
        .merge(api::musician_routes())
        .merge(api::song_routes())
        .merge(api::performance_routes())
        .merge(api::user_role_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
