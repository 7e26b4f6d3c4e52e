//! HTTP API handlers for msm-web

pub mod auth;
pub mod health;
pub mod instruments;
pub mod musicians;
pub mod performances;
pub mod songs;
pub mod user_roles;

pub use health::health_routes;
pub use instruments::instrument_routes;
pub use musicians::musician_routes;
pub use performances::performance_routes;
pub use songs::song_routes;
pub use user_roles::user_role_routes;

use msm_common::pagination::{resolve_page_size, PageRequest};
use serde::Serialize;

use crate::AppState;

/// One entry of a select list, checkbox group or dual listbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListOption {
    /// Form value submitted back in `selected_options`
    pub value: String,
    pub text: String,
}

impl ListOption {
    pub fn new(value: impl ToString, text: impl Into<String>) -> Self {
        Self {
            value: value.to_string(),
            text: text.into(),
        }
    }
}

/// Requested page and effective page size
pub(crate) fn page_params(state: &AppState, request: &PageRequest) -> (i64, i64) {
    (
        request.page.unwrap_or(1),
        resolve_page_size(request.page_size, state.default_page_size),
    )
}
