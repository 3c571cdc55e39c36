use axum::routing::{get, put};
use axum::Router;

use crate::handlers::templates;
use crate::state::AppState;

/// Routes mounted at `/templates`.
///
/// ```text
/// PUT    /                        -> register
/// GET    /{service_type}/{tier}   -> get_or_create
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", put(templates::register))
        .route("/{service_type}/{tier}", get(templates::get_or_create))
}
