use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::{sequence_assignments, sequences};
use crate::state::AppState;

/// Routes mounted at `/sequences`.
///
/// ```text
/// GET    /               -> list
/// POST   /               -> create
/// GET    /{id}           -> get_by_id
/// PUT    /{id}/status    -> update_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(sequences::list).post(sequences::create))
        .route("/{id}", get(sequences::get_by_id))
        .route("/{id}/status", put(sequences::update_status))
}

/// Routes mounted at `/sequence-assignments`.
///
/// ```text
/// POST   /                   -> create
/// GET    /{id}               -> get_by_id
/// PUT    /{id}/status        -> update_status
/// POST   /{id}/advance       -> advance
/// GET    /{id}/activities    -> list_activities
/// ```
pub fn assignment_router() -> Router<AppState> {
    Router::new()
        .route("/", post(sequence_assignments::create))
        .route("/{id}", get(sequence_assignments::get_by_id))
        .route("/{id}/status", put(sequence_assignments::update_status))
        .route("/{id}/advance", post(sequence_assignments::advance))
        .route("/{id}/activities", get(sequence_assignments::list_activities))
}
