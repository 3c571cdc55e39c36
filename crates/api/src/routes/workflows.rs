use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::workflows;
use crate::state::AppState;

/// Routes mounted at `/workflows`.
///
/// ```text
/// GET    /                    -> list (?user_id=&status=&limit=&offset=)
/// POST   /                    -> create
/// GET    /{id}                -> get_by_id
/// DELETE /{id}                -> delete
/// PUT    /{id}/status         -> update_status
/// PUT    /{id}/notes          -> update_notes
/// POST   /{id}/assign-team    -> assign_team
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(workflows::list).post(workflows::create))
        .route(
            "/{id}",
            get(workflows::get_by_id).delete(workflows::delete),
        )
        .route("/{id}/status", put(workflows::update_status))
        .route("/{id}/notes", put(workflows::update_notes))
        .route("/{id}/assign-team", post(workflows::assign_team))
}
