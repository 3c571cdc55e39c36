use axum::routing::put;
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// PUT    /{id}/status     -> update_status
/// PUT    /{id}/assignee   -> reassign
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/status", put(tasks::update_status))
        .route("/{id}/assignee", put(tasks::reassign))
}
