pub mod employees;
pub mod health;
pub mod sequences;
pub mod tasks;
pub mod templates;
pub mod workflows;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /employees              employee administration
/// /templates              workflow templates
/// /workflows              workflow instances and team assignment
/// /tasks                  task status and reassignment
/// /sequences              marketing sequences
/// /sequence-assignments   per-lead sequence runs
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/employees", employees::router())
        .nest("/templates", templates::router())
        .nest("/workflows", workflows::router())
        .nest("/tasks", tasks::router())
        .nest("/sequences", sequences::router())
        .nest("/sequence-assignments", sequences::assignment_router())
}
