//! Handlers for individual workflow tasks.

use agency_core::types::DbId;
use agency_core::workflow::{TaskStatus, TaskUpdateFields, WorkflowTask};
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: TaskStatus,
    #[serde(flatten)]
    pub fields: TaskUpdateFields,
}

#[derive(Debug, Deserialize)]
pub struct ReassignTaskRequest {
    pub employee_id: DbId,
}

/// PUT /api/v1/tasks/{id}/status
///
/// Body: `{ "status": "...", "blocked_reason"?, "completed_work"?, "actual_hours"? }`.
pub async fn update_status(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateTaskStatusRequest>,
) -> AppResult<Json<DataResponse<WorkflowTask>>> {
    let task = state
        .engine
        .update_task_status(&user.actor(), id, input.status, input.fields)
        .await?;
    Ok(Json(DataResponse::new(task)))
}

/// PUT /api/v1/tasks/{id}/assignee
pub async fn reassign(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ReassignTaskRequest>,
) -> AppResult<Json<DataResponse<WorkflowTask>>> {
    let task = state
        .engine
        .reassign_task(&user.actor(), id, input.employee_id)
        .await?;
    Ok(Json(DataResponse::new(task)))
}
