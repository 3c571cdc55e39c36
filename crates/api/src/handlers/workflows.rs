//! Handlers for the `/workflows` resource.

use agency_core::types::DbId;
use agency_core::workflow::{WorkflowDetail, WorkflowInstance, WorkflowListQuery, WorkflowStatus};
use agency_engine::workflows::{CreatedWorkflow, UpdateWorkflowNotes};
use agency_engine::{AssignTeamResult, CreateWorkflowRequest};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateWorkflowStatusRequest {
    pub status: WorkflowStatus,
}

/// GET /api/v1/workflows
///
/// Optional `?user_id=&status=&limit=&offset=`. Clients are always narrowed
/// to their own workflows.
pub async fn list(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<WorkflowListQuery>,
) -> AppResult<Json<DataResponse<Vec<WorkflowInstance>>>> {
    let workflows = state.engine.list_workflows(&user.actor(), query).await?;
    Ok(Json(DataResponse::new(workflows)))
}

/// POST /api/v1/workflows
///
/// Instantiates the template for `(service_type, service_tier)`. With
/// `auto_assign: true` the team is staffed in the same request.
pub async fn create(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateWorkflowRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<CreatedWorkflow>>)> {
    let created = state.engine.create_workflow(&user.actor(), input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(created))))
}

/// GET /api/v1/workflows/{id}
pub async fn get_by_id(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<WorkflowDetail>>> {
    let detail = state.engine.get_workflow(&user.actor(), id).await?;
    Ok(Json(DataResponse::new(detail)))
}

/// DELETE /api/v1/workflows/{id}
pub async fn delete(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    state.engine.delete_workflow(&user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/workflows/{id}/status
pub async fn update_status(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateWorkflowStatusRequest>,
) -> AppResult<Json<DataResponse<WorkflowInstance>>> {
    let workflow = state
        .engine
        .update_workflow_status(&user.actor(), id, input.status)
        .await?;
    Ok(Json(DataResponse::new(workflow)))
}

/// PUT /api/v1/workflows/{id}/notes
pub async fn update_notes(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateWorkflowNotes>,
) -> AppResult<Json<DataResponse<WorkflowInstance>>> {
    let workflow = state
        .engine
        .update_workflow_notes(&user.actor(), id, input)
        .await?;
    Ok(Json(DataResponse::new(workflow)))
}

/// POST /api/v1/workflows/{id}/assign-team
///
/// 409 when the workflow is already staffed or another run holds it.
/// Unstaffable tasks and overcommits come back in the body, not as errors.
pub async fn assign_team(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<AssignTeamResult>>> {
    let result = state.engine.assign_team(&user.actor(), id).await?;
    Ok(Json(DataResponse::new(result)))
}
