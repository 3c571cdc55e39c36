//! Handlers for the `/sequence-assignments` resource.

use agency_core::capability::Capability;
use agency_core::sequence::{
    CreateSequenceAssignment, SequenceActivity, SequenceAssignment, SequenceAssignmentStatus,
};
use agency_core::types::DbId;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateAssignmentStatusRequest {
    pub status: SequenceAssignmentStatus,
    pub notes: Option<String>,
}

/// POST /api/v1/sequence-assignments
///
/// 409 when the pair already has a pending or active assignment.
pub async fn create(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateSequenceAssignment>,
) -> AppResult<(StatusCode, Json<DataResponse<SequenceAssignment>>)> {
    let assignment = state
        .engine
        .create_sequence_assignment(&user.actor(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(assignment))))
}

/// GET /api/v1/sequence-assignments/{id}
pub async fn get_by_id(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<SequenceAssignment>>> {
    user.require(Capability::ViewWorkflows)?;
    let assignment = state.engine.get_sequence_assignment(id).await?;
    Ok(Json(DataResponse::new(assignment)))
}

/// PUT /api/v1/sequence-assignments/{id}/status
pub async fn update_status(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateAssignmentStatusRequest>,
) -> AppResult<Json<DataResponse<SequenceAssignment>>> {
    let assignment = state
        .engine
        .update_sequence_assignment_status(&user.actor(), id, input.status, input.notes)
        .await?;
    Ok(Json(DataResponse::new(assignment)))
}

/// POST /api/v1/sequence-assignments/{id}/advance
///
/// Executes the current step; the last step completes the assignment.
pub async fn advance(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<SequenceAssignment>>> {
    let assignment = state
        .engine
        .advance_sequence_assignment(&user.actor(), id)
        .await?;
    Ok(Json(DataResponse::new(assignment)))
}

/// GET /api/v1/sequence-assignments/{id}/activities
pub async fn list_activities(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<SequenceActivity>>>> {
    user.require(Capability::ViewWorkflows)?;
    let activities = state.engine.list_sequence_activities(id).await?;
    Ok(Json(DataResponse::new(activities)))
}
