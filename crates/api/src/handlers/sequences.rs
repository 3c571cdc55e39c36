//! Handlers for the `/sequences` resource.

use agency_core::capability::Capability;
use agency_core::sequence::{NewSequence, Sequence, SequenceStatus};
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
pub struct UpdateSequenceStatusRequest {
    pub status: SequenceStatus,
}

/// GET /api/v1/sequences
pub async fn list(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Sequence>>>> {
    user.require(Capability::ViewWorkflows)?;
    let sequences = state.engine.list_sequences().await?;
    Ok(Json(DataResponse::new(sequences)))
}

/// POST /api/v1/sequences
pub async fn create(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<NewSequence>,
) -> AppResult<(StatusCode, Json<DataResponse<Sequence>>)> {
    let sequence = state.engine.create_sequence(&user.actor(), input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(sequence))))
}

/// GET /api/v1/sequences/{id}
pub async fn get_by_id(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Sequence>>> {
    user.require(Capability::ViewWorkflows)?;
    let sequence = state.engine.get_sequence(id).await?;
    Ok(Json(DataResponse::new(sequence)))
}

/// PUT /api/v1/sequences/{id}/status
///
/// Approving requires `approve_sequences`; other review moves need
/// `manage_sequences`.
pub async fn update_status(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateSequenceStatusRequest>,
) -> AppResult<Json<DataResponse<Sequence>>> {
    let sequence = state
        .engine
        .update_sequence_status(&user.actor(), id, input.status)
        .await?;
    Ok(Json(DataResponse::new(sequence)))
}
