//! Handlers for workflow templates.

use agency_core::capability::Capability;
use agency_core::template::{NewWorkflowTemplate, WorkflowTemplate};
use axum::extract::{Path, State};
use axum::Json;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/templates/{service_type}/{tier}
///
/// Returns the stored template, seeding it from the default catalog on first
/// use. Unknown tiers are a validation error.
pub async fn get_or_create(
    user: AuthUser,
    State(state): State<AppState>,
    Path((service_type, tier)): Path<(String, String)>,
) -> AppResult<Json<DataResponse<WorkflowTemplate>>> {
    user.require(Capability::ViewWorkflows)?;
    let template = state
        .engine
        .get_or_create_template(&service_type, &tier)
        .await?;
    Ok(Json(DataResponse::new(template)))
}

/// PUT /api/v1/templates
pub async fn register(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<NewWorkflowTemplate>,
) -> AppResult<Json<DataResponse<WorkflowTemplate>>> {
    let template = state.engine.register_template(&user.actor(), input).await?;
    Ok(Json(DataResponse::new(template)))
}
