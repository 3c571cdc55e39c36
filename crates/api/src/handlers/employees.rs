//! Handlers for the `/employees` resource.

use agency_core::capability::Capability;
use agency_core::employee::{CreateEmployee, Employee, UpdateEmployee};
use agency_core::types::DbId;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::query::ActiveFilter;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/employees
///
/// With `?active=true` only employees whose status is `active`.
pub async fn list(
    user: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<ActiveFilter>,
) -> AppResult<Json<DataResponse<Vec<Employee>>>> {
    user.require(Capability::ViewWorkflows)?;
    let employees = if filter.active {
        state.engine.list_active_employees().await?
    } else {
        state.engine.list_employees().await?
    };
    Ok(Json(DataResponse::new(employees)))
}

/// POST /api/v1/employees
pub async fn create(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateEmployee>,
) -> AppResult<(StatusCode, Json<DataResponse<Employee>>)> {
    let employee = state.engine.create_employee(&user.actor(), input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(employee))))
}

/// GET /api/v1/employees/{id}
pub async fn get_by_id(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Employee>>> {
    user.require(Capability::ViewWorkflows)?;
    let employee = state.engine.get_employee(id).await?;
    Ok(Json(DataResponse::new(employee)))
}

/// PUT /api/v1/employees/{id}
pub async fn update(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateEmployee>,
) -> AppResult<Json<DataResponse<Employee>>> {
    let employee = state.engine.update_employee(&user.actor(), id, input).await?;
    Ok(Json(DataResponse::new(employee)))
}
