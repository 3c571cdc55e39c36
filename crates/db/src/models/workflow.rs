//! Workflow instance, task and team-assignment rows.

use agency_core::repository::StoreError;
use agency_core::types::{DbId, Timestamp};
use agency_core::workflow::{
    TaskStatus, TeamAssignment, TeamAssignmentStatus, WorkflowInstance, WorkflowStatus,
    WorkflowTask,
};
use sqlx::FromRow;

use super::corrupt_row;

/// A row from the `workflow_instances` table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowRow {
    pub id: DbId,
    pub user_id: DbId,
    pub template_id: Option<DbId>,
    pub service_name: String,
    pub service_tier: String,
    pub service_amount_cents: i64,
    pub status: String,
    pub progress: i16,
    pub team_assigned: bool,
    pub assignment_started_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub expected_completion_date: Option<Timestamp>,
    pub internal_notes: Option<String>,
    pub client_notes: Option<String>,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<WorkflowRow> for WorkflowInstance {
    type Error = StoreError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        Ok(WorkflowInstance {
            id: row.id,
            user_id: row.user_id,
            template_id: row.template_id,
            service_name: row.service_name,
            service_tier: row.service_tier,
            service_amount_cents: row.service_amount_cents,
            status: WorkflowStatus::parse(&row.status)
                .map_err(|e| corrupt_row("workflow_instances", e))?,
            progress: row.progress,
            team_assigned: row.team_assigned,
            assignment_started_at: row.assignment_started_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            expected_completion_date: row.expected_completion_date,
            internal_notes: row.internal_notes,
            client_notes: row.client_notes,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `workflow_tasks` table. `sort_order` carries the task's
/// template order; `dependencies` is a `BIGINT[]` of sibling task ids.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: DbId,
    pub workflow_id: DbId,
    pub title: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub estimated_hours: f64,
    pub actual_hours: Option<f64>,
    pub required_skills: Vec<String>,
    pub dependencies: Vec<DbId>,
    pub status: String,
    pub assigned_to_id: Option<DbId>,
    pub blocked_reason: Option<String>,
    pub completed_work: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub visible_to_client: bool,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<TaskRow> for WorkflowTask {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(WorkflowTask {
            id: row.id,
            workflow_id: row.workflow_id,
            title: row.title,
            description: row.description,
            order: row.sort_order,
            estimated_hours: row.estimated_hours,
            actual_hours: row.actual_hours,
            required_skills: row.required_skills.into_iter().collect(),
            dependencies: row.dependencies.into_iter().collect(),
            status: TaskStatus::parse(&row.status).map_err(|e| corrupt_row("workflow_tasks", e))?,
            assigned_to_id: row.assigned_to_id,
            blocked_reason: row.blocked_reason,
            completed_work: row.completed_work,
            started_at: row.started_at,
            completed_at: row.completed_at,
            visible_to_client: row.visible_to_client,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `team_assignments` table.
#[derive(Debug, Clone, FromRow)]
pub struct TeamAssignmentRow {
    pub id: DbId,
    pub employee_id: DbId,
    pub workflow_id: DbId,
    pub status: String,
    pub assigned_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl TryFrom<TeamAssignmentRow> for TeamAssignment {
    type Error = StoreError;

    fn try_from(row: TeamAssignmentRow) -> Result<Self, Self::Error> {
        Ok(TeamAssignment {
            id: row.id,
            employee_id: row.employee_id,
            workflow_id: row.workflow_id,
            status: TeamAssignmentStatus::parse(&row.status)
                .map_err(|e| corrupt_row("team_assignments", e))?,
            assigned_at: row.assigned_at,
            completed_at: row.completed_at,
        })
    }
}
