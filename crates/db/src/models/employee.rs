use agency_core::employee::{Employee, EmployeeStatus};
use agency_core::repository::StoreError;
use agency_core::types::{DbId, Timestamp};
use sqlx::FromRow;

use super::corrupt_row;

/// A row from the `employees` table.
#[derive(Debug, Clone, FromRow)]
pub struct EmployeeRow {
    pub id: DbId,
    pub user_id: DbId,
    pub employee_role: String,
    pub department: Option<String>,
    pub weekly_capacity: f64,
    pub current_workload: f64,
    pub current_project_count: i32,
    pub max_concurrent_projects: i32,
    pub available_for_work: bool,
    pub skill_set: Vec<String>,
    pub status: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<EmployeeRow> for Employee {
    type Error = StoreError;

    fn try_from(row: EmployeeRow) -> Result<Self, Self::Error> {
        Ok(Employee {
            id: row.id,
            user_id: row.user_id,
            employee_role: row.employee_role,
            department: row.department,
            weekly_capacity: row.weekly_capacity,
            current_workload: row.current_workload,
            current_project_count: row.current_project_count,
            max_concurrent_projects: row.max_concurrent_projects,
            available_for_work: row.available_for_work,
            skill_set: row.skill_set.into_iter().collect(),
            status: EmployeeStatus::parse(&row.status).map_err(|e| corrupt_row("employees", e))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
