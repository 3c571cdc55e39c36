//! Capacity ledger: weekly hour budgets and concurrent-project slots.
//!
//! Pure arithmetic over [`Employee`] records. Stores apply the same deltas
//! inside their own transactions; the in-memory store calls these functions
//! directly.

use serde::{Deserialize, Serialize};

use crate::employee::{Employee, EmployeeStatus};
use crate::types::{DbId, Hours};

/// Hours left in the employee's weekly budget. Negative when overcommitted.
pub fn available_hours(employee: &Employee) -> Hours {
    employee.weekly_capacity - employee.current_workload
}

/// Whether the employee can take on one more concurrent project.
pub fn has_project_slot(employee: &Employee) -> bool {
    employee.current_project_count < employee.max_concurrent_projects
}

/// Whether the employee may receive new work at all.
pub fn is_eligible(employee: &Employee) -> bool {
    employee.available_for_work && employee.status == EmployeeStatus::Active && has_project_slot(employee)
}

/// Whether the employee may receive more work on a workflow they are already
/// staffed on. Such work does not consume a new project slot.
pub fn is_eligible_on_workflow(employee: &Employee, already_on_workflow: bool) -> bool {
    employee.available_for_work
        && employee.status == EmployeeStatus::Active
        && (already_on_workflow || has_project_slot(employee))
}

/// Hours and (optionally) a project slot claimed for one task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub employee_id: DbId,
    pub hours: Hours,
    /// True when this is the employee's first active item on the workflow.
    pub opens_project: bool,
}

/// The inverse of a [`Reservation`], applied on task completion or cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub employee_id: DbId,
    pub hours: Hours,
    /// True when the employee has no open work left on the workflow.
    pub closes_project: bool,
}

pub fn apply_reservation(employee: &mut Employee, reservation: &Reservation) {
    employee.current_workload += reservation.hours.max(0.0);
    if reservation.opens_project {
        employee.current_project_count += 1;
    }
}

/// Apply a release, flooring both counters at zero.
pub fn apply_release(employee: &mut Employee, release: &Release) {
    employee.current_workload = (employee.current_workload - release.hours.max(0.0)).max(0.0);
    if release.closes_project {
        employee.current_project_count = (employee.current_project_count - 1).max(0);
    }
}
