//! Team assignment planner.
//!
//! Given a workflow's tasks and a snapshot of the employee pool, produce one
//! assignee per task. The planner is pure and deterministic: it simulates
//! every reservation on a private copy of the pool so later tasks see the
//! load placed by earlier ones, and the caller persists the resulting
//! reservations one by one.
//!
//! Selection per task, in dependency order:
//!
//! 1. Eligible employees: available, active, with a project slot (or already
//!    on this workflow), and sharing at least one required skill.
//! 2. Prefer candidates whose spare hours cover the estimate.
//! 3. If none do, overcommit the best-ranked candidate and record a
//!    [`CapacityWarning`].
//! 4. If nobody is eligible, leave the task pending and record the gap.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::capacity::{self, Reservation};
use crate::employee::Employee;
use crate::error::CoreError;
use crate::skills::{self, Candidate};
use crate::template::dependency_order;
use crate::types::{DbId, Hours};
use crate::workflow::{TaskStatus, WorkflowTask};

/// One employee as seen by the planner.
#[derive(Debug, Clone)]
pub struct PoolMember {
    pub employee: Employee,
    /// Open tasks currently assigned to the employee across all workflows.
    pub open_task_count: i64,
    /// Whether the employee already holds an active team assignment on the
    /// workflow being planned.
    pub on_workflow: bool,
}

/// A new task -> employee binding chosen by the planner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedAssignment {
    pub task_id: DbId,
    pub employee_id: DbId,
    pub score: f64,
    pub reservation: Reservation,
    pub overcommitted: bool,
}

/// Why a task could not be staffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    /// Nobody in the pool is available, active, and has a free project slot.
    NoAvailableEmployee,
    /// Available employees exist but none hold any of the required skills.
    NoSkillMatch,
    /// The task is in progress or blocked with nobody on it. Only a
    /// reassignment can staff it now.
    StartedWithoutAssignee,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignedTask {
    pub task_id: DbId,
    pub reason: GapReason,
}

/// Soft violation: the chosen employee lacked the hours for the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityWarning {
    pub task_id: DbId,
    pub employee_id: DbId,
    pub available_hours: Hours,
    pub required_hours: Hours,
}

/// Output of a planning pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssignmentPlan {
    /// New bindings, in processing order.
    pub assignments: Vec<PlannedAssignment>,
    /// Tasks that already had an assignee and were skipped.
    pub existing: Vec<(DbId, DbId)>,
    pub unassigned: Vec<UnassignedTask>,
    pub warnings: Vec<CapacityWarning>,
}

impl AssignmentPlan {
    /// Full task -> employee mapping: existing bindings plus new ones, by task id.
    pub fn mapping(&self) -> BTreeMap<DbId, DbId> {
        self.existing
            .iter()
            .copied()
            .chain(self.assignments.iter().map(|a| (a.task_id, a.employee_id)))
            .collect()
    }
}

/// Plan assignments for every unstaffed task of a workflow.
///
/// Tasks with an assignee and completed tasks are skipped, which makes a
/// re-run after a partial failure resume where it stopped. Unassigned tasks
/// that are already in progress or blocked come back as gaps.
/// Fails only when the task dependencies form a cycle.
pub fn plan_assignments(
    tasks: &[WorkflowTask],
    pool: &[PoolMember],
) -> Result<AssignmentPlan, CoreError> {
    let nodes: Vec<(DbId, i32, Vec<DbId>)> = tasks
        .iter()
        .map(|t| (t.id, t.order, t.dependencies.iter().copied().collect()))
        .collect();
    let order = dependency_order(&nodes)?;
    let by_id: BTreeMap<DbId, &WorkflowTask> = tasks.iter().map(|t| (t.id, t)).collect();

    // Private ledger, keyed by id so iteration order is stable.
    let mut ledger: BTreeMap<DbId, PoolMember> = pool
        .iter()
        .map(|m| (m.employee.id, m.clone()))
        .collect();

    let mut plan = AssignmentPlan::default();

    for task_id in order {
        let task = by_id[&task_id];

        if let Some(employee_id) = task.assigned_to_id {
            plan.existing.push((task.id, employee_id));
            continue;
        }
        match task.status {
            TaskStatus::Pending => {}
            TaskStatus::InProgress | TaskStatus::Blocked => {
                plan.unassigned.push(UnassignedTask {
                    task_id: task.id,
                    reason: GapReason::StartedWithoutAssignee,
                });
                continue;
            }
            TaskStatus::Assigned | TaskStatus::Completed => continue,
        }

        match choose(task, &ledger) {
            Choice::Gap(reason) => plan.unassigned.push(UnassignedTask {
                task_id: task.id,
                reason,
            }),
            Choice::Pick { candidate, overcommit } => {
                let Some(member) = ledger.get_mut(&candidate.employee_id) else {
                    continue;
                };
                let reservation = Reservation {
                    employee_id: candidate.employee_id,
                    hours: task.estimated_hours,
                    opens_project: !member.on_workflow,
                };
                if overcommit {
                    plan.warnings.push(CapacityWarning {
                        task_id: task.id,
                        employee_id: candidate.employee_id,
                        available_hours: candidate.available_hours,
                        required_hours: task.estimated_hours,
                    });
                }
                capacity::apply_reservation(&mut member.employee, &reservation);
                member.on_workflow = true;
                member.open_task_count += 1;

                plan.assignments.push(PlannedAssignment {
                    task_id: task.id,
                    employee_id: candidate.employee_id,
                    score: candidate.score,
                    reservation,
                    overcommitted: overcommit,
                });
            }
        }
    }

    Ok(plan)
}

enum Choice {
    Pick { candidate: Candidate, overcommit: bool },
    Gap(GapReason),
}

fn choose(task: &WorkflowTask, ledger: &BTreeMap<DbId, PoolMember>) -> Choice {
    let available: Vec<&PoolMember> = ledger
        .values()
        .filter(|m| capacity::is_eligible_on_workflow(&m.employee, m.on_workflow))
        .collect();
    if available.is_empty() {
        return Choice::Gap(GapReason::NoAvailableEmployee);
    }

    let mut candidates: Vec<Candidate> = available
        .into_iter()
        .filter(|m| skills::is_skill_eligible(&m.employee.skill_set, &task.required_skills))
        .map(|m| Candidate {
            employee_id: m.employee.id,
            score: skills::match_score(&m.employee.skill_set, &task.required_skills),
            available_hours: capacity::available_hours(&m.employee),
            open_task_count: m.open_task_count,
        })
        .collect();
    if candidates.is_empty() {
        return Choice::Gap(GapReason::NoSkillMatch);
    }

    skills::rank_candidates(&mut candidates);
    if let Some(fit) = candidates
        .iter()
        .find(|c| c.available_hours >= task.estimated_hours)
    {
        return Choice::Pick {
            candidate: fit.clone(),
            overcommit: false,
        };
    }
    Choice::Pick {
        candidate: candidates.swap_remove(0),
        overcommit: true,
    }
}
