//! Team assignment runs.
//!
//! A run takes the workflow's assignment lease, plans against a fresh
//! snapshot of the employee pool, and commits each binding together with its
//! capacity reservation. A stale workflow version re-plans from the store;
//! bindings committed by an earlier attempt are picked up as existing.

use std::collections::HashSet;
use std::sync::Mutex;

use agency_core::capability::Capability;
use agency_core::error::CoreError;
use agency_core::planner::{self, CapacityWarning, PoolMember, UnassignedTask};
use agency_core::repository::{LeaseOutcome, WorkflowCommit};
use agency_core::types::{DbId, Timestamp};
use agency_core::workflow::{self, TaskStatus, TaskUpdateFields, TeamAssignmentStatus};
use agency_events::{kinds, DomainEvent};
use chrono::Utc;
use serde::Serialize;

use crate::retry::{with_retry, Attempt};
use crate::{Actor, Engine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskAssignment {
    pub task_id: DbId,
    pub employee_id: DbId,
}

/// Outcome of a successful run. Gaps and overcommits are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignTeamResult {
    pub workflow_id: DbId,
    /// Every staffed task of the workflow, ordered by task id.
    pub assignments: Vec<TaskAssignment>,
    pub unassigned: Vec<UnassignedTask>,
    pub capacity_warnings: Vec<CapacityWarning>,
}

impl AssignTeamResult {
    pub fn employee_for(&self, task_id: DbId) -> Option<DbId> {
        self.assignments
            .iter()
            .find(|a| a.task_id == task_id)
            .map(|a| a.employee_id)
    }
}

impl Engine {
    /// Staff every pending task of a workflow.
    ///
    /// Fails with `AlreadyAssigned` once a run has completed on the workflow
    /// and with `Conflict` while another run holds the lease. A failed run
    /// keeps whatever it committed and can simply be retried.
    pub async fn assign_team(
        &self,
        actor: &Actor,
        workflow_id: DbId,
    ) -> Result<AssignTeamResult, CoreError> {
        actor.require(Capability::AssignTeams)?;

        let existing = self
            .stores
            .workflows
            .find_by_id(workflow_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "workflow",
                id: workflow_id,
            })?;
        if existing.team_assigned {
            return Err(CoreError::AlreadyAssigned { workflow_id });
        }
        if existing.status.is_terminal() {
            return Err(CoreError::invalid_transition(
                "workflow",
                existing.status,
                "team assignment",
            ));
        }

        let now = Utc::now();
        let lease = chrono::Duration::from_std(self.config.assignment_lease)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        match self
            .stores
            .workflows
            .acquire_assignment_lease(workflow_id, now, now - lease)
            .await?
        {
            LeaseOutcome::Acquired(_) => {}
            LeaseOutcome::AlreadyAssigned => {
                return Err(CoreError::AlreadyAssigned { workflow_id });
            }
            LeaseOutcome::Busy => {
                return Err(CoreError::Conflict(format!(
                    "A team assignment is already running for workflow {workflow_id}"
                )));
            }
        }

        let outcome = self.run_planner(workflow_id, now).await;
        let team_assigned = outcome.is_ok();
        if let Err(e) = self
            .stores
            .workflows
            .release_assignment_lease(workflow_id, team_assigned, Utc::now())
            .await
        {
            tracing::error!(workflow_id, error = %e, "Failed to release assignment lease");
            if team_assigned {
                return Err(e.into());
            }
        }

        let result = outcome?;
        tracing::info!(
            workflow_id,
            assigned = result.assignments.len(),
            unassigned = result.unassigned.len(),
            overcommitted = result.capacity_warnings.len(),
            "Team assigned"
        );
        self.publish(
            DomainEvent::new(kinds::WORKFLOW_TEAM_ASSIGNED)
                .with_source(kinds::ENTITY_WORKFLOW, workflow_id)
                .with_actor(Some(actor.user_id))
                .with_payload(serde_json::json!({
                    "assignments": result.assignments,
                    "unassigned": result.unassigned,
                    "capacityWarnings": result.capacity_warnings.len(),
                })),
        );
        Ok(result)
    }

    async fn run_planner(
        &self,
        workflow_id: DbId,
        now: Timestamp,
    ) -> Result<AssignTeamResult, CoreError> {
        // Survives re-planning: a warning belongs to the attempt that committed it.
        let warnings: Mutex<Vec<CapacityWarning>> = Mutex::new(Vec::new());

        let plan = with_retry(&self.config.retry, "assign_team", || async {
            let detail = self
                .stores
                .workflows
                .find_detail(workflow_id)
                .await?
                .ok_or(CoreError::NotFound {
                    entity: "workflow",
                    id: workflow_id,
                })?;
            let employees = self.stores.employees.list_active().await?;
            let open_counts = self.stores.workflows.open_task_counts().await?;
            let on_workflow: HashSet<DbId> = detail
                .team
                .iter()
                .filter(|t| t.status == TeamAssignmentStatus::Active)
                .map(|t| t.employee_id)
                .collect();

            let pool: Vec<PoolMember> = employees
                .into_iter()
                .map(|employee| PoolMember {
                    open_task_count: open_counts.get(&employee.id).copied().unwrap_or(0),
                    on_workflow: on_workflow.contains(&employee.id),
                    employee,
                })
                .collect();

            let plan = planner::plan_assignments(&detail.tasks, &pool)?;

            let mut current = detail.workflow.clone();
            for planned in &plan.assignments {
                let Some(task) = detail.tasks.iter().find(|t| t.id == planned.task_id) else {
                    continue;
                };
                let mut staffed = task.clone();
                staffed.assigned_to_id = Some(planned.employee_id);
                let staffed = workflow::transition_task(
                    &staffed,
                    TaskStatus::Assigned,
                    &TaskUpdateFields::default(),
                    &detail.tasks,
                    now,
                )?;

                let mut wf = current.clone();
                wf.updated_at = now;
                let committed = self
                    .stores
                    .workflows
                    .commit(&WorkflowCommit {
                        workflow: wf,
                        tasks: vec![staffed],
                        reservations: vec![planned.reservation],
                        releases: Vec::new(),
                    })
                    .await?;
                current = committed.workflow;

                tracing::debug!(
                    workflow_id,
                    task_id = planned.task_id,
                    employee_id = planned.employee_id,
                    score = planned.score,
                    "Task assigned"
                );
                if planned.overcommitted {
                    tracing::warn!(
                        workflow_id,
                        task_id = planned.task_id,
                        employee_id = planned.employee_id,
                        hours = planned.reservation.hours,
                        "Employee overcommitted to staff task"
                    );
                }
                if let Some(w) = plan.warnings.iter().find(|w| w.task_id == planned.task_id) {
                    if let Ok(mut all) = warnings.lock() {
                        all.push(w.clone());
                    }
                }
            }

            for gap in &plan.unassigned {
                tracing::warn!(workflow_id, task_id = gap.task_id, reason = ?gap.reason, "Task left unassigned");
            }
            Ok::<_, Attempt>(plan)
        })
        .await?;

        let capacity_warnings = warnings.into_inner().unwrap_or_default();
        Ok(AssignTeamResult {
            workflow_id,
            assignments: plan
                .mapping()
                .into_iter()
                .map(|(task_id, employee_id)| TaskAssignment {
                    task_id,
                    employee_id,
                })
                .collect(),
            unassigned: plan.unassigned,
            capacity_warnings,
        })
    }
}
