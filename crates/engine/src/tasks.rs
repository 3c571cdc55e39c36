//! Task status updates and reassignment.
//!
//! Every write here goes through one [`WorkflowCommit`]: the task, the
//! recomputed workflow (progress and task-driven status) and any capacity
//! movement land together or not at all.

use agency_core::capability::Capability;
use agency_core::capacity::{self, Reservation};
use agency_core::error::CoreError;
use agency_core::repository::WorkflowCommit;
use agency_core::types::DbId;
use agency_core::workflow::{
    self, TaskStatus, TaskUpdateFields, TeamAssignmentStatus, WorkflowInstance, WorkflowTask,
};
use agency_events::{kinds, DomainEvent};
use chrono::Utc;

use crate::retry::{with_retry, Attempt};
use crate::{Actor, Engine};

impl Engine {
    /// Move a task through its lifecycle.
    ///
    /// Employees may only touch tasks assigned to them unless they can
    /// manage workflows. Completing a task releases its hours; completing the
    /// last one completes the workflow.
    pub async fn update_task_status(
        &self,
        actor: &Actor,
        task_id: DbId,
        to: TaskStatus,
        fields: TaskUpdateFields,
    ) -> Result<WorkflowTask, CoreError> {
        actor.require(Capability::UpdateTasks)?;
        if to == TaskStatus::Assigned {
            return Err(CoreError::Validation(
                "Tasks become assigned through team assignment or reassignment".into(),
            ));
        }

        let (before, task, workflow) =
            with_retry(&self.config.retry, "update_task_status", || async {
                let current = self.load_task(task_id).await?;
                self.ensure_may_update(actor, &current).await?;

                let detail = self.load_detail(current.workflow_id).await?;
                workflow::ensure_accepts_task_updates(&detail.workflow)?;

                let now = Utc::now();
                let next = workflow::transition_task(&current, to, &fields, &detail.tasks, now)?;
                let after: Vec<WorkflowTask> = detail
                    .tasks
                    .iter()
                    .map(|t| if t.id == next.id { next.clone() } else { t.clone() })
                    .collect();
                let wf = workflow::recompute_workflow(&detail.workflow, &after, now);

                let releases = if to == TaskStatus::Completed {
                    workflow::release_for_task(&current, &detail.tasks)
                        .into_iter()
                        .collect()
                } else {
                    Vec::new()
                };

                let committed = self
                    .stores
                    .workflows
                    .commit(&WorkflowCommit {
                        workflow: wf,
                        tasks: vec![next],
                        reservations: Vec::new(),
                        releases,
                    })
                    .await?;
                let task = committed
                    .tasks
                    .into_iter()
                    .find(|t| t.id == task_id)
                    .ok_or(CoreError::NotFound {
                        entity: "task",
                        id: task_id,
                    })?;
                Ok::<_, Attempt>(((current.status, detail.workflow), task, committed.workflow))
            })
            .await?;
        let (from, previous_workflow) = before;

        tracing::info!(
            task_id,
            workflow_id = task.workflow_id,
            from = %from,
            to = %task.status,
            progress = workflow.progress,
            "Task status changed"
        );
        self.publish(
            DomainEvent::new(kinds::TASK_STATUS_CHANGED)
                .with_source(kinds::ENTITY_TASK, task_id)
                .with_actor(Some(actor.user_id))
                .with_payload(serde_json::json!({
                    "workflowId": task.workflow_id,
                    "from": from.as_str(),
                    "to": task.status.as_str(),
                    "progress": workflow.progress,
                })),
        );
        self.publish_if_status_moved(actor, &previous_workflow, &workflow);
        Ok(task)
    }

    /// Hand a not-yet-started task to another employee, moving its hours
    /// from the previous assignee to the new one.
    pub async fn reassign_task(
        &self,
        actor: &Actor,
        task_id: DbId,
        employee_id: DbId,
    ) -> Result<WorkflowTask, CoreError> {
        actor.require(Capability::AssignTeams)?;

        let (previous, task) = with_retry(&self.config.retry, "reassign_task", || async {
            // Re-read on every attempt.
            let employee = self.get_employee(employee_id).await?;
            let current = self.load_task(task_id).await?;
            if !matches!(current.status, TaskStatus::Pending | TaskStatus::Assigned) {
                return Err(CoreError::invalid_transition(
                    "task",
                    current.status,
                    "reassignment",
                )
                .into());
            }
            if current.assigned_to_id == Some(employee_id) {
                return Ok((current.assigned_to_id, current));
            }

            let detail = self.load_detail(current.workflow_id).await?;
            workflow::ensure_accepts_task_updates(&detail.workflow)?;

            let on_workflow = detail.team.iter().any(|t| {
                t.employee_id == employee_id && t.status == TeamAssignmentStatus::Active
            });
            if !capacity::is_eligible_on_workflow(&employee, on_workflow) {
                return Err(CoreError::Conflict(format!(
                    "Employee {employee_id} is not available for new work"
                ))
                .into());
            }

            let now = Utc::now();
            let release = workflow::release_for_task(&current, &detail.tasks);
            let mut next = current.clone();
            next.assigned_to_id = Some(employee_id);
            next.status = TaskStatus::Assigned;
            next.updated_at = now;

            let mut wf = detail.workflow.clone();
            wf.updated_at = now;
            let committed = self
                .stores
                .workflows
                .commit(&WorkflowCommit {
                    workflow: wf,
                    tasks: vec![next],
                    reservations: vec![Reservation {
                        employee_id,
                        hours: current.estimated_hours,
                        opens_project: !on_workflow,
                    }],
                    releases: release.into_iter().collect(),
                })
                .await?;
            let task = committed
                .tasks
                .into_iter()
                .find(|t| t.id == task_id)
                .ok_or(CoreError::NotFound {
                    entity: "task",
                    id: task_id,
                })?;
            Ok::<_, Attempt>((current.assigned_to_id, task))
        })
        .await?;

        if previous != Some(employee_id) {
            tracing::info!(
                task_id,
                workflow_id = task.workflow_id,
                from = ?previous,
                to = employee_id,
                "Task reassigned"
            );
            self.publish(
                DomainEvent::new(kinds::TASK_REASSIGNED)
                    .with_source(kinds::ENTITY_TASK, task_id)
                    .with_actor(Some(actor.user_id))
                    .with_payload(serde_json::json!({
                        "workflowId": task.workflow_id,
                        "from": previous,
                        "to": employee_id,
                    })),
            );
        }
        Ok(task)
    }

    async fn load_task(&self, task_id: DbId) -> Result<WorkflowTask, CoreError> {
        self.stores
            .workflows
            .find_task(task_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "task",
                id: task_id,
            })
    }

    async fn ensure_may_update(&self, actor: &Actor, task: &WorkflowTask) -> Result<(), CoreError> {
        if actor.has(Capability::ManageWorkflows) {
            return Ok(());
        }
        let employee = self.stores.employees.find_by_user_id(actor.user_id).await?;
        match (employee, task.assigned_to_id) {
            (Some(e), Some(assignee)) if e.id == assignee => Ok(()),
            _ => Err(CoreError::Forbidden(format!(
                "Task {} is not assigned to you",
                task.id
            ))),
        }
    }

    fn publish_if_status_moved(
        &self,
        actor: &Actor,
        before: &WorkflowInstance,
        after: &WorkflowInstance,
    ) {
        if before.status != after.status {
            tracing::info!(
                workflow_id = after.id,
                from = %before.status,
                to = %after.status,
                "Workflow status follows its tasks"
            );
            self.publish_workflow_status(actor, after, before.status);
        }
    }
}
