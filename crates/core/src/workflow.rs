//! Workflow instances, their tasks, and the lifecycle rules binding them.
//!
//! Everything here is pure: callers load an instance plus its sibling tasks,
//! ask this module for the next state, and persist the result atomically.
//! [`recompute_workflow`] is the only code path that writes `progress`.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capacity::Release;
use crate::error::CoreError;
use crate::template::WorkflowTemplate;
use crate::types::{DbId, Hours, Timestamp};

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Completed,
    OnHold,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::InProgress => "in_progress",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::OnHold => "on_hold",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(WorkflowStatus::Pending),
            "in_progress" => Ok(WorkflowStatus::InProgress),
            "completed" => Ok(WorkflowStatus::Completed),
            "on_hold" => Ok(WorkflowStatus::OnHold),
            "cancelled" => Ok(WorkflowStatus::Cancelled),
            other => Err(CoreError::Validation(format!(
                "Unknown workflow status '{other}'"
            ))),
        }
    }

    /// Statuses reachable from `self` through an explicit status update.
    pub fn valid_transitions(self) -> &'static [WorkflowStatus] {
        use WorkflowStatus::*;
        match self {
            Pending => &[InProgress, Completed, OnHold, Cancelled],
            InProgress => &[Completed, OnHold, Cancelled],
            OnHold => &[Pending, InProgress, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition(self, to: WorkflowStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Cancelled)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Blocked,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "assigned" => Ok(TaskStatus::Assigned),
            "in_progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(CoreError::Validation(format!(
                "Unknown task status '{other}'"
            ))),
        }
    }

    /// Statuses reachable from `self` through a task status update.
    ///
    /// `Pending -> Assigned` is reserved for the assignment planner and
    /// reassignment; it is listed so the planner can validate its own writes.
    pub fn valid_transitions(self) -> &'static [TaskStatus] {
        use TaskStatus::*;
        match self {
            Pending => &[Assigned, InProgress],
            Assigned => &[InProgress],
            InProgress => &[Blocked, Completed],
            Blocked => &[InProgress, Completed],
            Completed => &[],
        }
    }

    pub fn can_transition(self, to: TaskStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Open tasks still hold capacity on their assignee.
    pub fn is_open(self) -> bool {
        self != TaskStatus::Completed
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamAssignmentStatus {
    Active,
    Completed,
}

impl TeamAssignmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TeamAssignmentStatus::Active => "active",
            TeamAssignmentStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "active" => Ok(TeamAssignmentStatus::Active),
            "completed" => Ok(TeamAssignmentStatus::Completed),
            other => Err(CoreError::Validation(format!(
                "Unknown team assignment status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A running service engagement instantiated from a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: DbId,
    pub user_id: DbId,
    pub template_id: Option<DbId>,
    pub service_name: String,
    pub service_tier: String,
    pub service_amount_cents: i64,
    pub status: WorkflowStatus,
    pub progress: i16,
    pub team_assigned: bool,
    /// Lease held by a running assignment planner, if any.
    pub assignment_started_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub expected_completion_date: Option<Timestamp>,
    pub internal_notes: Option<String>,
    pub client_notes: Option<String>,
    /// Optimistic concurrency token; bumped on every write.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// One unit of work within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub id: DbId,
    pub workflow_id: DbId,
    pub title: String,
    pub description: Option<String>,
    pub order: i32,
    pub estimated_hours: Hours,
    pub actual_hours: Option<Hours>,
    pub required_skills: BTreeSet<String>,
    /// Sibling task ids that must be completed before this task starts.
    pub dependencies: BTreeSet<DbId>,
    pub status: TaskStatus,
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

/// Records that an employee is staffed on a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamAssignment {
    pub id: DbId,
    pub employee_id: DbId,
    pub workflow_id: DbId,
    pub status: TeamAssignmentStatus,
    pub assigned_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// An instance together with its tasks and team, as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowDetail {
    pub workflow: WorkflowInstance,
    pub tasks: Vec<WorkflowTask>,
    pub team: Vec<TeamAssignment>,
}

impl WorkflowDetail {
    /// What the owning client may see: client-visible tasks, no internal notes.
    pub fn client_view(mut self) -> Self {
        self.workflow.internal_notes = None;
        self.tasks.retain(|t| t.visible_to_client);
        self
    }
}

/// Optional fields accompanying a task status update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdateFields {
    pub blocked_reason: Option<String>,
    pub completed_work: Option<String>,
    pub actual_hours: Option<Hours>,
}

/// Caller-supplied service details for a new instance.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDetails {
    pub service_name: String,
    pub service_tier: String,
    #[serde(default)]
    pub service_amount_cents: i64,
    pub internal_notes: Option<String>,
    pub client_notes: Option<String>,
}

/// Filters for listing workflow instances.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowListQuery {
    pub user_id: Option<DbId>,
    pub status: Option<WorkflowStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A workflow instance not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkflowInstance {
    pub user_id: DbId,
    pub template_id: Option<DbId>,
    pub service_name: String,
    pub service_tier: String,
    pub service_amount_cents: i64,
    pub expected_completion_date: Option<Timestamp>,
    pub internal_notes: Option<String>,
    pub client_notes: Option<String>,
}

/// A task not yet persisted. Dependencies are expressed as blueprint keys;
/// the store maps them to the ids it allocates.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkflowTask {
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    pub order: i32,
    pub estimated_hours: Hours,
    pub required_skills: BTreeSet<String>,
    pub dependency_keys: Vec<String>,
    pub visible_to_client: bool,
}

/// Clone a template's blueprints 1:1 into a new instance and its tasks.
pub fn instantiate(
    template: &WorkflowTemplate,
    owner_id: DbId,
    details: &ServiceDetails,
    now: Timestamp,
) -> (NewWorkflowInstance, Vec<NewWorkflowTask>) {
    let instance = NewWorkflowInstance {
        user_id: owner_id,
        template_id: Some(template.id),
        service_name: details.service_name.trim().to_string(),
        service_tier: template.service_tier.clone(),
        service_amount_cents: details.service_amount_cents,
        expected_completion_date: Some(
            now + chrono::Duration::days(i64::from(template.estimated_duration_days.max(0))),
        ),
        internal_notes: details.internal_notes.clone(),
        client_notes: details.client_notes.clone(),
    };
    let tasks = template
        .blueprints
        .iter()
        .map(|bp| NewWorkflowTask {
            key: bp.key.clone(),
            title: bp.title.clone(),
            description: bp.description.clone(),
            order: bp.order,
            estimated_hours: bp.estimated_hours,
            required_skills: bp.required_skills.iter().cloned().collect(),
            dependency_keys: bp.dependencies.clone(),
            visible_to_client: bp.visible_to_client,
        })
        .collect();
    (instance, tasks)
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// `round(100 * completed / total)`, half rounding up; 0 when there are no tasks.
pub fn progress_percent(completed: usize, total: usize) -> i16 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    ((200 * completed + total) / (2 * total)) as i16
}

/// Progress of a task set.
pub fn task_progress(tasks: &[WorkflowTask]) -> i16 {
    let completed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    progress_percent(completed, tasks.len())
}

pub fn all_tasks_completed(tasks: &[WorkflowTask]) -> bool {
    tasks.iter().all(|t| t.status == TaskStatus::Completed)
}

/// Recompute progress and the task-driven status edges of a workflow.
///
/// - First task in progress moves `pending -> in_progress` and stamps `started_at`.
/// - All tasks completed moves `pending`/`in_progress` to `completed`.
///
/// `on_hold` and terminal workflows keep their status.
pub fn recompute_workflow(
    workflow: &WorkflowInstance,
    tasks: &[WorkflowTask],
    now: Timestamp,
) -> WorkflowInstance {
    let mut next = workflow.clone();
    next.progress = task_progress(tasks);

    let active = matches!(
        workflow.status,
        WorkflowStatus::Pending | WorkflowStatus::InProgress
    );
    if active && !tasks.is_empty() && all_tasks_completed(tasks) {
        next.status = WorkflowStatus::Completed;
        next.completed_at = Some(now);
        next.progress = 100;
        next.started_at.get_or_insert(now);
    } else if workflow.status == WorkflowStatus::Pending
        && tasks
            .iter()
            .any(|t| matches!(t.status, TaskStatus::InProgress | TaskStatus::Blocked))
    {
        next.status = WorkflowStatus::InProgress;
        next.started_at.get_or_insert(now);
    }

    if next != *workflow {
        next.updated_at = now;
    }
    next
}

// ---------------------------------------------------------------------------
// Workflow transitions
// ---------------------------------------------------------------------------

/// Apply an explicit workflow status update.
pub fn transition_workflow(
    workflow: &WorkflowInstance,
    to: WorkflowStatus,
    tasks: &[WorkflowTask],
    now: Timestamp,
) -> Result<WorkflowInstance, CoreError> {
    if !workflow.status.can_transition(to) {
        return Err(CoreError::invalid_transition("workflow", workflow.status, to));
    }
    if to == WorkflowStatus::Completed && !all_tasks_completed(tasks) {
        let open = tasks.iter().filter(|t| t.status.is_open()).count();
        return Err(CoreError::invalid_transition(
            "workflow",
            workflow.status,
            format!("{to} ({open} tasks still open)"),
        ));
    }

    let mut next = workflow.clone();
    next.status = to;
    next.updated_at = now;
    match to {
        WorkflowStatus::InProgress => {
            next.started_at.get_or_insert(now);
        }
        WorkflowStatus::Completed => {
            next.completed_at = Some(now);
            next.progress = 100;
        }
        _ => {}
    }
    Ok(next)
}

/// Task mutations are only accepted while the workflow is live.
pub fn ensure_accepts_task_updates(workflow: &WorkflowInstance) -> Result<(), CoreError> {
    match workflow.status {
        WorkflowStatus::Pending | WorkflowStatus::InProgress => Ok(()),
        other => Err(CoreError::invalid_transition(
            "task",
            format!("workflow {other}"),
            "task update",
        )),
    }
}

// ---------------------------------------------------------------------------
// Task transitions
// ---------------------------------------------------------------------------

/// Ids of `task`'s dependencies that are not yet completed (or not found).
pub fn unmet_dependencies(task: &WorkflowTask, siblings: &[WorkflowTask]) -> Vec<DbId> {
    task.dependencies
        .iter()
        .copied()
        .filter(|dep| {
            !siblings
                .iter()
                .any(|s| s.id == *dep && s.status == TaskStatus::Completed)
        })
        .collect()
}

/// Apply a task status update requested by an employee or operator.
///
/// `siblings` is every task of the workflow (it may include `task` itself).
pub fn transition_task(
    task: &WorkflowTask,
    to: TaskStatus,
    fields: &TaskUpdateFields,
    siblings: &[WorkflowTask],
    now: Timestamp,
) -> Result<WorkflowTask, CoreError> {
    if !task.status.can_transition(to) {
        return Err(CoreError::invalid_transition("task", task.status, to));
    }

    let mut next = task.clone();
    match to {
        TaskStatus::Assigned => {
            if task.assigned_to_id.is_none() {
                return Err(CoreError::Validation(
                    "A task can only become assigned once it has an assignee".into(),
                ));
            }
        }
        TaskStatus::InProgress => {
            let pending = unmet_dependencies(task, siblings);
            if !pending.is_empty() {
                return Err(CoreError::DependencyNotSatisfied {
                    task_id: task.id,
                    pending,
                });
            }
            next.blocked_reason = None;
            next.started_at.get_or_insert(now);
        }
        TaskStatus::Blocked => {
            let reason = fields
                .blocked_reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| {
                    CoreError::Validation("Blocking a task requires a blocked_reason".into())
                })?;
            next.blocked_reason = Some(reason.to_string());
        }
        TaskStatus::Completed => {
            let pending = unmet_dependencies(task, siblings);
            if !pending.is_empty() {
                return Err(CoreError::DependencyNotSatisfied {
                    task_id: task.id,
                    pending,
                });
            }
            next.blocked_reason = None;
            next.completed_at = Some(now);
        }
        TaskStatus::Pending => {}
    }

    if let Some(work) = &fields.completed_work {
        next.completed_work = Some(work.clone());
    }
    if let Some(hours) = fields.actual_hours {
        if hours < 0.0 {
            return Err(CoreError::Validation(
                "actual_hours must not be negative".into(),
            ));
        }
        next.actual_hours = Some(hours);
    }

    next.status = to;
    next.updated_at = now;
    Ok(next)
}

/// Whether `employee_id` holds any open task in `tasks` other than `except`.
pub fn has_other_open_tasks(tasks: &[WorkflowTask], employee_id: DbId, except: DbId) -> bool {
    tasks.iter().any(|t| {
        t.id != except && t.assigned_to_id == Some(employee_id) && t.status.is_open()
    })
}

/// The capacity release owed when `task` stops holding its assignee's hours.
///
/// Returns `None` for unassigned tasks.
pub fn release_for_task(task: &WorkflowTask, siblings: &[WorkflowTask]) -> Option<Release> {
    let employee_id = task.assigned_to_id?;
    Some(Release {
        employee_id,
        hours: task.estimated_hours,
        closes_project: !has_other_open_tasks(siblings, employee_id, task.id),
    })
}

/// Releases for every open assigned task, used when a workflow is cancelled
/// or deleted. At most one release per employee closes the project.
pub fn releases_for_open_tasks(tasks: &[WorkflowTask]) -> Vec<Release> {
    let mut releases: Vec<Release> = Vec::new();
    for task in tasks.iter().filter(|t| t.status.is_open()) {
        let Some(employee_id) = task.assigned_to_id else {
            continue;
        };
        let first_for_employee = !releases.iter().any(|r| r.employee_id == employee_id);
        releases.push(Release {
            employee_id,
            hours: task.estimated_hours,
            closes_project: first_for_employee,
        });
    }
    releases
}
