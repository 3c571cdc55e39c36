//! Storage ports.
//!
//! The engine talks to persistence only through these traits. Each commit
//! method is one atomic unit: either every write in it lands or none do.
//! Writers that read-modify-write a workflow pass the version they read and
//! get [`StoreError::StaleVersion`] back if someone else got there first.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::capacity::{Release, Reservation};
use crate::employee::{CreateEmployee, Employee, UpdateEmployee};
use crate::error::CoreError;
use crate::sequence::{NewSequence, NewSequenceActivity, Sequence, SequenceActivity, SequenceAssignment};
use crate::template::{NewWorkflowTemplate, WorkflowTemplate};
use crate::types::{DbId, Timestamp};
use crate::workflow::{
    NewWorkflowInstance, NewWorkflowTask, WorkflowDetail, WorkflowInstance, WorkflowListQuery,
    WorkflowTask,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The row changed between read and write.
    #[error("Stale version")]
    StaleVersion,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// Another open assignment exists for the same (sequence, lead) pair.
    #[error("Duplicate open sequence assignment")]
    DuplicateOpenAssignment,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that escape the engine's retry loops.
impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StaleVersion => {
                CoreError::Conflict("The record was modified concurrently".into())
            }
            StoreError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            StoreError::DuplicateOpenAssignment => CoreError::Conflict(
                "An open assignment already exists for this sequence and lead".into(),
            ),
            StoreError::Conflict(msg) => CoreError::Conflict(msg),
            StoreError::Backend(msg) => CoreError::TransientStore(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Commit payloads
// ---------------------------------------------------------------------------

/// A batch of writes against one workflow, applied atomically.
///
/// `workflow.version` and each task's `version` must be the versions that
/// were read; the store bumps them on success.
#[derive(Debug, Clone)]
pub struct WorkflowCommit {
    pub workflow: WorkflowInstance,
    pub tasks: Vec<WorkflowTask>,
    /// Applied after releases. Each one makes sure the employee holds an
    /// active team assignment on the workflow; the project counter only
    /// moves when a team assignment is actually activated.
    pub reservations: Vec<Reservation>,
    /// `closes_project` completes the employee's active team assignment.
    pub releases: Vec<Release>,
}

impl WorkflowCommit {
    pub fn workflow_only(workflow: WorkflowInstance) -> Self {
        Self {
            workflow,
            tasks: Vec::new(),
            reservations: Vec::new(),
            releases: Vec::new(),
        }
    }
}

/// Result of trying to take the assignment lease on a workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum LeaseOutcome {
    Acquired(WorkflowInstance),
    /// `team_assigned` is already set.
    AlreadyAssigned,
    /// Another planner holds a live lease.
    Busy,
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    async fn create(&self, input: &CreateEmployee) -> StoreResult<Employee>;

    async fn update(&self, id: DbId, input: &UpdateEmployee) -> StoreResult<Option<Employee>>;

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Employee>>;

    async fn find_by_user_id(&self, user_id: DbId) -> StoreResult<Option<Employee>>;

    async fn list(&self) -> StoreResult<Vec<Employee>>;

    /// Employees with `status = active`, ordered by id.
    async fn list_active(&self) -> StoreResult<Vec<Employee>>;
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<WorkflowTemplate>>;

    /// Insert or replace the template with the same name.
    async fn upsert(&self, input: &NewWorkflowTemplate) -> StoreResult<WorkflowTemplate>;
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Insert an instance and its tasks, resolving blueprint keys to task ids.
    async fn create_instance(
        &self,
        instance: &NewWorkflowInstance,
        tasks: &[NewWorkflowTask],
        now: Timestamp,
    ) -> StoreResult<WorkflowDetail>;

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<WorkflowInstance>>;

    async fn find_detail(&self, id: DbId) -> StoreResult<Option<WorkflowDetail>>;

    async fn list(&self, query: &WorkflowListQuery) -> StoreResult<Vec<WorkflowInstance>>;

    async fn find_task(&self, task_id: DbId) -> StoreResult<Option<WorkflowTask>>;

    /// Open (not completed) task count per assignee. Tasks on cancelled
    /// workflows are left out.
    async fn open_task_counts(&self) -> StoreResult<HashMap<DbId, i64>>;

    /// Take the single-writer lease for a planner run.
    ///
    /// A lease older than `stale_before` is considered abandoned and is
    /// taken over. Acquiring bumps the workflow version.
    async fn acquire_assignment_lease(
        &self,
        workflow_id: DbId,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> StoreResult<LeaseOutcome>;

    /// Drop the lease, optionally marking the team as assigned.
    async fn release_assignment_lease(
        &self,
        workflow_id: DbId,
        team_assigned: bool,
        now: Timestamp,
    ) -> StoreResult<WorkflowInstance>;

    async fn commit(&self, commit: &WorkflowCommit) -> StoreResult<WorkflowDetail>;

    /// Apply `releases` and delete the workflow with its tasks and team,
    /// provided the workflow is still at `expected_version`.
    async fn delete(
        &self,
        workflow_id: DbId,
        expected_version: i64,
        releases: &[Release],
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait SequenceRepository: Send + Sync {
    async fn create_sequence(&self, input: &NewSequence, created_by_id: DbId) -> StoreResult<Sequence>;

    async fn find_sequence(&self, id: DbId) -> StoreResult<Option<Sequence>>;

    async fn list_sequences(&self) -> StoreResult<Vec<Sequence>>;

    /// Persist a sequence's status and approval fields.
    async fn update_sequence(&self, sequence: &Sequence) -> StoreResult<Sequence>;

    async fn lead_exists(&self, lead_id: DbId) -> StoreResult<bool>;

    /// Insert an assignment with its initial activities.
    ///
    /// Fails with [`StoreError::DuplicateOpenAssignment`] when the new row is
    /// open and another open row exists for the same pair.
    async fn insert_assignment(
        &self,
        assignment: &SequenceAssignment,
        activities: &[NewSequenceActivity],
    ) -> StoreResult<SequenceAssignment>;

    async fn find_assignment(&self, id: DbId) -> StoreResult<Option<SequenceAssignment>>;

    /// Compare-and-swap on `assignment.version`, appending `activities`.
    ///
    /// Enforces the same open-pair uniqueness as
    /// [`insert_assignment`](Self::insert_assignment).
    async fn commit_assignment(
        &self,
        assignment: &SequenceAssignment,
        activities: &[NewSequenceActivity],
    ) -> StoreResult<SequenceAssignment>;

    async fn list_activities(&self, assignment_id: DbId) -> StoreResult<Vec<SequenceActivity>>;
}
