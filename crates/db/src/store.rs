//! [`PgStore`]: the PostgreSQL implementation of the engine's storage ports.
//!
//! Multi-row writes run in one transaction. Version checks are
//! `UPDATE ... WHERE version = $n`; a zero-row update rolls the transaction
//! back and reports [`StoreError::StaleVersion`].

use std::collections::HashMap;

use agency_core::capacity::Release;
use agency_core::employee::{CreateEmployee, Employee, UpdateEmployee};
use agency_core::repository::{
    EmployeeRepository, LeaseOutcome, SequenceRepository, StoreError, StoreResult,
    TemplateRepository, WorkflowCommit, WorkflowRepository,
};
use agency_core::sequence::{
    NewSequence, NewSequenceActivity, Sequence, SequenceActivity, SequenceAssignment,
};
use agency_core::template::{NewWorkflowTemplate, WorkflowTemplate};
use agency_core::types::{DbId, Timestamp};
use agency_core::workflow::{
    NewWorkflowInstance, NewWorkflowTask, WorkflowDetail, WorkflowInstance, WorkflowListQuery,
    WorkflowTask,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool};

use crate::repositories::sequence_repo::OPEN_ASSIGNMENT_INDEX;
use crate::repositories::{
    EmployeeRepo, LeadRepo, SequenceRepo, TaskRepo, TeamAssignmentRepo, TemplateRepo,
    WorkflowRepo,
};

/// Translate a driver error into the port's error vocabulary.
///
/// Unique violations on `uq_*` constraints become conflicts, with the open
/// sequence assignment index singled out. Everything else is a backend
/// failure the engine may retry.
fn db_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("23505") => {
                let constraint = db.constraint().unwrap_or("unknown");
                if constraint == OPEN_ASSIGNMENT_INDEX {
                    return StoreError::DuplicateOpenAssignment;
                }
                if constraint.starts_with("uq_") {
                    return StoreError::Conflict(format!(
                        "Duplicate value violates unique constraint: {constraint}"
                    ));
                }
            }
            Some("23503") => {
                return StoreError::Conflict(format!(
                    "Referenced record does not exist: {}",
                    db.constraint().unwrap_or("unknown")
                ));
            }
            // serialization_failure, deadlock_detected
            Some("40001") | Some("40P01") => return StoreError::StaleVersion,
            _ => {}
        }
    }
    tracing::error!(error = %err, "Database error");
    StoreError::Backend(err.to_string())
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_detail(&self, id: DbId) -> StoreResult<Option<WorkflowDetail>> {
        let Some(row) = WorkflowRepo::find_by_id(&self.pool, id).await.map_err(db_err)? else {
            return Ok(None);
        };
        let tasks = TaskRepo::list_for_workflow(&self.pool, id).await.map_err(db_err)?;
        let team = TeamAssignmentRepo::list_for_workflow(&self.pool, id)
            .await
            .map_err(db_err)?;
        Ok(Some(WorkflowDetail {
            workflow: row.try_into()?,
            tasks: convert_all(tasks)?,
            team: convert_all(team)?,
        }))
    }

    /// Distinguish a missing workflow from a stale one after a failed CAS.
    async fn missing_or_stale(&self, workflow_id: DbId) -> StoreError {
        match WorkflowRepo::find_by_id(&self.pool, workflow_id).await {
            Ok(Some(_)) => StoreError::StaleVersion,
            Ok(None) => StoreError::NotFound {
                entity: "workflow",
                id: workflow_id,
            },
            Err(e) => db_err(e),
        }
    }

    async fn apply_release(
        conn: &mut PgConnection,
        workflow_id: DbId,
        release: &Release,
        now: Timestamp,
    ) -> StoreResult<()> {
        let closed = release.closes_project
            && TeamAssignmentRepo::complete_active(&mut *conn, workflow_id, release.employee_id, now)
                .await
                .map_err(db_err)?;
        EmployeeRepo::release(conn, release.employee_id, release.hours, closed)
            .await
            .map_err(db_err)
    }
}

// ---------------------------------------------------------------------------
// Employees
// ---------------------------------------------------------------------------

#[async_trait]
impl EmployeeRepository for PgStore {
    async fn create(&self, input: &CreateEmployee) -> StoreResult<Employee> {
        EmployeeRepo::create(&self.pool, input)
            .await
            .map_err(db_err)?
            .try_into()
    }

    async fn update(&self, id: DbId, input: &UpdateEmployee) -> StoreResult<Option<Employee>> {
        EmployeeRepo::update(&self.pool, id, input)
            .await
            .map_err(db_err)?
            .map(Employee::try_from)
            .transpose()
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Employee>> {
        EmployeeRepo::find_by_id(&self.pool, id)
            .await
            .map_err(db_err)?
            .map(Employee::try_from)
            .transpose()
    }

    async fn find_by_user_id(&self, user_id: DbId) -> StoreResult<Option<Employee>> {
        EmployeeRepo::find_by_user_id(&self.pool, user_id)
            .await
            .map_err(db_err)?
            .map(Employee::try_from)
            .transpose()
    }

    async fn list(&self) -> StoreResult<Vec<Employee>> {
        convert_all(EmployeeRepo::list(&self.pool).await.map_err(db_err)?)
    }

    async fn list_active(&self) -> StoreResult<Vec<Employee>> {
        convert_all(EmployeeRepo::list_active(&self.pool).await.map_err(db_err)?)
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[async_trait]
impl TemplateRepository for PgStore {
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<WorkflowTemplate>> {
        Ok(TemplateRepo::find_by_name(&self.pool, name)
            .await
            .map_err(db_err)?
            .map(WorkflowTemplate::from))
    }

    async fn upsert(&self, input: &NewWorkflowTemplate) -> StoreResult<WorkflowTemplate> {
        Ok(TemplateRepo::upsert(&self.pool, input)
            .await
            .map_err(db_err)?
            .into())
    }
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

#[async_trait]
impl WorkflowRepository for PgStore {
    async fn create_instance(
        &self,
        instance: &NewWorkflowInstance,
        tasks: &[NewWorkflowTask],
        now: Timestamp,
    ) -> StoreResult<WorkflowDetail> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let workflow = WorkflowRepo::insert(&mut tx, instance, now)
            .await
            .map_err(db_err)?;

        let mut ids: HashMap<&str, DbId> = HashMap::with_capacity(tasks.len());
        for task in tasks {
            let id = TaskRepo::insert(&mut tx, workflow.id, task, now)
                .await
                .map_err(db_err)?;
            ids.insert(task.key.as_str(), id);
        }
        for task in tasks.iter().filter(|t| !t.dependency_keys.is_empty()) {
            let deps = task
                .dependency_keys
                .iter()
                .map(|key| {
                    ids.get(key.as_str()).copied().ok_or_else(|| {
                        StoreError::Conflict(format!("Unknown dependency '{key}'"))
                    })
                })
                .collect::<StoreResult<Vec<DbId>>>()?;
            TaskRepo::set_dependencies(&mut tx, ids[task.key.as_str()], &deps)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        self.load_detail(workflow.id).await?.ok_or(StoreError::NotFound {
            entity: "workflow",
            id: workflow.id,
        })
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<WorkflowInstance>> {
        WorkflowRepo::find_by_id(&self.pool, id)
            .await
            .map_err(db_err)?
            .map(WorkflowInstance::try_from)
            .transpose()
    }

    async fn find_detail(&self, id: DbId) -> StoreResult<Option<WorkflowDetail>> {
        self.load_detail(id).await
    }

    async fn list(&self, query: &WorkflowListQuery) -> StoreResult<Vec<WorkflowInstance>> {
        convert_all(WorkflowRepo::list(&self.pool, query).await.map_err(db_err)?)
    }

    async fn find_task(&self, task_id: DbId) -> StoreResult<Option<WorkflowTask>> {
        TaskRepo::find_by_id(&self.pool, task_id)
            .await
            .map_err(db_err)?
            .map(WorkflowTask::try_from)
            .transpose()
    }

    async fn open_task_counts(&self) -> StoreResult<HashMap<DbId, i64>> {
        Ok(TaskRepo::open_counts_by_assignee(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .collect())
    }

    async fn acquire_assignment_lease(
        &self,
        workflow_id: DbId,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> StoreResult<LeaseOutcome> {
        if let Some(row) = WorkflowRepo::try_acquire_lease(&self.pool, workflow_id, now, stale_before)
            .await
            .map_err(db_err)?
        {
            return Ok(LeaseOutcome::Acquired(row.try_into()?));
        }
        match WorkflowRepo::find_by_id(&self.pool, workflow_id)
            .await
            .map_err(db_err)?
        {
            None => Err(StoreError::NotFound {
                entity: "workflow",
                id: workflow_id,
            }),
            Some(row) if row.team_assigned => Ok(LeaseOutcome::AlreadyAssigned),
            Some(_) => Ok(LeaseOutcome::Busy),
        }
    }

    async fn release_assignment_lease(
        &self,
        workflow_id: DbId,
        team_assigned: bool,
        _now: Timestamp,
    ) -> StoreResult<WorkflowInstance> {
        WorkflowRepo::release_lease(&self.pool, workflow_id, team_assigned)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::NotFound {
                entity: "workflow",
                id: workflow_id,
            })?
            .try_into()
    }

    async fn commit(&self, commit: &WorkflowCommit) -> StoreResult<WorkflowDetail> {
        let workflow_id = commit.workflow.id;
        let now = commit.workflow.updated_at;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Locks the workflow row until commit, serializing writers.
        let updated = WorkflowRepo::update_versioned(&mut tx, &commit.workflow)
            .await
            .map_err(db_err)?;
        if updated.is_none() {
            drop(tx);
            return Err(self.missing_or_stale(workflow_id).await);
        }

        for task in &commit.tasks {
            if task.workflow_id != workflow_id {
                return Err(StoreError::Conflict(format!(
                    "Task {} does not belong to workflow {workflow_id}",
                    task.id
                )));
            }
            if !TaskRepo::update_versioned(&mut tx, task).await.map_err(db_err)? {
                tracing::debug!(workflow_id, task_id = task.id, "Stale task version");
                return Err(StoreError::StaleVersion);
            }
        }

        for release in &commit.releases {
            Self::apply_release(&mut tx, workflow_id, release, now).await?;
        }
        for reservation in &commit.reservations {
            let opened = TeamAssignmentRepo::ensure_active(
                &mut tx,
                workflow_id,
                reservation.employee_id,
                now,
            )
            .await
            .map_err(db_err)?;
            EmployeeRepo::reserve(&mut tx, reservation.employee_id, reservation.hours, opened)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        self.load_detail(workflow_id).await?.ok_or(StoreError::NotFound {
            entity: "workflow",
            id: workflow_id,
        })
    }

    async fn delete(
        &self,
        workflow_id: DbId,
        expected_version: i64,
        releases: &[Release],
    ) -> StoreResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for release in releases {
            Self::apply_release(&mut tx, workflow_id, release, now).await?;
        }
        let deleted = WorkflowRepo::delete_versioned(&mut tx, workflow_id, expected_version)
            .await
            .map_err(db_err)?;
        if !deleted {
            drop(tx);
            return Err(self.missing_or_stale(workflow_id).await);
        }
        tx.commit().await.map_err(db_err)
    }
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

#[async_trait]
impl SequenceRepository for PgStore {
    async fn create_sequence(&self, input: &NewSequence, created_by_id: DbId) -> StoreResult<Sequence> {
        SequenceRepo::create(&self.pool, input, created_by_id)
            .await
            .map_err(db_err)?
            .try_into()
    }

    async fn find_sequence(&self, id: DbId) -> StoreResult<Option<Sequence>> {
        SequenceRepo::find_by_id(&self.pool, id)
            .await
            .map_err(db_err)?
            .map(Sequence::try_from)
            .transpose()
    }

    async fn list_sequences(&self) -> StoreResult<Vec<Sequence>> {
        convert_all(SequenceRepo::list(&self.pool).await.map_err(db_err)?)
    }

    async fn update_sequence(&self, sequence: &Sequence) -> StoreResult<Sequence> {
        SequenceRepo::update_status(&self.pool, sequence)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::NotFound {
                entity: "sequence",
                id: sequence.id,
            })?
            .try_into()
    }

    async fn lead_exists(&self, lead_id: DbId) -> StoreResult<bool> {
        LeadRepo::exists(&self.pool, lead_id).await.map_err(db_err)
    }

    async fn insert_assignment(
        &self,
        assignment: &SequenceAssignment,
        activities: &[NewSequenceActivity],
    ) -> StoreResult<SequenceAssignment> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let row = SequenceRepo::insert_assignment(&mut tx, assignment)
            .await
            .map_err(db_err)?;
        for activity in activities {
            SequenceRepo::insert_activity(&mut tx, row.id, activity, assignment.updated_at)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        row.try_into()
    }

    async fn find_assignment(&self, id: DbId) -> StoreResult<Option<SequenceAssignment>> {
        SequenceRepo::find_assignment(&self.pool, id)
            .await
            .map_err(db_err)?
            .map(SequenceAssignment::try_from)
            .transpose()
    }

    async fn commit_assignment(
        &self,
        assignment: &SequenceAssignment,
        activities: &[NewSequenceActivity],
    ) -> StoreResult<SequenceAssignment> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let Some(row) = SequenceRepo::update_assignment_versioned(&mut tx, assignment)
            .await
            .map_err(db_err)?
        else {
            drop(tx);
            return match SequenceRepo::find_assignment(&self.pool, assignment.id)
                .await
                .map_err(db_err)?
            {
                Some(_) => Err(StoreError::StaleVersion),
                None => Err(StoreError::NotFound {
                    entity: "sequence_assignment",
                    id: assignment.id,
                }),
            };
        };
        for activity in activities {
            SequenceRepo::insert_activity(&mut tx, row.id, activity, assignment.updated_at)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        row.try_into()
    }

    async fn list_activities(&self, assignment_id: DbId) -> StoreResult<Vec<SequenceActivity>> {
        Ok(SequenceRepo::list_activities(&self.pool, assignment_id)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(SequenceActivity::from)
            .collect())
    }
}
