//! Repository for the `workflow_tasks` table.

use agency_core::types::{DbId, Timestamp};
use agency_core::workflow::{NewWorkflowTask, WorkflowTask};
use sqlx::{PgConnection, PgPool};

use crate::models::workflow::TaskRow;

const COLUMNS: &str = "id, workflow_id, title, description, sort_order, estimated_hours, \
    actual_hours, required_skills, dependencies, status, assigned_to_id, blocked_reason, \
    completed_work, started_at, completed_at, visible_to_client, version, created_at, updated_at";

pub struct TaskRepo;

impl TaskRepo {
    /// Insert a pending task without dependencies, returning its id.
    ///
    /// Dependencies reference sibling ids, so they are attached afterwards
    /// with [`TaskRepo::set_dependencies`].
    pub async fn insert(
        conn: &mut PgConnection,
        workflow_id: DbId,
        input: &NewWorkflowTask,
        now: Timestamp,
    ) -> Result<DbId, sqlx::Error> {
        let skills: Vec<&str> = input.required_skills.iter().map(String::as_str).collect();
        sqlx::query_scalar(
            "INSERT INTO workflow_tasks \
                (workflow_id, title, description, sort_order, estimated_hours, \
                 required_skills, visible_to_client, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) \
             RETURNING id",
        )
        .bind(workflow_id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.order)
        .bind(input.estimated_hours)
        .bind(&skills)
        .bind(input.visible_to_client)
        .bind(now)
        .fetch_one(conn)
        .await
    }

    pub async fn set_dependencies(
        conn: &mut PgConnection,
        id: DbId,
        dependencies: &[DbId],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE workflow_tasks SET dependencies = $2 WHERE id = $1")
            .bind(id)
            .bind(dependencies)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<TaskRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflow_tasks WHERE id = $1");
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Tasks of a workflow in template order.
    pub async fn list_for_workflow(
        pool: &PgPool,
        workflow_id: DbId,
    ) -> Result<Vec<TaskRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_tasks WHERE workflow_id = $1 ORDER BY sort_order, id"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(workflow_id)
            .fetch_all(pool)
            .await
    }

    /// Compare-and-swap write of a task's mutable fields.
    ///
    /// Returns `false` if the task is missing, belongs to another workflow
    /// or its version moved on.
    pub async fn update_versioned(
        conn: &mut PgConnection,
        task: &WorkflowTask,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_tasks SET \
                status = $4, \
                assigned_to_id = $5, \
                blocked_reason = $6, \
                completed_work = $7, \
                actual_hours = $8, \
                started_at = $9, \
                completed_at = $10, \
                version = version + 1 \
             WHERE id = $1 AND workflow_id = $2 AND version = $3",
        )
        .bind(task.id)
        .bind(task.workflow_id)
        .bind(task.version)
        .bind(task.status.as_str())
        .bind(task.assigned_to_id)
        .bind(&task.blocked_reason)
        .bind(&task.completed_work)
        .bind(task.actual_hours)
        .bind(task.started_at)
        .bind(task.completed_at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `(employee_id, open task count)` for every employee holding open work.
    /// Tasks on cancelled workflows do not count.
    pub async fn open_counts_by_assignee(pool: &PgPool) -> Result<Vec<(DbId, i64)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT t.assigned_to_id, COUNT(*) FROM workflow_tasks t \
             JOIN workflow_instances w ON w.id = t.workflow_id \
             WHERE t.status <> 'completed' AND t.assigned_to_id IS NOT NULL \
               AND w.status <> 'cancelled' \
             GROUP BY t.assigned_to_id",
        )
        .fetch_all(pool)
        .await
    }
}
