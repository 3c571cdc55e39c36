//! Repository for the `team_assignments` table.

use agency_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::workflow::TeamAssignmentRow;

const COLUMNS: &str = "id, employee_id, workflow_id, status, assigned_at, completed_at";

pub struct TeamAssignmentRepo;

impl TeamAssignmentRepo {
    pub async fn list_for_workflow(
        pool: &PgPool,
        workflow_id: DbId,
    ) -> Result<Vec<TeamAssignmentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM team_assignments WHERE workflow_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, TeamAssignmentRow>(&query)
            .bind(workflow_id)
            .fetch_all(pool)
            .await
    }

    /// Make sure the employee holds an active membership on the workflow.
    ///
    /// Returns `true` if a new row was inserted.
    pub async fn ensure_active(
        conn: &mut PgConnection,
        workflow_id: DbId,
        employee_id: DbId,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO team_assignments (employee_id, workflow_id, status, assigned_at) \
             VALUES ($1, $2, 'active', $3) \
             ON CONFLICT (workflow_id, employee_id) WHERE status = 'active' DO NOTHING",
        )
        .bind(employee_id)
        .bind(workflow_id)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Complete the employee's active membership, if any.
    ///
    /// Returns `true` if a row was completed.
    pub async fn complete_active(
        conn: &mut PgConnection,
        workflow_id: DbId,
        employee_id: DbId,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE team_assignments SET status = 'completed', completed_at = $3 \
             WHERE workflow_id = $1 AND employee_id = $2 AND status = 'active'",
        )
        .bind(workflow_id)
        .bind(employee_id)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
