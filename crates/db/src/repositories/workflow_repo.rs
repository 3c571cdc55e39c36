//! Repository for the `workflow_instances` table.
//!
//! Every state write is a compare-and-swap on `version`; a `None` result
//! means the row was missing or had moved on.

use agency_core::types::{DbId, Timestamp};
use agency_core::workflow::{NewWorkflowInstance, WorkflowInstance, WorkflowListQuery};
use sqlx::{PgConnection, PgPool};

use crate::models::workflow::WorkflowRow;

const COLUMNS: &str = "id, user_id, template_id, service_name, service_tier, \
    service_amount_cents, status, progress, team_assigned, assignment_started_at, \
    started_at, completed_at, expected_completion_date, internal_notes, client_notes, \
    version, created_at, updated_at";

/// Default and maximum page sizes for [`WorkflowRepo::list`].
const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

pub struct WorkflowRepo;

impl WorkflowRepo {
    pub async fn insert(
        conn: &mut PgConnection,
        input: &NewWorkflowInstance,
        now: Timestamp,
    ) -> Result<WorkflowRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_instances \
                (user_id, template_id, service_name, service_tier, service_amount_cents, \
                 expected_completion_date, internal_notes, client_notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(input.user_id)
            .bind(input.template_id)
            .bind(&input.service_name)
            .bind(&input.service_tier)
            .bind(input.service_amount_cents)
            .bind(input.expected_completion_date)
            .bind(&input.internal_notes)
            .bind(&input.client_notes)
            .bind(now)
            .fetch_one(conn)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<WorkflowRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflow_instances WHERE id = $1");
        sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Newest first, optionally filtered by owner and status.
    pub async fn list(
        pool: &PgPool,
        params: &WorkflowListQuery,
    ) -> Result<Vec<WorkflowRow>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_instances \
             WHERE ($1::BIGINT IS NULL OR user_id = $1) \
               AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(params.user_id)
            .bind(params.status.map(|s| s.as_str()))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Write every mutable field of `workflow` if the stored version still
    /// equals `workflow.version`, bumping it.
    pub async fn update_versioned(
        conn: &mut PgConnection,
        workflow: &WorkflowInstance,
    ) -> Result<Option<WorkflowRow>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_instances SET \
                status = $3, \
                progress = $4, \
                started_at = $5, \
                completed_at = $6, \
                expected_completion_date = $7, \
                internal_notes = $8, \
                client_notes = $9, \
                version = version + 1 \
             WHERE id = $1 AND version = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(workflow.id)
            .bind(workflow.version)
            .bind(workflow.status.as_str())
            .bind(workflow.progress)
            .bind(workflow.started_at)
            .bind(workflow.completed_at)
            .bind(workflow.expected_completion_date)
            .bind(&workflow.internal_notes)
            .bind(&workflow.client_notes)
            .fetch_optional(conn)
            .await
    }

    /// Stamp `assignment_started_at` unless the team is already assigned or
    /// a lease newer than `stale_before` is held.
    pub async fn try_acquire_lease(
        pool: &PgPool,
        id: DbId,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> Result<Option<WorkflowRow>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_instances SET \
                assignment_started_at = $2, \
                version = version + 1 \
             WHERE id = $1 \
               AND team_assigned = false \
               AND (assignment_started_at IS NULL OR assignment_started_at <= $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(id)
            .bind(now)
            .bind(stale_before)
            .fetch_optional(pool)
            .await
    }

    pub async fn release_lease(
        pool: &PgPool,
        id: DbId,
        team_assigned: bool,
    ) -> Result<Option<WorkflowRow>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_instances SET \
                assignment_started_at = NULL, \
                team_assigned = team_assigned OR $2, \
                version = version + 1 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(id)
            .bind(team_assigned)
            .fetch_optional(pool)
            .await
    }

    /// Delete at `expected_version`. Tasks and team rows cascade.
    ///
    /// Returns `true` if a row was deleted.
    pub async fn delete_versioned(
        conn: &mut PgConnection,
        id: DbId,
        expected_version: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM workflow_instances WHERE id = $1 AND version = $2")
            .bind(id)
            .bind(expected_version)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
