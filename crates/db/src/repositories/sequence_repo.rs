//! Repository for `sequences`, `sequence_assignments` and
//! `sequence_activities`.

use agency_core::sequence::{NewSequence, NewSequenceActivity, Sequence, SequenceAssignment};
use agency_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::models::sequence::{SequenceActivityRow, SequenceAssignmentRow, SequenceRow};

const SEQUENCE_COLUMNS: &str = "id, name, description, status, steps, created_by_id, \
    approved_by_id, approved_at, created_at, updated_at";

const ASSIGNMENT_COLUMNS: &str = "id, sequence_id, lead_id, status, current_step, started_at, \
    paused_at, completed_at, notes, assigned_by_id, version, created_at, updated_at";

const ACTIVITY_COLUMNS: &str = "id, assignment_id, step_order, action_type, result, created_at";

/// Name of the partial unique index guarding open (sequence, lead) pairs.
pub const OPEN_ASSIGNMENT_INDEX: &str = "uq_sequence_assignments_open";

pub struct SequenceRepo;

impl SequenceRepo {
    // -- sequences ----------------------------------------------------------

    pub async fn create(
        pool: &PgPool,
        input: &NewSequence,
        created_by_id: DbId,
    ) -> Result<SequenceRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO sequences (name, description, status, steps, created_by_id) \
             VALUES ($1, $2, COALESCE($3, 'draft'), $4, $5) \
             RETURNING {SEQUENCE_COLUMNS}"
        );
        sqlx::query_as::<_, SequenceRow>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.status.map(|s| s.as_str()))
            .bind(Json(&input.steps))
            .bind(created_by_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<SequenceRow>, sqlx::Error> {
        let query = format!("SELECT {SEQUENCE_COLUMNS} FROM sequences WHERE id = $1");
        sqlx::query_as::<_, SequenceRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<SequenceRow>, sqlx::Error> {
        let query = format!("SELECT {SEQUENCE_COLUMNS} FROM sequences ORDER BY id");
        sqlx::query_as::<_, SequenceRow>(&query).fetch_all(pool).await
    }

    /// Persist status and approval fields. Last writer wins.
    pub async fn update_status(
        pool: &PgPool,
        sequence: &Sequence,
    ) -> Result<Option<SequenceRow>, sqlx::Error> {
        let query = format!(
            "UPDATE sequences SET status = $2, approved_by_id = $3, approved_at = $4 \
             WHERE id = $1 \
             RETURNING {SEQUENCE_COLUMNS}"
        );
        sqlx::query_as::<_, SequenceRow>(&query)
            .bind(sequence.id)
            .bind(sequence.status.as_str())
            .bind(sequence.approved_by_id)
            .bind(sequence.approved_at)
            .fetch_optional(pool)
            .await
    }

    // -- assignments --------------------------------------------------------

    /// Insert a new assignment. A second open row for the same pair fails
    /// on [`OPEN_ASSIGNMENT_INDEX`].
    pub async fn insert_assignment(
        conn: &mut PgConnection,
        assignment: &SequenceAssignment,
    ) -> Result<SequenceAssignmentRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO sequence_assignments \
                (sequence_id, lead_id, status, current_step, started_at, paused_at, \
                 completed_at, notes, assigned_by_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10) \
             RETURNING {ASSIGNMENT_COLUMNS}"
        );
        sqlx::query_as::<_, SequenceAssignmentRow>(&query)
            .bind(assignment.sequence_id)
            .bind(assignment.lead_id)
            .bind(assignment.status.as_str())
            .bind(assignment.current_step)
            .bind(assignment.started_at)
            .bind(assignment.paused_at)
            .bind(assignment.completed_at)
            .bind(&assignment.notes)
            .bind(assignment.assigned_by_id)
            .bind(assignment.created_at)
            .fetch_one(conn)
            .await
    }

    pub async fn find_assignment(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<SequenceAssignmentRow>, sqlx::Error> {
        let query = format!("SELECT {ASSIGNMENT_COLUMNS} FROM sequence_assignments WHERE id = $1");
        sqlx::query_as::<_, SequenceAssignmentRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Compare-and-swap on `version`.
    pub async fn update_assignment_versioned(
        conn: &mut PgConnection,
        assignment: &SequenceAssignment,
    ) -> Result<Option<SequenceAssignmentRow>, sqlx::Error> {
        let query = format!(
            "UPDATE sequence_assignments SET \
                status = $3, \
                current_step = $4, \
                started_at = $5, \
                paused_at = $6, \
                completed_at = $7, \
                notes = $8, \
                version = version + 1 \
             WHERE id = $1 AND version = $2 \
             RETURNING {ASSIGNMENT_COLUMNS}"
        );
        sqlx::query_as::<_, SequenceAssignmentRow>(&query)
            .bind(assignment.id)
            .bind(assignment.version)
            .bind(assignment.status.as_str())
            .bind(assignment.current_step)
            .bind(assignment.started_at)
            .bind(assignment.paused_at)
            .bind(assignment.completed_at)
            .bind(&assignment.notes)
            .fetch_optional(conn)
            .await
    }

    // -- activities ---------------------------------------------------------

    pub async fn insert_activity(
        conn: &mut PgConnection,
        assignment_id: DbId,
        activity: &NewSequenceActivity,
        now: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sequence_activities \
                (assignment_id, step_order, action_type, result, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(assignment_id)
        .bind(activity.step_order)
        .bind(&activity.action_type)
        .bind(&activity.result)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Activities of an assignment in insertion order.
    pub async fn list_activities(
        pool: &PgPool,
        assignment_id: DbId,
    ) -> Result<Vec<SequenceActivityRow>, sqlx::Error> {
        let query = format!(
            "SELECT {ACTIVITY_COLUMNS} FROM sequence_activities \
             WHERE assignment_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, SequenceActivityRow>(&query)
            .bind(assignment_id)
            .fetch_all(pool)
            .await
    }
}
