use agency_core::repository::StoreError;
use agency_core::sequence::{
    Sequence, SequenceActivity, SequenceAssignment, SequenceAssignmentStatus, SequenceStatus,
    SequenceStep,
};
use agency_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

use super::corrupt_row;

/// A row from the `sequences` table; `steps` is a JSONB array kept sorted
/// by step order.
#[derive(Debug, Clone, FromRow)]
pub struct SequenceRow {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub steps: Json<Vec<SequenceStep>>,
    pub created_by_id: Option<DbId>,
    pub approved_by_id: Option<DbId>,
    pub approved_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<SequenceRow> for Sequence {
    type Error = StoreError;

    fn try_from(row: SequenceRow) -> Result<Self, Self::Error> {
        Ok(Sequence {
            id: row.id,
            name: row.name,
            description: row.description,
            status: SequenceStatus::parse(&row.status).map_err(|e| corrupt_row("sequences", e))?,
            steps: row.steps.0,
            created_by_id: row.created_by_id,
            approved_by_id: row.approved_by_id,
            approved_at: row.approved_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SequenceAssignmentRow {
    pub id: DbId,
    pub sequence_id: DbId,
    pub lead_id: DbId,
    pub status: String,
    pub current_step: i32,
    pub started_at: Option<Timestamp>,
    pub paused_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub notes: Option<String>,
    pub assigned_by_id: Option<DbId>,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<SequenceAssignmentRow> for SequenceAssignment {
    type Error = StoreError;

    fn try_from(row: SequenceAssignmentRow) -> Result<Self, Self::Error> {
        Ok(SequenceAssignment {
            id: row.id,
            sequence_id: row.sequence_id,
            lead_id: row.lead_id,
            status: SequenceAssignmentStatus::parse(&row.status)
                .map_err(|e| corrupt_row("sequence_assignments", e))?,
            current_step: row.current_step,
            started_at: row.started_at,
            paused_at: row.paused_at,
            completed_at: row.completed_at,
            notes: row.notes,
            assigned_by_id: row.assigned_by_id,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SequenceActivityRow {
    pub id: DbId,
    pub assignment_id: DbId,
    pub step_order: i32,
    pub action_type: String,
    pub result: serde_json::Value,
    pub created_at: Timestamp,
}

impl From<SequenceActivityRow> for SequenceActivity {
    fn from(row: SequenceActivityRow) -> Self {
        SequenceActivity {
            id: row.id,
            assignment_id: row.assignment_id,
            step_order: row.step_order,
            action_type: row.action_type,
            result: row.result,
            created_at: row.created_at,
        }
    }
}
