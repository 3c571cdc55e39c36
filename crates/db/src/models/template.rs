use agency_core::template::{Milestone, TaskBlueprint, WorkflowTemplate};
use agency_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `workflow_templates` table. Blueprints and milestones are
/// JSONB arrays.
#[derive(Debug, Clone, FromRow)]
pub struct TemplateRow {
    pub id: DbId,
    pub name: String,
    pub service_type: String,
    pub service_tier: String,
    pub estimated_duration_days: i32,
    pub estimated_hours: f64,
    pub blueprints: Json<Vec<TaskBlueprint>>,
    pub milestones: Json<Vec<Milestone>>,
    pub created_at: Timestamp,
}

impl From<TemplateRow> for WorkflowTemplate {
    fn from(row: TemplateRow) -> Self {
        WorkflowTemplate {
            id: row.id,
            name: row.name,
            service_type: row.service_type,
            service_tier: row.service_tier,
            estimated_duration_days: row.estimated_duration_days,
            estimated_hours: row.estimated_hours,
            blueprints: row.blueprints.0,
            milestones: row.milestones.0,
            created_at: row.created_at,
        }
    }
}
