//! Repository for the `workflow_templates` table.

use agency_core::template::NewWorkflowTemplate;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::template::TemplateRow;

const COLUMNS: &str = "id, name, service_type, service_tier, estimated_duration_days, \
    estimated_hours, blueprints, milestones, created_at";

pub struct TemplateRepo;

impl TemplateRepo {
    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<TemplateRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflow_templates WHERE name = $1");
        sqlx::query_as::<_, TemplateRow>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// Insert the template, replacing the definition of an existing one with
    /// the same name. The id of a replaced template is kept.
    pub async fn upsert(pool: &PgPool, input: &NewWorkflowTemplate) -> Result<TemplateRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_templates \
                (name, service_type, service_tier, estimated_duration_days, \
                 estimated_hours, blueprints, milestones) \
             VALUES ($1, $2, $3, COALESCE($4, 1), $5, $6, $7) \
             ON CONFLICT ON CONSTRAINT uq_workflow_templates_name DO UPDATE SET \
                service_type = EXCLUDED.service_type, \
                service_tier = EXCLUDED.service_tier, \
                estimated_duration_days = EXCLUDED.estimated_duration_days, \
                estimated_hours = EXCLUDED.estimated_hours, \
                blueprints = EXCLUDED.blueprints, \
                milestones = EXCLUDED.milestones \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TemplateRow>(&query)
            .bind(input.name())
            .bind(&input.service_type)
            .bind(&input.service_tier)
            .bind(input.estimated_duration_days)
            .bind(input.estimated_hours())
            .bind(Json(&input.blueprints))
            .bind(Json(&input.milestones))
            .fetch_one(pool)
            .await
    }
}
