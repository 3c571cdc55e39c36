//! Workflow template lookup and registration.

use agency_core::capability::Capability;
use agency_core::error::CoreError;
use agency_core::template::{self, NewWorkflowTemplate, WorkflowTemplate};

use crate::{Actor, Engine};

impl Engine {
    /// The stored template for `(service_type, tier)`, lazily seeded from the
    /// built-in catalog on first use.
    pub async fn get_or_create_template(
        &self,
        service_type: &str,
        tier: &str,
    ) -> Result<WorkflowTemplate, CoreError> {
        let name = template::template_name(service_type, tier);
        if let Some(existing) = self.stores.templates.find_by_name(&name).await? {
            return Ok(existing);
        }

        let seed = template::default_template(service_type, tier)?;
        let created = self.stores.templates.upsert(&seed).await?;
        tracing::info!(
            template_id = created.id,
            name = %created.name,
            tasks = created.blueprints.len(),
            "Seeded default workflow template"
        );
        Ok(created)
    }

    pub async fn register_template(
        &self,
        actor: &Actor,
        mut input: NewWorkflowTemplate,
    ) -> Result<WorkflowTemplate, CoreError> {
        actor.require(Capability::ManageTemplates)?;
        input.validate_and_normalize()?;
        let saved = self.stores.templates.upsert(&input).await?;
        tracing::info!(template_id = saved.id, name = %saved.name, "Workflow template registered");
        Ok(saved)
    }
}
