//! Workflow instance lifecycle: creation, reads, explicit status changes,
//! notes and deletion.

use agency_core::capability::{Capability, Role};
use agency_core::error::CoreError;
use agency_core::repository::WorkflowCommit;
use agency_core::types::DbId;
use agency_core::workflow::{
    self, ServiceDetails, WorkflowDetail, WorkflowInstance, WorkflowListQuery, WorkflowStatus,
};
use agency_events::{kinds, DomainEvent};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::assignment::AssignTeamResult;
use crate::retry::{with_retry, Attempt};
use crate::{Actor, Engine};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflowRequest {
    /// Owning (client) user.
    pub user_id: DbId,
    pub service_type: String,
    #[serde(flatten)]
    pub details: ServiceDetails,
    /// Run team assignment right after creation.
    #[serde(default)]
    pub auto_assign: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedWorkflow {
    #[serde(flatten)]
    pub detail: WorkflowDetail,
    pub assignment: Option<AssignTeamResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateWorkflowNotes {
    pub internal_notes: Option<String>,
    pub client_notes: Option<String>,
}

impl Engine {
    pub async fn create_workflow(
        &self,
        actor: &Actor,
        request: CreateWorkflowRequest,
    ) -> Result<CreatedWorkflow, CoreError> {
        actor.require(Capability::ManageWorkflows)?;
        if request.details.service_name.trim().is_empty() {
            return Err(CoreError::Validation("service_name must not be empty".into()));
        }
        if request.details.service_amount_cents < 0 {
            return Err(CoreError::Validation(
                "service_amount_cents must not be negative".into(),
            ));
        }

        let template = self
            .get_or_create_template(&request.service_type, &request.details.service_tier)
            .await?;
        let now = Utc::now();
        let (instance, tasks) =
            workflow::instantiate(&template, request.user_id, &request.details, now);
        let detail = self
            .stores
            .workflows
            .create_instance(&instance, &tasks, now)
            .await?;
        let workflow_id = detail.workflow.id;

        tracing::info!(
            workflow_id,
            template_id = template.id,
            user_id = request.user_id,
            tasks = detail.tasks.len(),
            "Workflow created"
        );
        self.publish(
            DomainEvent::new(kinds::WORKFLOW_CREATED)
                .with_source(kinds::ENTITY_WORKFLOW, workflow_id)
                .with_actor(Some(actor.user_id))
                .with_payload(serde_json::json!({
                    "templateId": template.id,
                    "serviceName": detail.workflow.service_name,
                    "serviceTier": detail.workflow.service_tier,
                    "taskCount": detail.tasks.len(),
                })),
        );

        if !request.auto_assign {
            return Ok(CreatedWorkflow {
                detail,
                assignment: None,
            });
        }

        let assignment = self.assign_team(actor, workflow_id).await?;
        let detail = self.load_detail(workflow_id).await?;
        Ok(CreatedWorkflow {
            detail,
            assignment: Some(assignment),
        })
    }

    /// Instance with its tasks and team. Clients only see their own
    /// workflows, filtered to client-visible content.
    pub async fn get_workflow(&self, actor: &Actor, id: DbId) -> Result<WorkflowDetail, CoreError> {
        actor.require(Capability::ViewWorkflows)?;
        let detail = self.load_detail(id).await?;
        if actor.role == Role::Client {
            if detail.workflow.user_id != actor.user_id {
                return Err(CoreError::NotFound {
                    entity: "workflow",
                    id,
                });
            }
            return Ok(detail.client_view());
        }
        Ok(detail)
    }

    pub async fn list_workflows(
        &self,
        actor: &Actor,
        mut query: WorkflowListQuery,
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        actor.require(Capability::ViewWorkflows)?;
        if actor.role == Role::Client {
            query.user_id = Some(actor.user_id);
        }
        let mut workflows = self.stores.workflows.list(&query).await?;
        if actor.role == Role::Client {
            for wf in &mut workflows {
                wf.internal_notes = None;
            }
        }
        Ok(workflows)
    }

    /// Explicit status change. Cancelling releases every open reservation.
    pub async fn update_workflow_status(
        &self,
        actor: &Actor,
        id: DbId,
        to: WorkflowStatus,
    ) -> Result<WorkflowInstance, CoreError> {
        actor.require(Capability::ManageWorkflows)?;

        let (from, updated) = with_retry(&self.config.retry, "update_workflow_status", || async {
            let detail = self.load_detail(id).await?;
            let now = Utc::now();
            let next = workflow::transition_workflow(&detail.workflow, to, &detail.tasks, now)?;
            let releases = if to == WorkflowStatus::Cancelled {
                workflow::releases_for_open_tasks(&detail.tasks)
            } else {
                Vec::new()
            };
            let committed = self
                .stores
                .workflows
                .commit(&WorkflowCommit {
                    workflow: next,
                    tasks: Vec::new(),
                    reservations: Vec::new(),
                    releases,
                })
                .await?;
            Ok::<_, Attempt>((detail.workflow.status, committed.workflow))
        })
        .await?;

        tracing::info!(workflow_id = id, from = %from, to = %to, "Workflow status changed");
        self.publish_workflow_status(actor, &updated, from);
        Ok(updated)
    }

    /// Replace internal and/or client notes. Progress is never touched here.
    pub async fn update_workflow_notes(
        &self,
        actor: &Actor,
        id: DbId,
        notes: UpdateWorkflowNotes,
    ) -> Result<WorkflowInstance, CoreError> {
        actor.require(Capability::ManageWorkflows)?;
        with_retry(&self.config.retry, "update_workflow_notes", || async {
            let mut wf = self
                .stores
                .workflows
                .find_by_id(id)
                .await?
                .ok_or(CoreError::NotFound {
                    entity: "workflow",
                    id,
                })?;
            if let Some(internal) = &notes.internal_notes {
                wf.internal_notes = Some(internal.clone());
            }
            if let Some(client) = &notes.client_notes {
                wf.client_notes = Some(client.clone());
            }
            wf.updated_at = Utc::now();
            let committed = self
                .stores
                .workflows
                .commit(&WorkflowCommit::workflow_only(wf))
                .await?;
            Ok::<_, Attempt>(committed.workflow)
        })
        .await
    }

    /// Admin-only removal. Open reservations are released first unless the
    /// workflow already released them on completion or cancellation.
    pub async fn delete_workflow(&self, actor: &Actor, id: DbId) -> Result<(), CoreError> {
        actor.require(Capability::ManageWorkflows)?;
        if actor.role != Role::Admin {
            return Err(CoreError::Forbidden(
                "Only administrators may delete workflows".into(),
            ));
        }

        with_retry(&self.config.retry, "delete_workflow", || async {
            let detail = self.load_detail(id).await?;
            let releases = if detail.workflow.status.is_terminal() {
                Vec::new()
            } else {
                workflow::releases_for_open_tasks(&detail.tasks)
            };
            self.stores
                .workflows
                .delete(id, detail.workflow.version, &releases)
                .await?;
            Ok::<_, Attempt>(())
        })
        .await?;

        tracing::info!(workflow_id = id, "Workflow deleted");
        self.publish(
            DomainEvent::new(kinds::WORKFLOW_DELETED)
                .with_source(kinds::ENTITY_WORKFLOW, id)
                .with_actor(Some(actor.user_id)),
        );
        Ok(())
    }

    pub(crate) async fn load_detail(&self, id: DbId) -> Result<WorkflowDetail, CoreError> {
        self.stores
            .workflows
            .find_detail(id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "workflow",
                id,
            })
    }

    pub(crate) fn publish_workflow_status(
        &self,
        actor: &Actor,
        workflow: &WorkflowInstance,
        from: WorkflowStatus,
    ) {
        self.publish(
            DomainEvent::new(kinds::WORKFLOW_STATUS_CHANGED)
                .with_source(kinds::ENTITY_WORKFLOW, workflow.id)
                .with_actor(Some(actor.user_id))
                .with_payload(serde_json::json!({
                    "from": from.as_str(),
                    "to": workflow.status.as_str(),
                    "progress": workflow.progress,
                })),
        );
    }
}
