//! Marketing sequences and their per-lead assignments.

use agency_core::capability::Capability;
use agency_core::error::CoreError;
use agency_core::repository::StoreError;
use agency_core::sequence::{
    self, CreateSequenceAssignment, NewSequence, Sequence, SequenceActivity, SequenceAssignment,
    SequenceAssignmentStatus, SequenceStatus,
};
use agency_core::types::DbId;
use agency_events::{kinds, DomainEvent};
use chrono::Utc;

use crate::retry::{with_retry, Attempt};
use crate::{Actor, Engine};

/// Map the store's uniqueness failure onto the domain error for this pair.
fn duplicate_for(sequence_id: DbId, lead_id: DbId) -> impl Fn(StoreError) -> Attempt {
    move |err| match err {
        StoreError::DuplicateOpenAssignment => {
            Attempt::Fail(CoreError::DuplicateActiveAssignment {
                sequence_id,
                lead_id,
            })
        }
        other => other.into(),
    }
}

impl Engine {
    // -- sequences ----------------------------------------------------------

    pub async fn create_sequence(
        &self,
        actor: &Actor,
        mut input: NewSequence,
    ) -> Result<Sequence, CoreError> {
        actor.require(Capability::ManageSequences)?;
        input.validate_and_normalize()?;
        match input.status {
            None | Some(SequenceStatus::Draft) | Some(SequenceStatus::Pending) => {}
            Some(other) => {
                return Err(CoreError::Validation(format!(
                    "New sequences start as draft or pending, not {other}"
                )));
            }
        }
        let created = self
            .stores
            .sequences
            .create_sequence(&input, actor.user_id)
            .await?;
        tracing::info!(sequence_id = created.id, steps = created.steps.len(), "Sequence created");
        Ok(created)
    }

    pub async fn get_sequence(&self, id: DbId) -> Result<Sequence, CoreError> {
        self.stores
            .sequences
            .find_sequence(id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "sequence",
                id,
            })
    }

    pub async fn list_sequences(&self) -> Result<Vec<Sequence>, CoreError> {
        Ok(self.stores.sequences.list_sequences().await?)
    }

    /// Review lifecycle. Approving needs `ApproveSequences`; every other
    /// move needs `ManageSequences`.
    pub async fn update_sequence_status(
        &self,
        actor: &Actor,
        id: DbId,
        to: SequenceStatus,
    ) -> Result<Sequence, CoreError> {
        if to == SequenceStatus::Approved {
            actor.require(Capability::ApproveSequences)?;
        } else {
            actor.require(Capability::ManageSequences)?;
        }
        let current = self.get_sequence(id).await?;
        let next = sequence::transition_sequence(&current, to, actor.user_id, Utc::now())?;
        let saved = self.stores.sequences.update_sequence(&next).await?;

        tracing::info!(sequence_id = id, from = %current.status, to = %saved.status, "Sequence status changed");
        self.publish(
            DomainEvent::new(kinds::SEQUENCE_STATUS_CHANGED)
                .with_source(kinds::ENTITY_SEQUENCE, id)
                .with_actor(Some(actor.user_id))
                .with_payload(serde_json::json!({
                    "from": current.status.as_str(),
                    "to": saved.status.as_str(),
                })),
        );
        Ok(saved)
    }

    // -- assignments --------------------------------------------------------

    /// Bind a sequence to a lead, optionally starting it straight away.
    ///
    /// At most one pending or active assignment may exist per pair.
    pub async fn create_sequence_assignment(
        &self,
        actor: &Actor,
        input: CreateSequenceAssignment,
    ) -> Result<SequenceAssignment, CoreError> {
        actor.require(Capability::ManageSequences)?;

        let seq = self.get_sequence(input.sequence_id).await?;
        if !seq.status.is_assignable() {
            return Err(CoreError::Conflict(format!(
                "Sequence {} is {} and cannot be assigned",
                seq.id, seq.status
            )));
        }
        if !self.stores.sequences.lead_exists(input.lead_id).await? {
            return Err(CoreError::NotFound {
                entity: "lead",
                id: input.lead_id,
            });
        }

        let now = Utc::now();
        let mut assignment = sequence::new_assignment(&input, Some(actor.user_id), now);
        let mut activities = Vec::new();
        if input.auto_start {
            let (started, activity) = sequence::transition_assignment(
                &assignment,
                SequenceAssignmentStatus::Active,
                None,
                now,
            )?;
            assignment = started;
            activities.push(activity);
        }

        let created = self
            .stores
            .sequences
            .insert_assignment(&assignment, &activities)
            .await
            .map_err(|e| match e {
                StoreError::DuplicateOpenAssignment => CoreError::DuplicateActiveAssignment {
                    sequence_id: input.sequence_id,
                    lead_id: input.lead_id,
                },
                other => other.into(),
            })?;

        tracing::info!(
            assignment_id = created.id,
            sequence_id = created.sequence_id,
            lead_id = created.lead_id,
            status = %created.status,
            "Sequence assignment created"
        );
        self.publish(
            DomainEvent::new(kinds::SEQUENCE_ASSIGNMENT_CREATED)
                .with_source(kinds::ENTITY_SEQUENCE_ASSIGNMENT, created.id)
                .with_actor(Some(actor.user_id))
                .with_payload(serde_json::json!({
                    "sequenceId": created.sequence_id,
                    "leadId": created.lead_id,
                    "status": created.status.as_str(),
                })),
        );
        Ok(created)
    }

    pub async fn get_sequence_assignment(&self, id: DbId) -> Result<SequenceAssignment, CoreError> {
        self.stores
            .sequences
            .find_assignment(id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "sequence_assignment",
                id,
            })
    }

    /// Operator-driven transition; appends one audit activity.
    pub async fn update_sequence_assignment_status(
        &self,
        actor: &Actor,
        id: DbId,
        to: SequenceAssignmentStatus,
        notes: Option<String>,
    ) -> Result<SequenceAssignment, CoreError> {
        actor.require(Capability::ManageSequences)?;

        let (from, updated) = with_retry(
            &self.config.retry,
            "update_sequence_assignment_status",
            || async {
                let current = self.get_sequence_assignment(id).await?;
                let (next, activity) = sequence::transition_assignment(
                    &current,
                    to,
                    notes.as_deref(),
                    Utc::now(),
                )?;
                let saved = self
                    .stores
                    .sequences
                    .commit_assignment(&next, &[activity])
                    .await
                    .map_err(duplicate_for(current.sequence_id, current.lead_id))?;
                Ok::<_, Attempt>((current.status, saved))
            },
        )
        .await?;

        tracing::info!(assignment_id = id, from = %from, to = %updated.status, "Sequence assignment status changed");
        self.publish_assignment_status(actor, &updated, from);
        Ok(updated)
    }

    /// Execute the current step of an active assignment.
    pub async fn advance_sequence_assignment(
        &self,
        actor: &Actor,
        id: DbId,
    ) -> Result<SequenceAssignment, CoreError> {
        actor.require(Capability::ManageSequences)?;

        let (from, executed_step, updated) =
            with_retry(&self.config.retry, "advance_sequence_assignment", || async {
                let current = self.get_sequence_assignment(id).await?;
                let seq = self.get_sequence(current.sequence_id).await?;
                let (next, activities) = sequence::advance_assignment(&current, &seq, Utc::now())?;
                let saved = self
                    .stores
                    .sequences
                    .commit_assignment(&next, &activities)
                    .await
                    .map_err(duplicate_for(current.sequence_id, current.lead_id))?;
                Ok::<_, Attempt>((current.status, current.current_step, saved))
            })
            .await?;

        tracing::info!(
            assignment_id = id,
            step = executed_step,
            status = %updated.status,
            "Sequence step executed"
        );
        self.publish(
            DomainEvent::new(kinds::SEQUENCE_ASSIGNMENT_STEP_EXECUTED)
                .with_source(kinds::ENTITY_SEQUENCE_ASSIGNMENT, id)
                .with_actor(Some(actor.user_id))
                .with_payload(serde_json::json!({
                    "step": executed_step,
                    "currentStep": updated.current_step,
                })),
        );
        if updated.status != from {
            self.publish_assignment_status(actor, &updated, from);
        }
        Ok(updated)
    }

    pub async fn list_sequence_activities(
        &self,
        assignment_id: DbId,
    ) -> Result<Vec<SequenceActivity>, CoreError> {
        self.get_sequence_assignment(assignment_id).await?;
        Ok(self.stores.sequences.list_activities(assignment_id).await?)
    }

    fn publish_assignment_status(
        &self,
        actor: &Actor,
        assignment: &SequenceAssignment,
        from: SequenceAssignmentStatus,
    ) {
        self.publish(
            DomainEvent::new(kinds::SEQUENCE_ASSIGNMENT_STATUS_CHANGED)
                .with_source(kinds::ENTITY_SEQUENCE_ASSIGNMENT, assignment.id)
                .with_actor(Some(actor.user_id))
                .with_payload(serde_json::json!({
                    "sequenceId": assignment.sequence_id,
                    "leadId": assignment.lead_id,
                    "from": from.as_str(),
                    "to": assignment.status.as_str(),
                })),
        );
    }
}
