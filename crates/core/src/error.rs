use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Workflow {workflow_id} already has a team assigned")]
    AlreadyAssigned { workflow_id: DbId },

    #[error("Task {task_id} cannot start: prerequisite tasks {pending:?} are not completed")]
    DependencyNotSatisfied { task_id: DbId, pending: Vec<DbId> },

    #[error("Sequence {sequence_id} already has an open assignment for lead {lead_id}")]
    DuplicateActiveAssignment { sequence_id: DbId, lead_id: DbId },

    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Store temporarily unavailable: {0}")]
    TransientStore(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::InvalidTransition`] built from displayable states.
    pub fn invalid_transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        CoreError::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
