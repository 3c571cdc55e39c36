//! Event type and source entity names.

pub const WORKFLOW_CREATED: &str = "workflow.created";
pub const WORKFLOW_TEAM_ASSIGNED: &str = "workflow.team_assigned";
pub const WORKFLOW_STATUS_CHANGED: &str = "workflow.status_changed";
pub const WORKFLOW_DELETED: &str = "workflow.deleted";
pub const TASK_STATUS_CHANGED: &str = "task.status_changed";
pub const TASK_REASSIGNED: &str = "task.reassigned";
pub const SEQUENCE_STATUS_CHANGED: &str = "sequence.status_changed";
pub const SEQUENCE_ASSIGNMENT_CREATED: &str = "sequence_assignment.created";
pub const SEQUENCE_ASSIGNMENT_STATUS_CHANGED: &str = "sequence_assignment.status_changed";
pub const SEQUENCE_ASSIGNMENT_STEP_EXECUTED: &str = "sequence_assignment.step_executed";

pub const ENTITY_WORKFLOW: &str = "workflow";
pub const ENTITY_TASK: &str = "task";
pub const ENTITY_SEQUENCE: &str = "sequence";
pub const ENTITY_SEQUENCE_ASSIGNMENT: &str = "sequence_assignment";
