//! Marketing sequences and their per-lead assignments.
//!
//! An assignment moves `pending -> active -> {paused, completed}`; every
//! transition yields exactly one audit activity that the store persists in
//! the same write as the new assignment state.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Maximum number of steps in one sequence.
const MAX_STEPS: usize = 100;

/// Maximum length of a sequence name.
const MAX_NAME_LEN: usize = 200;

// ---------------------------------------------------------------------------
// Sequence templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStatus {
    Draft,
    Pending,
    Approved,
    Active,
    Archived,
}

impl SequenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SequenceStatus::Draft => "draft",
            SequenceStatus::Pending => "pending",
            SequenceStatus::Approved => "approved",
            SequenceStatus::Active => "active",
            SequenceStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "draft" => Ok(SequenceStatus::Draft),
            "pending" => Ok(SequenceStatus::Pending),
            "approved" => Ok(SequenceStatus::Approved),
            "active" => Ok(SequenceStatus::Active),
            "archived" => Ok(SequenceStatus::Archived),
            other => Err(CoreError::Validation(format!(
                "Unknown sequence status '{other}'"
            ))),
        }
    }

    pub fn valid_transitions(self) -> &'static [SequenceStatus] {
        use SequenceStatus::*;
        match self {
            Draft => &[Pending, Archived],
            Pending => &[Approved, Draft],
            Approved => &[Active, Archived],
            Active => &[Archived],
            Archived => &[],
        }
    }

    pub fn can_transition(self, to: SequenceStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Only reviewed sequences may be attached to leads.
    pub fn is_assignable(self) -> bool {
        matches!(self, SequenceStatus::Approved | SequenceStatus::Active)
    }
}

impl fmt::Display for SequenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Email,
    Sms,
    Wait,
}

impl StepAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StepAction::Email => "email",
            StepAction::Sms => "sms",
            StepAction::Wait => "wait",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub order: i32,
    pub action: StepAction,
    /// Delay after the previous step before this one runs.
    #[serde(default)]
    pub delay_hours: f64,
    pub subject: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub status: SequenceStatus,
    /// Steps sorted by `order`.
    pub steps: Vec<SequenceStep>,
    pub created_by_id: Option<DbId>,
    pub approved_by_id: Option<DbId>,
    pub approved_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a sequence. New sequences start as `draft` unless a
/// status is given.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSequence {
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<SequenceStep>,
    pub status: Option<SequenceStatus>,
}

impl NewSequence {
    /// Validate the DTO and sort steps by `order`.
    pub fn validate_and_normalize(&mut self) -> Result<(), CoreError> {
        let name = self.name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(CoreError::Validation(format!(
                "Sequence name must be 1..={MAX_NAME_LEN} characters"
            )));
        }
        self.name = name.to_string();
        if self.steps.is_empty() {
            return Err(CoreError::Validation(
                "A sequence needs at least one step".into(),
            ));
        }
        if self.steps.len() > MAX_STEPS {
            return Err(CoreError::Validation(format!(
                "A sequence may have at most {MAX_STEPS} steps"
            )));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if !step.delay_hours.is_finite() || step.delay_hours < 0.0 {
                return Err(CoreError::Validation(format!(
                    "Step at index {i} has an invalid delay"
                )));
            }
            if step.action == StepAction::Email
                && step.subject.as_deref().map_or(true, |s| s.trim().is_empty())
            {
                return Err(CoreError::Validation(format!(
                    "Email step at index {i} requires a subject"
                )));
            }
        }
        self.steps.sort_by_key(|s| s.order);
        if self.steps.windows(2).any(|w| w[0].order == w[1].order) {
            return Err(CoreError::Validation("Step orders must be unique".into()));
        }
        Ok(())
    }
}

/// Apply a sequence review/lifecycle transition.
pub fn transition_sequence(
    sequence: &Sequence,
    to: SequenceStatus,
    actor_id: DbId,
    now: Timestamp,
) -> Result<Sequence, CoreError> {
    if !sequence.status.can_transition(to) {
        return Err(CoreError::invalid_transition("sequence", sequence.status, to));
    }
    let mut next = sequence.clone();
    next.status = to;
    next.updated_at = now;
    match to {
        SequenceStatus::Approved => {
            next.approved_by_id = Some(actor_id);
            next.approved_at = Some(now);
        }
        SequenceStatus::Draft => {
            next.approved_by_id = None;
            next.approved_at = None;
        }
        _ => {}
    }
    Ok(next)
}

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceAssignmentStatus {
    Pending,
    Active,
    Paused,
    Completed,
}

impl SequenceAssignmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SequenceAssignmentStatus::Pending => "pending",
            SequenceAssignmentStatus::Active => "active",
            SequenceAssignmentStatus::Paused => "paused",
            SequenceAssignmentStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(SequenceAssignmentStatus::Pending),
            "active" => Ok(SequenceAssignmentStatus::Active),
            "paused" => Ok(SequenceAssignmentStatus::Paused),
            "completed" => Ok(SequenceAssignmentStatus::Completed),
            other => Err(CoreError::Validation(format!(
                "Unknown sequence assignment status '{other}'"
            ))),
        }
    }

    pub fn valid_transitions(self) -> &'static [SequenceAssignmentStatus] {
        use SequenceAssignmentStatus::*;
        match self {
            Pending => &[Active, Completed],
            Active => &[Paused, Completed],
            Paused => &[Active, Completed],
            Completed => &[],
        }
    }

    pub fn can_transition(self, to: SequenceAssignmentStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Open assignments block another assignment of the same (sequence, lead).
    pub fn is_open(self) -> bool {
        matches!(
            self,
            SequenceAssignmentStatus::Pending | SequenceAssignmentStatus::Active
        )
    }

    /// Audit action type recorded when entering this status.
    pub fn activity_type(self) -> String {
        format!("sequence_{}", self.as_str())
    }
}

impl fmt::Display for SequenceAssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceAssignment {
    pub id: DbId,
    pub sequence_id: DbId,
    pub lead_id: DbId,
    pub status: SequenceAssignmentStatus,
    /// Index into the sequence's sorted steps of the next step to run.
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

/// Audit row appended on every assignment transition and executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceActivity {
    pub id: DbId,
    pub assignment_id: DbId,
    pub step_order: i32,
    pub action_type: String,
    pub result: serde_json::Value,
    pub created_at: Timestamp,
}

/// An activity not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSequenceActivity {
    pub step_order: i32,
    pub action_type: String,
    pub result: serde_json::Value,
}

/// DTO for attaching a sequence to a lead.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSequenceAssignment {
    pub sequence_id: DbId,
    pub lead_id: DbId,
    #[serde(default)]
    pub auto_start: bool,
    pub notes: Option<String>,
}

/// Build the not-yet-persisted `pending` assignment for a request.
pub fn new_assignment(
    input: &CreateSequenceAssignment,
    assigned_by_id: Option<DbId>,
    now: Timestamp,
) -> SequenceAssignment {
    SequenceAssignment {
        id: 0,
        sequence_id: input.sequence_id,
        lead_id: input.lead_id,
        status: SequenceAssignmentStatus::Pending,
        current_step: 0,
        started_at: None,
        paused_at: None,
        completed_at: None,
        notes: input.notes.clone(),
        assigned_by_id,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

/// Apply a status transition, returning the new state and its audit activity.
///
/// `notes`, when given, replaces the assignment's notes.
pub fn transition_assignment(
    assignment: &SequenceAssignment,
    to: SequenceAssignmentStatus,
    notes: Option<&str>,
    now: Timestamp,
) -> Result<(SequenceAssignment, NewSequenceActivity), CoreError> {
    let from = assignment.status;
    if !from.can_transition(to) {
        return Err(CoreError::invalid_transition("sequence assignment", from, to));
    }

    let mut next = assignment.clone();
    next.status = to;
    next.updated_at = now;
    match to {
        SequenceAssignmentStatus::Active => {
            next.paused_at = None;
            next.started_at.get_or_insert(now);
        }
        SequenceAssignmentStatus::Paused => {
            next.paused_at = Some(now);
        }
        SequenceAssignmentStatus::Completed => {
            next.completed_at = Some(now);
        }
        SequenceAssignmentStatus::Pending => {}
    }
    if let Some(notes) = notes {
        next.notes = Some(notes.to_string());
    }

    let activity = NewSequenceActivity {
        step_order: assignment.current_step,
        action_type: to.activity_type(),
        result: json!({
            "previousStatus": from.as_str(),
            "newStatus": to.as_str(),
        }),
    };
    Ok((next, activity))
}

/// Execute the current step of an active assignment.
///
/// Records a `step_<action>` activity and moves `current_step` forward.
/// Running the last step also completes the assignment, which appends its
/// own `sequence_completed` activity.
pub fn advance_assignment(
    assignment: &SequenceAssignment,
    sequence: &Sequence,
    now: Timestamp,
) -> Result<(SequenceAssignment, Vec<NewSequenceActivity>), CoreError> {
    if assignment.status != SequenceAssignmentStatus::Active {
        return Err(CoreError::invalid_transition(
            "sequence assignment",
            assignment.status,
            "step execution",
        ));
    }

    let index = usize::try_from(assignment.current_step).unwrap_or(usize::MAX);
    let mut activities = Vec::with_capacity(2);
    let mut next = assignment.clone();

    if let Some(step) = sequence.steps.get(index) {
        activities.push(NewSequenceActivity {
            step_order: assignment.current_step,
            action_type: format!("step_{}", step.action.as_str()),
            result: json!({
                "order": step.order,
                "action": step.action.as_str(),
                "subject": step.subject,
            }),
        });
        next.current_step += 1;
        next.updated_at = now;
    }

    if usize::try_from(next.current_step).unwrap_or(usize::MAX) >= sequence.steps.len() {
        let (completed, activity) =
            transition_assignment(&next, SequenceAssignmentStatus::Completed, None, now)?;
        next = completed;
        activities.push(activity);
    }
    Ok((next, activities))
}
