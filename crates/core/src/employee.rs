//! Employee records and HR-side validation.
//!
//! Workload and project counters are owned by the capacity ledger
//! ([`crate::capacity`]); the DTOs here deliberately cannot set them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::{DbId, Hours, Timestamp};

/// Maximum number of skill tags an employee may carry.
const MAX_SKILLS: usize = 32;

/// Maximum length of a single skill tag.
const MAX_SKILL_LEN: usize = 64;

/// Hours in a week; no weekly budget may exceed it.
pub const MAX_WEEKLY_CAPACITY: Hours = 168.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeStatus {
    Active,
    Inactive,
}

impl EmployeeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EmployeeStatus::Active => "active",
            EmployeeStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "active" => Ok(EmployeeStatus::Active),
            "inactive" => Ok(EmployeeStatus::Inactive),
            other => Err(CoreError::Validation(format!(
                "Unknown employee status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for EmployeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An employee who can be staffed onto workflow tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: DbId,
    /// Reference to the underlying user account.
    pub user_id: DbId,
    pub employee_role: String,
    pub department: Option<String>,
    pub weekly_capacity: Hours,
    pub current_workload: Hours,
    pub current_project_count: i32,
    pub max_concurrent_projects: i32,
    pub available_for_work: bool,
    pub skill_set: BTreeSet<String>,
    pub status: EmployeeStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for onboarding a new employee.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateEmployee {
    pub user_id: DbId,
    #[validate(length(min = 1, max = 128))]
    pub employee_role: String,
    #[validate(length(max = 128))]
    pub department: Option<String>,
    #[validate(range(min = 0.0, max = 168.0))]
    pub weekly_capacity: Hours,
    #[validate(range(min = 1, max = 100))]
    pub max_concurrent_projects: i32,
    pub available_for_work: Option<bool>,
    #[serde(default)]
    pub skill_set: Vec<String>,
}

/// DTO for HR-style edits. All fields are optional.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateEmployee {
    #[validate(length(min = 1, max = 128))]
    pub employee_role: Option<String>,
    #[validate(length(max = 128))]
    pub department: Option<String>,
    #[validate(range(min = 0.0, max = 168.0))]
    pub weekly_capacity: Option<Hours>,
    #[validate(range(min = 1, max = 100))]
    pub max_concurrent_projects: Option<i32>,
    pub available_for_work: Option<bool>,
    pub skill_set: Option<Vec<String>>,
    pub status: Option<EmployeeStatus>,
}

impl CreateEmployee {
    /// Run field validation and normalise the skill tags in place.
    pub fn validate_and_normalize(&mut self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        validate_weekly_capacity(self.weekly_capacity)?;
        self.skill_set = normalize_skills(&self.skill_set)?.into_iter().collect();
        Ok(())
    }
}

impl UpdateEmployee {
    pub fn validate_and_normalize(&mut self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        if let Some(capacity) = self.weekly_capacity {
            validate_weekly_capacity(capacity)?;
        }
        if let Some(skills) = self.skill_set.take() {
            self.skill_set = Some(normalize_skills(&skills)?.into_iter().collect());
        }
        Ok(())
    }
}

fn validate_weekly_capacity(hours: Hours) -> Result<(), CoreError> {
    if !(hours > 0.0 && hours <= MAX_WEEKLY_CAPACITY) {
        return Err(CoreError::Validation(format!(
            "Weekly capacity must be in (0, {MAX_WEEKLY_CAPACITY}] hours, got {hours}"
        )));
    }
    Ok(())
}

/// Trim, lower-case and de-duplicate skill tags.
///
/// Rules:
/// - At most `MAX_SKILLS` distinct tags.
/// - Each tag must be non-empty after trimming and at most `MAX_SKILL_LEN` characters.
pub fn normalize_skills(tags: &[String]) -> Result<BTreeSet<String>, CoreError> {
    let mut out = BTreeSet::new();
    for (i, raw) in tags.iter().enumerate() {
        let tag = raw.trim().to_lowercase();
        if tag.is_empty() {
            return Err(CoreError::Validation(format!(
                "Skill tag at index {i} must not be empty"
            )));
        }
        if tag.chars().count() > MAX_SKILL_LEN {
            return Err(CoreError::Validation(format!(
                "Skill tag at index {i} exceeds {MAX_SKILL_LEN} characters"
            )));
        }
        out.insert(tag);
    }
    if out.len() > MAX_SKILLS {
        return Err(CoreError::Validation(format!(
            "At most {MAX_SKILLS} skill tags are allowed"
        )));
    }
    Ok(out)
}
