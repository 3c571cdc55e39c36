//! Skill matching and candidate ranking.
//!
//! The score is the fraction of a task's required skills that the employee
//! holds. Ranking is total and deterministic: score, then spare hours, then
//! open task count, then employee id.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Serialize;

use crate::types::{DbId, Hours};

/// Count how many of `required` skills are present in `skill_set`.
pub fn count_matching_skills(skill_set: &BTreeSet<String>, required: &BTreeSet<String>) -> usize {
    required.iter().filter(|s| skill_set.contains(*s)).count()
}

/// Fit of an employee for a task, in `0.0..=1.0`.
///
/// A task with no required skills scores 0 for everyone.
pub fn match_score(skill_set: &BTreeSet<String>, required: &BTreeSet<String>) -> f64 {
    count_matching_skills(skill_set, required) as f64 / required.len().max(1) as f64
}

/// An employee is skill-eligible unless the task requires skills and they hold none.
pub fn is_skill_eligible(skill_set: &BTreeSet<String>, required: &BTreeSet<String>) -> bool {
    required.is_empty() || count_matching_skills(skill_set, required) > 0
}

/// A ranked option for staffing a single task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub employee_id: DbId,
    pub score: f64,
    pub available_hours: Hours,
    pub open_task_count: i64,
}

/// Order two candidates best-first.
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.available_hours.total_cmp(&a.available_hours))
        .then_with(|| a.open_task_count.cmp(&b.open_task_count))
        .then_with(|| a.employee_id.cmp(&b.employee_id))
}

/// Sort candidates best-first in place.
pub fn rank_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(compare_candidates);
}
