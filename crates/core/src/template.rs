//! Workflow templates and task blueprints.
//!
//! Templates are keyed by `"<service_type>:<tier>"`. A template that has not
//! been registered is created lazily from the built-in catalog in
//! [`default_template`].

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::employee::normalize_skills;
use crate::error::CoreError;
use crate::types::{DbId, Hours, Timestamp};

/// Known service tiers with their effort multiplier.
pub const TIERS: &[(&str, f64)] = &[("basic", 1.0), ("standard", 1.5), ("premium", 2.0)];

/// Productive hours assumed per working day when deriving a duration.
const HOURS_PER_DAY: f64 = 6.0;

/// Maximum number of blueprints in one template.
const MAX_BLUEPRINTS: usize = 200;

/// Template-level definition of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskBlueprint {
    /// Identifier unique within the template; referenced by `dependencies`.
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    pub order: i32,
    pub estimated_hours: Hours,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_visible")]
    pub visible_to_client: bool,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub title: String,
    /// Days after the workflow starts.
    pub day_offset: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: DbId,
    pub name: String,
    pub service_type: String,
    pub service_tier: String,
    pub estimated_duration_days: i32,
    pub estimated_hours: Hours,
    pub blueprints: Vec<TaskBlueprint>,
    pub milestones: Vec<Milestone>,
    pub created_at: Timestamp,
}

/// DTO for registering (upserting) a template.
#[derive(Debug, Clone, Deserialize)]
pub struct NewWorkflowTemplate {
    pub service_type: String,
    pub service_tier: String,
    pub estimated_duration_days: Option<i32>,
    pub blueprints: Vec<TaskBlueprint>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

impl NewWorkflowTemplate {
    /// Cache key for this template.
    pub fn name(&self) -> String {
        template_name(&self.service_type, &self.service_tier)
    }

    /// Total estimated hours across all blueprints.
    pub fn estimated_hours(&self) -> Hours {
        self.blueprints.iter().map(|b| b.estimated_hours).sum()
    }

    /// Validate blueprints and normalise skills, filling in a derived duration.
    pub fn validate_and_normalize(&mut self) -> Result<(), CoreError> {
        self.service_type = normalize_key(&self.service_type, "service_type")?;
        self.service_tier = normalize_key(&self.service_tier, "service_tier")?;
        validate_blueprints(&self.blueprints)?;
        for bp in &mut self.blueprints {
            bp.required_skills = normalize_skills(&bp.required_skills)?.into_iter().collect();
        }
        match self.estimated_duration_days {
            Some(days) if days < 0 => {
                return Err(CoreError::Validation(
                    "estimated_duration_days must not be negative".into(),
                ));
            }
            Some(_) => {}
            None => self.estimated_duration_days = Some(duration_days(self.estimated_hours())),
        }
        Ok(())
    }
}

fn normalize_key(raw: &str, field: &str) -> Result<String, CoreError> {
    let key = raw.trim().to_lowercase();
    if key.is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(key)
}

/// Cache key of the template for a (service type, tier) pair.
pub fn template_name(service_type: &str, tier: &str) -> String {
    format!(
        "{}:{}",
        service_type.trim().to_lowercase(),
        tier.trim().to_lowercase()
    )
}

fn duration_days(hours: Hours) -> i32 {
    (hours / HOURS_PER_DAY).ceil().max(1.0) as i32
}

/// Effort multiplier for a tier, or `Validation` for unknown tiers.
pub fn tier_multiplier(tier: &str) -> Result<f64, CoreError> {
    let tier = tier.trim().to_lowercase();
    TIERS
        .iter()
        .find(|(name, _)| *name == tier)
        .map(|(_, m)| *m)
        .ok_or_else(|| {
            let known: Vec<&str> = TIERS.iter().map(|(n, _)| *n).collect();
            CoreError::Validation(format!(
                "Unknown service tier '{tier}'. Must be one of: {}",
                known.join(", ")
            ))
        })
}

/// Check blueprint structure.
///
/// Rules:
/// - At least one and at most `MAX_BLUEPRINTS` blueprints.
/// - Keys are unique and non-empty; titles are non-empty.
/// - Estimated hours are finite and not negative.
/// - Dependencies reference existing keys and form no cycle.
pub fn validate_blueprints(blueprints: &[TaskBlueprint]) -> Result<(), CoreError> {
    if blueprints.is_empty() {
        return Err(CoreError::Validation(
            "A template needs at least one task blueprint".into(),
        ));
    }
    if blueprints.len() > MAX_BLUEPRINTS {
        return Err(CoreError::Validation(format!(
            "A template may have at most {MAX_BLUEPRINTS} blueprints"
        )));
    }

    let mut keys = HashSet::with_capacity(blueprints.len());
    for bp in blueprints {
        if bp.key.trim().is_empty() {
            return Err(CoreError::Validation("Blueprint key must not be empty".into()));
        }
        if bp.title.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Blueprint '{}' must have a title",
                bp.key
            )));
        }
        if !bp.estimated_hours.is_finite() || bp.estimated_hours < 0.0 {
            return Err(CoreError::Validation(format!(
                "Blueprint '{}' has invalid estimated_hours",
                bp.key
            )));
        }
        if !keys.insert(bp.key.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate blueprint key: \"{}\"",
                bp.key
            )));
        }
    }
    for bp in blueprints {
        for dep in &bp.dependencies {
            if !keys.contains(dep.as_str()) {
                return Err(CoreError::Validation(format!(
                    "Blueprint '{}' depends on unknown blueprint '{dep}'",
                    bp.key
                )));
            }
        }
    }

    let nodes: Vec<(String, i32, Vec<String>)> = blueprints
        .iter()
        .map(|bp| (bp.key.clone(), bp.order, bp.dependencies.clone()))
        .collect();
    dependency_order(&nodes)?;
    Ok(())
}

/// Topologically order `(key, order, dependencies)` nodes.
///
/// Among nodes whose dependencies are satisfied, lower `order` comes first,
/// then lower key. Dependencies on keys not present are ignored. A cycle is
/// a `Validation` error.
pub fn dependency_order<K>(nodes: &[(K, i32, Vec<K>)]) -> Result<Vec<K>, CoreError>
where
    K: Ord + Clone + Display,
{
    let present: BTreeSet<&K> = nodes.iter().map(|(k, _, _)| k).collect();
    let mut remaining: BTreeMap<&K, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&K, Vec<&K>> = BTreeMap::new();
    let mut order_of: BTreeMap<&K, i32> = BTreeMap::new();

    for (key, order, deps) in nodes {
        order_of.insert(key, *order);
        let deps: BTreeSet<&K> = deps.iter().filter(|d| present.contains(d)).collect();
        remaining.insert(key, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(key);
        }
    }

    let mut ready: BTreeSet<(i32, &K)> = remaining
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(k, _)| (order_of[k], *k))
        .collect();
    let mut out = Vec::with_capacity(nodes.len());

    while let Some(next) = ready.pop_first() {
        let (_, key) = next;
        out.push(key.clone());
        for child in dependents.get(key).map(Vec::as_slice).unwrap_or_default() {
            if let Some(n) = remaining.get_mut(child) {
                *n -= 1;
                if *n == 0 {
                    ready.insert((order_of[child], *child));
                }
            }
        }
    }

    if out.len() != remaining.len() {
        let stuck: Vec<String> = remaining
            .iter()
            .filter(|(k, n)| **n > 0 && !out.contains(**k))
            .map(|(k, _)| k.to_string())
            .collect();
        return Err(CoreError::Validation(format!(
            "Dependency cycle between: {}",
            stuck.join(", ")
        )));
    }
    Ok(out)
}

/// The built-in template for a service type and tier.
///
/// A discovery phase feeds parallel build and content tracks, followed by
/// review and launch. Hours scale with the tier multiplier.
pub fn default_template(service_type: &str, tier: &str) -> Result<NewWorkflowTemplate, CoreError> {
    let service_type = normalize_key(service_type, "service_type")?;
    let tier = tier.trim().to_lowercase();
    let m = tier_multiplier(&tier)?;

    let bp = |key: &str, title: String, order: i32, hours: Hours, skills: &[&str], deps: &[&str]| {
        TaskBlueprint {
            key: key.to_string(),
            title,
            description: None,
            order,
            estimated_hours: hours * m,
            required_skills: skills.iter().map(|s| s.to_string()).collect(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            visible_to_client: key != "review",
        }
    };

    let blueprints = vec![
        bp("discovery", "Discovery & requirements".into(), 1, 4.0, &["strategy"], &[]),
        bp(
            "build",
            format!("Build {service_type} deliverables"),
            2,
            16.0,
            &[service_type.as_str()],
            &["discovery"],
        ),
        bp("content", "Content & copy".into(), 3, 8.0, &["copywriting"], &["discovery"]),
        bp("review", "Internal QA review".into(), 4, 4.0, &["qa"], &["build", "content"]),
        bp(
            "launch",
            "Client handoff & launch".into(),
            5,
            2.0,
            &[service_type.as_str()],
            &["review"],
        ),
    ];

    let mut template = NewWorkflowTemplate {
        service_type,
        service_tier: tier,
        estimated_duration_days: None,
        milestones: Vec::new(),
        blueprints,
    };
    template.validate_and_normalize()?;
    let days = template.estimated_duration_days.unwrap_or(1);
    template.milestones = vec![
        Milestone { title: "Kickoff".into(), day_offset: 0 },
        Milestone { title: "Review ready".into(), day_offset: (days * 3) / 4 },
        Milestone { title: "Launch".into(), day_offset: days },
    ];
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blueprint(key: &str, order: i32, deps: &[&str]) -> TaskBlueprint {
        TaskBlueprint {
            key: key.into(),
            title: key.to_uppercase(),
            description: None,
            order,
            estimated_hours: 1.0,
            required_skills: vec![],
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            visible_to_client: true,
        }
    }

    #[test]
    fn template_name_is_lowercased_pair() {
        assert_eq!(template_name(" Website ", "Premium"), "website:premium");
    }

    #[test]
    fn valid_chain_accepted() {
        let bps = vec![blueprint("a", 1, &[]), blueprint("b", 2, &["a"]), blueprint("c", 3, &["a"])];
        assert!(validate_blueprints(&bps).is_ok());
    }

    #[test]
    fn unknown_dependency_rejected() {
        let bps = vec![blueprint("a", 1, &["ghost"])];
        let err = validate_blueprints(&bps).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn duplicate_key_rejected() {
        let bps = vec![blueprint("a", 1, &[]), blueprint("a", 2, &[])];
        assert!(validate_blueprints(&bps).is_err());
    }

    #[test]
    fn cycle_rejected() {
        let bps = vec![blueprint("a", 1, &["b"]), blueprint("b", 2, &["a"])];
        let err = validate_blueprints(&bps).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn dependency_order_respects_deps_over_order() {
        let nodes = vec![
            (1_i64, 1, vec![3]),
            (2, 2, vec![]),
            (3, 3, vec![]),
        ];
        assert_eq!(dependency_order(&nodes).unwrap(), vec![2, 3, 1]);
    }

    #[test]
    fn dependency_order_breaks_ties_by_order_then_key() {
        let nodes = vec![(10_i64, 5, vec![]), (11, 1, vec![]), (12, 1, vec![])];
        assert_eq!(dependency_order(&nodes).unwrap(), vec![11, 12, 10]);
    }

    #[test]
    fn default_template_scales_with_tier() {
        let basic = default_template("website", "basic").unwrap();
        let premium = default_template("website", "premium").unwrap();
        assert_eq!(basic.blueprints.len(), 5);
        assert!((premium.estimated_hours() - 2.0 * basic.estimated_hours()).abs() < 1e-9);
        assert_eq!(basic.name(), "website:basic");
        assert_eq!(basic.estimated_duration_days, Some(6));
    }

    #[test]
    fn default_template_requires_service_skill() {
        let t = default_template("SEO", "standard").unwrap();
        let build = t.blueprints.iter().find(|b| b.key == "build").unwrap();
        assert_eq!(build.required_skills, vec!["seo".to_string()]);
    }

    #[test]
    fn unknown_tier_rejected() {
        assert!(default_template("website", "platinum").is_err());
    }
}
