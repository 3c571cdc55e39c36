//! Roles and the capabilities they grant.
//!
//! Authorization decisions are made against a typed [`Capability`] set rather
//! than free-form permission blobs, so adding a capability forces every role
//! definition below to be revisited.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MANAGER: &str = "manager";
pub const ROLE_EMPLOYEE: &str = "employee";
pub const ROLE_CLIENT: &str = "client";

/// A single permission checked by the HTTP layer before calling the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewWorkflows,
    ManageWorkflows,
    AssignTeams,
    UpdateTasks,
    ManageEmployees,
    ManageTemplates,
    ManageSequences,
    ApproveSequences,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::ViewWorkflows,
        Capability::ManageWorkflows,
        Capability::AssignTeams,
        Capability::UpdateTasks,
        Capability::ManageEmployees,
        Capability::ManageTemplates,
        Capability::ManageSequences,
        Capability::ApproveSequences,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ViewWorkflows => "view_workflows",
            Capability::ManageWorkflows => "manage_workflows",
            Capability::AssignTeams => "assign_teams",
            Capability::UpdateTasks => "update_tasks",
            Capability::ManageEmployees => "manage_employees",
            Capability::ManageTemplates => "manage_templates",
            Capability::ManageSequences => "manage_sequences",
            Capability::ApproveSequences => "approve_sequences",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform role carried in the caller's access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Employee,
    Client,
}

impl Role {
    /// Parse a role name, rejecting anything not in the fixed set.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        match name {
            ROLE_ADMIN => Ok(Role::Admin),
            ROLE_MANAGER => Ok(Role::Manager),
            ROLE_EMPLOYEE => Ok(Role::Employee),
            ROLE_CLIENT => Ok(Role::Client),
            other => Err(CoreError::Validation(format!("Unknown role '{other}'"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => ROLE_ADMIN,
            Role::Manager => ROLE_MANAGER,
            Role::Employee => ROLE_EMPLOYEE,
            Role::Client => ROLE_CLIENT,
        }
    }

    /// The full capability set granted to this role.
    pub fn capabilities(self) -> HashSet<Capability> {
        match self {
            Role::Admin => Capability::ALL.into_iter().collect(),
            Role::Manager => Capability::ALL
                .into_iter()
                .filter(|c| *c != Capability::ManageEmployees)
                .collect(),
            Role::Employee => [Capability::ViewWorkflows, Capability::UpdateTasks]
                .into_iter()
                .collect(),
            Role::Client => [Capability::ViewWorkflows].into_iter().collect(),
        }
    }

    pub fn has(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Fail with `Forbidden` unless the role grants `capability`.
    pub fn require(self, capability: Capability) -> Result<(), CoreError> {
        if self.has(capability) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "Role '{}' lacks the '{capability}' capability",
                self.as_str()
            )))
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
