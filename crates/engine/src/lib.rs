//! Orchestration services for workflows, team assignment and sequences.
//!
//! [`Engine`] wires the pure rules from `agency-core` to the repository
//! ports, runs read-modify-write cycles under bounded optimistic retry, and
//! publishes a [`DomainEvent`] after every state change.

use std::sync::Arc;
use std::time::Duration;

use agency_core::capability::{Capability, Role};
use agency_core::error::CoreError;
use agency_core::repository::{
    EmployeeRepository, SequenceRepository, TemplateRepository, WorkflowRepository,
};
use agency_core::types::DbId;
use agency_events::{DomainEvent, EventBus};

pub mod assignment;
pub mod employees;
pub mod memory;
pub mod retry;
pub mod sequences;
pub mod tasks;
pub mod templates;
pub mod workflows;

pub use assignment::AssignTeamResult;
pub use memory::InMemoryStore;
pub use retry::RetryPolicy;
pub use workflows::CreateWorkflowRequest;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    /// How long a planner run may hold a workflow before others may take over.
    pub assignment_lease: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            assignment_lease: Duration::from_secs(300),
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// The authenticated user on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: DbId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: DbId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn require(&self, capability: Capability) -> Result<(), CoreError> {
        self.role.require(capability)
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.role.has(capability)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The four repository ports the engine depends on.
#[derive(Clone)]
pub struct Stores {
    pub employees: Arc<dyn EmployeeRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub sequences: Arc<dyn SequenceRepository>,
}

impl Stores {
    /// Use one backend for every port.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: EmployeeRepository
            + TemplateRepository
            + WorkflowRepository
            + SequenceRepository
            + 'static,
    {
        Self {
            employees: store.clone(),
            templates: store.clone(),
            workflows: store.clone(),
            sequences: store,
        }
    }
}

/// Cheap to clone; share one per process.
#[derive(Clone)]
pub struct Engine {
    stores: Stores,
    events: Arc<EventBus>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(stores: Stores, events: Arc<EventBus>, config: EngineConfig) -> Self {
        Self {
            stores,
            events,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    fn publish(&self, event: DomainEvent) {
        self.events.publish(event);
    }
}
