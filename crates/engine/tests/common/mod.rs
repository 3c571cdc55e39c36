#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use agency_core::capability::Role;
use agency_core::employee::{CreateEmployee, Employee};
use agency_core::template::{NewWorkflowTemplate, TaskBlueprint};
use agency_core::types::DbId;
use agency_core::workflow::{ServiceDetails, WorkflowDetail, WorkflowTask};
use agency_engine::{
    Actor, CreateWorkflowRequest, Engine, EngineConfig, InMemoryStore, RetryPolicy, Stores,
};
use agency_events::EventBus;

pub const CLIENT_USER: DbId = 500;

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<InMemoryStore>,
    pub bus: Arc<EventBus>,
    pub admin: Actor,
}

/// Engine over a fresh in-memory store with quick retries.
pub fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(EventBus::default());
    let config = EngineConfig {
        retry: RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        assignment_lease: Duration::from_secs(300),
    };
    let engine = Engine::new(Stores::shared(store.clone()), bus.clone(), config);
    Harness {
        engine,
        store,
        bus,
        admin: Actor::new(1, Role::Admin),
    }
}

impl Harness {
    pub async fn employee(&self, user_id: DbId, capacity: f64, skills: &[&str]) -> Employee {
        self.employee_with_slots(user_id, capacity, 3, skills).await
    }

    pub async fn employee_with_slots(
        &self,
        user_id: DbId,
        capacity: f64,
        max_projects: i32,
        skills: &[&str],
    ) -> Employee {
        self.engine
            .create_employee(
                &self.admin,
                CreateEmployee {
                    user_id,
                    employee_role: "developer".into(),
                    department: Some("delivery".into()),
                    weekly_capacity: capacity,
                    max_concurrent_projects: max_projects,
                    available_for_work: Some(true),
                    skill_set: skills.iter().map(|s| s.to_string()).collect(),
                },
            )
            .await
            .expect("employee should be created")
    }

    /// T1 (2h) <- T2 (3h), T1 <- T3 (1h); every task needs `web`.
    pub async fn register_chain_template(&self, service_type: &str) {
        let bp = |key: &str, order: i32, hours: f64, deps: &[&str]| TaskBlueprint {
            key: key.into(),
            title: key.to_uppercase(),
            description: None,
            order,
            estimated_hours: hours,
            required_skills: vec!["web".into()],
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            visible_to_client: true,
        };
        self.engine
            .register_template(
                &self.admin,
                NewWorkflowTemplate {
                    service_type: service_type.into(),
                    service_tier: "basic".into(),
                    estimated_duration_days: Some(5),
                    blueprints: vec![
                        bp("t1", 1, 2.0, &[]),
                        bp("t2", 2, 3.0, &["t1"]),
                        bp("t3", 3, 1.0, &["t1"]),
                    ],
                    milestones: vec![],
                },
            )
            .await
            .expect("template should register");
    }

    pub async fn create_workflow(&self, service_type: &str) -> WorkflowDetail {
        self.engine
            .create_workflow(&self.admin, request(service_type, false))
            .await
            .expect("workflow should be created")
            .detail
    }

    pub async fn employee_state(&self, id: DbId) -> Employee {
        self.engine.get_employee(id).await.expect("employee exists")
    }
}

pub fn request(service_type: &str, auto_assign: bool) -> CreateWorkflowRequest {
    CreateWorkflowRequest {
        user_id: CLIENT_USER,
        service_type: service_type.into(),
        details: ServiceDetails {
            service_name: format!("{service_type} engagement"),
            service_tier: "basic".into(),
            service_amount_cents: 150_000,
            internal_notes: None,
            client_notes: None,
        },
        auto_assign,
    }
}

/// Task with the given title (blueprint key upper-cased).
pub fn task<'a>(detail: &'a WorkflowDetail, title: &str) -> &'a WorkflowTask {
    detail
        .tasks
        .iter()
        .find(|t| t.title == title)
        .unwrap_or_else(|| panic!("no task titled {title}"))
}
