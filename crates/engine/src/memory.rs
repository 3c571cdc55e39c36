//! In-memory implementation of every repository port.
//!
//! Used by the engine and API test suites and for running the server without
//! a database. All state sits behind one mutex, so each port call is atomic
//! and version checks behave like the PostgreSQL store's.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use agency_core::capacity::{self, Release, Reservation};
use agency_core::employee::{CreateEmployee, Employee, EmployeeStatus, UpdateEmployee};
use agency_core::repository::{
    EmployeeRepository, LeaseOutcome, SequenceRepository, StoreError, StoreResult,
    TemplateRepository, WorkflowCommit, WorkflowRepository,
};
use agency_core::sequence::{
    NewSequence, NewSequenceActivity, Sequence, SequenceActivity, SequenceAssignment,
    SequenceStatus,
};
use agency_core::template::{NewWorkflowTemplate, WorkflowTemplate};
use agency_core::types::{DbId, Timestamp};
use agency_core::workflow::{
    NewWorkflowInstance, NewWorkflowTask, TaskStatus, TeamAssignment, TeamAssignmentStatus,
    WorkflowDetail, WorkflowInstance, WorkflowListQuery, WorkflowStatus, WorkflowTask,
};
use async_trait::async_trait;
use chrono::Utc;

#[derive(Default)]
struct State {
    last_id: DbId,
    employees: BTreeMap<DbId, Employee>,
    templates: BTreeMap<String, WorkflowTemplate>,
    workflows: BTreeMap<DbId, WorkflowInstance>,
    tasks: BTreeMap<DbId, WorkflowTask>,
    team: BTreeMap<DbId, TeamAssignment>,
    sequences: BTreeMap<DbId, Sequence>,
    leads: BTreeSet<DbId>,
    assignments: BTreeMap<DbId, SequenceAssignment>,
    activities: Vec<SequenceActivity>,
}

impl State {
    fn next_id(&mut self) -> DbId {
        self.last_id += 1;
        self.last_id
    }

    fn detail(&self, workflow_id: DbId) -> Option<WorkflowDetail> {
        let workflow = self.workflows.get(&workflow_id)?.clone();
        Some(WorkflowDetail {
            workflow,
            tasks: self.tasks_of(workflow_id),
            team: self
                .team
                .values()
                .filter(|t| t.workflow_id == workflow_id)
                .cloned()
                .collect(),
        })
    }

    fn tasks_of(&self, workflow_id: DbId) -> Vec<WorkflowTask> {
        let mut tasks: Vec<WorkflowTask> = self
            .tasks
            .values()
            .filter(|t| t.workflow_id == workflow_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.order, t.id));
        tasks
    }

    fn active_team_entry(&mut self, workflow_id: DbId, employee_id: DbId) -> Option<&mut TeamAssignment> {
        self.team.values_mut().find(|t| {
            t.workflow_id == workflow_id
                && t.employee_id == employee_id
                && t.status == TeamAssignmentStatus::Active
        })
    }

    fn apply_release(&mut self, workflow_id: DbId, release: &Release, now: Timestamp) {
        let closed = release.closes_project
            && match self.active_team_entry(workflow_id, release.employee_id) {
                Some(entry) => {
                    entry.status = TeamAssignmentStatus::Completed;
                    entry.completed_at = Some(now);
                    true
                }
                None => false,
            };
        if let Some(employee) = self.employees.get_mut(&release.employee_id) {
            capacity::apply_release(
                employee,
                &Release {
                    closes_project: closed,
                    ..*release
                },
            );
            employee.updated_at = now;
        }
    }

    fn apply_reservation(&mut self, workflow_id: DbId, reservation: &Reservation, now: Timestamp) {
        let opened = if self.active_team_entry(workflow_id, reservation.employee_id).is_some() {
            false
        } else {
            let id = self.next_id();
            self.team.insert(
                id,
                TeamAssignment {
                    id,
                    employee_id: reservation.employee_id,
                    workflow_id,
                    status: TeamAssignmentStatus::Active,
                    assigned_at: now,
                    completed_at: None,
                },
            );
            true
        };
        if let Some(employee) = self.employees.get_mut(&reservation.employee_id) {
            capacity::apply_reservation(
                employee,
                &Reservation {
                    opens_project: opened,
                    ..*reservation
                },
            );
            employee.updated_at = now;
        }
    }

    fn has_other_open_pair(&self, assignment: &SequenceAssignment) -> bool {
        assignment.status.is_open()
            && self.assignments.values().any(|a| {
                a.id != assignment.id
                    && a.sequence_id == assignment.sequence_id
                    && a.lead_id == assignment.lead_id
                    && a.status.is_open()
            })
    }

    fn append_activities(&mut self, assignment_id: DbId, activities: &[NewSequenceActivity], now: Timestamp) {
        for activity in activities {
            let id = self.next_id();
            self.activities.push(SequenceActivity {
                id,
                assignment_id,
                step_order: activity.step_order,
                action_type: activity.action_type.clone(),
                result: activity.result.clone(),
                created_at: now,
            });
        }
    }
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    failing_commits: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lead id so sequence assignments can reference it.
    pub fn add_lead(&self, lead_id: DbId) {
        if let Ok(mut state) = self.state.lock() {
            state.leads.insert(lead_id);
        }
    }

    /// Make the next `count` workflow commits fail with a backend error.
    pub fn fail_next_commits(&self, count: u32) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".into()))
    }

    fn injected_failure(&self) -> StoreResult<()> {
        let armed = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return Err(StoreError::Backend("injected commit failure".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Employees
// ---------------------------------------------------------------------------

#[async_trait]
impl EmployeeRepository for InMemoryStore {
    async fn create(&self, input: &CreateEmployee) -> StoreResult<Employee> {
        let mut state = self.lock()?;
        if state.employees.values().any(|e| e.user_id == input.user_id) {
            return Err(StoreError::Conflict(format!(
                "User {} is already an employee",
                input.user_id
            )));
        }
        let now = Utc::now();
        let id = state.next_id();
        let employee = Employee {
            id,
            user_id: input.user_id,
            employee_role: input.employee_role.clone(),
            department: input.department.clone(),
            weekly_capacity: input.weekly_capacity,
            current_workload: 0.0,
            current_project_count: 0,
            max_concurrent_projects: input.max_concurrent_projects,
            available_for_work: input.available_for_work.unwrap_or(true),
            skill_set: input.skill_set.iter().cloned().collect(),
            status: EmployeeStatus::Active,
            created_at: now,
            updated_at: now,
        };
        state.employees.insert(id, employee.clone());
        Ok(employee)
    }

    async fn update(&self, id: DbId, input: &UpdateEmployee) -> StoreResult<Option<Employee>> {
        let mut state = self.lock()?;
        let Some(employee) = state.employees.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(role) = &input.employee_role {
            employee.employee_role = role.clone();
        }
        if let Some(department) = &input.department {
            employee.department = Some(department.clone());
        }
        if let Some(capacity) = input.weekly_capacity {
            employee.weekly_capacity = capacity;
        }
        if let Some(max) = input.max_concurrent_projects {
            employee.max_concurrent_projects = max;
        }
        if let Some(available) = input.available_for_work {
            employee.available_for_work = available;
        }
        if let Some(skills) = &input.skill_set {
            employee.skill_set = skills.iter().cloned().collect();
        }
        if let Some(status) = input.status {
            employee.status = status;
        }
        employee.updated_at = Utc::now();
        Ok(Some(employee.clone()))
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Employee>> {
        Ok(self.lock()?.employees.get(&id).cloned())
    }

    async fn find_by_user_id(&self, user_id: DbId) -> StoreResult<Option<Employee>> {
        Ok(self
            .lock()?
            .employees
            .values()
            .find(|e| e.user_id == user_id)
            .cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Employee>> {
        Ok(self.lock()?.employees.values().cloned().collect())
    }

    async fn list_active(&self) -> StoreResult<Vec<Employee>> {
        Ok(self
            .lock()?
            .employees
            .values()
            .filter(|e| e.status == EmployeeStatus::Active)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[async_trait]
impl TemplateRepository for InMemoryStore {
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<WorkflowTemplate>> {
        Ok(self.lock()?.templates.get(name).cloned())
    }

    async fn upsert(&self, input: &NewWorkflowTemplate) -> StoreResult<WorkflowTemplate> {
        let mut state = self.lock()?;
        let name = input.name();
        let id = match state.templates.get(&name) {
            Some(existing) => existing.id,
            None => state.next_id(),
        };
        let template = WorkflowTemplate {
            id,
            name: name.clone(),
            service_type: input.service_type.clone(),
            service_tier: input.service_tier.clone(),
            estimated_duration_days: input.estimated_duration_days.unwrap_or(1),
            estimated_hours: input.estimated_hours(),
            blueprints: input.blueprints.clone(),
            milestones: input.milestones.clone(),
            created_at: Utc::now(),
        };
        state.templates.insert(name, template.clone());
        Ok(template)
    }
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

#[async_trait]
impl WorkflowRepository for InMemoryStore {
    async fn create_instance(
        &self,
        instance: &NewWorkflowInstance,
        tasks: &[NewWorkflowTask],
        now: Timestamp,
    ) -> StoreResult<WorkflowDetail> {
        let mut state = self.lock()?;

        // Ids are reserved only once every dependency key resolves.
        let workflow_id = state.last_id + 1;
        let ids: HashMap<&str, DbId> = tasks
            .iter()
            .zip(workflow_id + 1..)
            .map(|(task, id)| (task.key.as_str(), id))
            .collect();
        let resolved = tasks
            .iter()
            .map(|task| {
                task.dependency_keys
                    .iter()
                    .map(|key| {
                        ids.get(key.as_str()).copied().ok_or_else(|| {
                            StoreError::Conflict(format!("Unknown dependency '{key}'"))
                        })
                    })
                    .collect::<StoreResult<BTreeSet<DbId>>>()
            })
            .collect::<StoreResult<Vec<_>>>()?;
        state.last_id = workflow_id + tasks.len() as DbId;

        state.workflows.insert(
            workflow_id,
            WorkflowInstance {
                id: workflow_id,
                user_id: instance.user_id,
                template_id: instance.template_id,
                service_name: instance.service_name.clone(),
                service_tier: instance.service_tier.clone(),
                service_amount_cents: instance.service_amount_cents,
                status: WorkflowStatus::Pending,
                progress: 0,
                team_assigned: false,
                assignment_started_at: None,
                started_at: None,
                completed_at: None,
                expected_completion_date: instance.expected_completion_date,
                internal_notes: instance.internal_notes.clone(),
                client_notes: instance.client_notes.clone(),
                version: 1,
                created_at: now,
                updated_at: now,
            },
        );

        for (task, dependencies) in tasks.iter().zip(resolved) {
            let id = ids[task.key.as_str()];
            state.tasks.insert(
                id,
                WorkflowTask {
                    id,
                    workflow_id,
                    title: task.title.clone(),
                    description: task.description.clone(),
                    order: task.order,
                    estimated_hours: task.estimated_hours,
                    actual_hours: None,
                    required_skills: task.required_skills.clone(),
                    dependencies,
                    status: TaskStatus::Pending,
                    assigned_to_id: None,
                    blocked_reason: None,
                    completed_work: None,
                    started_at: None,
                    completed_at: None,
                    visible_to_client: task.visible_to_client,
                    version: 1,
                    created_at: now,
                    updated_at: now,
                },
            );
        }

        state
            .detail(workflow_id)
            .ok_or(StoreError::NotFound {
                entity: "workflow",
                id: workflow_id,
            })
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<WorkflowInstance>> {
        Ok(self.lock()?.workflows.get(&id).cloned())
    }

    async fn find_detail(&self, id: DbId) -> StoreResult<Option<WorkflowDetail>> {
        Ok(self.lock()?.detail(id))
    }

    async fn list(&self, query: &WorkflowListQuery) -> StoreResult<Vec<WorkflowInstance>> {
        let state = self.lock()?;
        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.unwrap_or(100).clamp(1, 500) as usize;
        Ok(state
            .workflows
            .values()
            .rev()
            .filter(|w| query.user_id.map_or(true, |u| w.user_id == u))
            .filter(|w| query.status.map_or(true, |s| w.status == s))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_task(&self, task_id: DbId) -> StoreResult<Option<WorkflowTask>> {
        Ok(self.lock()?.tasks.get(&task_id).cloned())
    }

    async fn open_task_counts(&self) -> StoreResult<HashMap<DbId, i64>> {
        let state = self.lock()?;
        let mut counts = HashMap::new();
        let live = |t: &&WorkflowTask| {
            state
                .workflows
                .get(&t.workflow_id)
                .is_some_and(|w| w.status != WorkflowStatus::Cancelled)
        };
        for task in state.tasks.values().filter(|t| t.status.is_open()).filter(live) {
            if let Some(employee_id) = task.assigned_to_id {
                *counts.entry(employee_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn acquire_assignment_lease(
        &self,
        workflow_id: DbId,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> StoreResult<LeaseOutcome> {
        let mut state = self.lock()?;
        let workflow = state
            .workflows
            .get_mut(&workflow_id)
            .ok_or(StoreError::NotFound {
                entity: "workflow",
                id: workflow_id,
            })?;
        if workflow.team_assigned {
            return Ok(LeaseOutcome::AlreadyAssigned);
        }
        if workflow
            .assignment_started_at
            .is_some_and(|started| started > stale_before)
        {
            return Ok(LeaseOutcome::Busy);
        }
        workflow.assignment_started_at = Some(now);
        workflow.version += 1;
        workflow.updated_at = now;
        Ok(LeaseOutcome::Acquired(workflow.clone()))
    }

    async fn release_assignment_lease(
        &self,
        workflow_id: DbId,
        team_assigned: bool,
        now: Timestamp,
    ) -> StoreResult<WorkflowInstance> {
        let mut state = self.lock()?;
        let workflow = state
            .workflows
            .get_mut(&workflow_id)
            .ok_or(StoreError::NotFound {
                entity: "workflow",
                id: workflow_id,
            })?;
        workflow.assignment_started_at = None;
        workflow.team_assigned |= team_assigned;
        workflow.version += 1;
        workflow.updated_at = now;
        Ok(workflow.clone())
    }

    async fn commit(&self, commit: &WorkflowCommit) -> StoreResult<WorkflowDetail> {
        self.injected_failure()?;
        let mut state = self.lock()?;
        let workflow_id = commit.workflow.id;

        let current = state.workflows.get(&workflow_id).ok_or(StoreError::NotFound {
            entity: "workflow",
            id: workflow_id,
        })?;
        if current.version != commit.workflow.version {
            return Err(StoreError::StaleVersion);
        }
        for task in &commit.tasks {
            let stored = state.tasks.get(&task.id).ok_or(StoreError::NotFound {
                entity: "task",
                id: task.id,
            })?;
            if stored.workflow_id != workflow_id {
                return Err(StoreError::Conflict(format!(
                    "Task {} does not belong to workflow {workflow_id}",
                    task.id
                )));
            }
            if stored.version != task.version {
                return Err(StoreError::StaleVersion);
            }
        }

        let now = commit.workflow.updated_at;
        let mut workflow = commit.workflow.clone();
        workflow.version += 1;
        state.workflows.insert(workflow_id, workflow);
        for task in &commit.tasks {
            let mut task = task.clone();
            task.version += 1;
            state.tasks.insert(task.id, task);
        }
        for release in &commit.releases {
            state.apply_release(workflow_id, release, now);
        }
        for reservation in &commit.reservations {
            state.apply_reservation(workflow_id, reservation, now);
        }

        state.detail(workflow_id).ok_or(StoreError::NotFound {
            entity: "workflow",
            id: workflow_id,
        })
    }

    async fn delete(
        &self,
        workflow_id: DbId,
        expected_version: i64,
        releases: &[Release],
    ) -> StoreResult<()> {
        let mut state = self.lock()?;
        let current = state.workflows.get(&workflow_id).ok_or(StoreError::NotFound {
            entity: "workflow",
            id: workflow_id,
        })?;
        if current.version != expected_version {
            return Err(StoreError::StaleVersion);
        }
        let now = Utc::now();
        for release in releases {
            state.apply_release(workflow_id, release, now);
        }
        state.tasks.retain(|_, t| t.workflow_id != workflow_id);
        state.team.retain(|_, t| t.workflow_id != workflow_id);
        state.workflows.remove(&workflow_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

#[async_trait]
impl SequenceRepository for InMemoryStore {
    async fn create_sequence(&self, input: &NewSequence, created_by_id: DbId) -> StoreResult<Sequence> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let id = state.next_id();
        let sequence = Sequence {
            id,
            name: input.name.clone(),
            description: input.description.clone(),
            status: input.status.unwrap_or(SequenceStatus::Draft),
            steps: input.steps.clone(),
            created_by_id: Some(created_by_id),
            approved_by_id: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        };
        state.sequences.insert(id, sequence.clone());
        Ok(sequence)
    }

    async fn find_sequence(&self, id: DbId) -> StoreResult<Option<Sequence>> {
        Ok(self.lock()?.sequences.get(&id).cloned())
    }

    async fn list_sequences(&self) -> StoreResult<Vec<Sequence>> {
        Ok(self.lock()?.sequences.values().cloned().collect())
    }

    async fn update_sequence(&self, sequence: &Sequence) -> StoreResult<Sequence> {
        let mut state = self.lock()?;
        let stored = state
            .sequences
            .get_mut(&sequence.id)
            .ok_or(StoreError::NotFound {
                entity: "sequence",
                id: sequence.id,
            })?;
        stored.status = sequence.status;
        stored.approved_by_id = sequence.approved_by_id;
        stored.approved_at = sequence.approved_at;
        stored.updated_at = sequence.updated_at;
        Ok(stored.clone())
    }

    async fn lead_exists(&self, lead_id: DbId) -> StoreResult<bool> {
        Ok(self.lock()?.leads.contains(&lead_id))
    }

    async fn insert_assignment(
        &self,
        assignment: &SequenceAssignment,
        activities: &[NewSequenceActivity],
    ) -> StoreResult<SequenceAssignment> {
        let mut state = self.lock()?;
        if state.has_other_open_pair(assignment) {
            return Err(StoreError::DuplicateOpenAssignment);
        }
        let id = state.next_id();
        let stored = SequenceAssignment {
            id,
            version: 1,
            ..assignment.clone()
        };
        state.assignments.insert(id, stored.clone());
        state.append_activities(id, activities, stored.updated_at);
        Ok(stored)
    }

    async fn find_assignment(&self, id: DbId) -> StoreResult<Option<SequenceAssignment>> {
        Ok(self.lock()?.assignments.get(&id).cloned())
    }

    async fn commit_assignment(
        &self,
        assignment: &SequenceAssignment,
        activities: &[NewSequenceActivity],
    ) -> StoreResult<SequenceAssignment> {
        let mut state = self.lock()?;
        let current = state
            .assignments
            .get(&assignment.id)
            .ok_or(StoreError::NotFound {
                entity: "sequence_assignment",
                id: assignment.id,
            })?;
        if current.version != assignment.version {
            return Err(StoreError::StaleVersion);
        }
        if state.has_other_open_pair(assignment) {
            return Err(StoreError::DuplicateOpenAssignment);
        }
        let stored = SequenceAssignment {
            version: assignment.version + 1,
            ..assignment.clone()
        };
        state.assignments.insert(stored.id, stored.clone());
        state.append_activities(stored.id, activities, stored.updated_at);
        Ok(stored)
    }

    async fn list_activities(&self, assignment_id: DbId) -> StoreResult<Vec<SequenceActivity>> {
        Ok(self
            .lock()?
            .activities
            .iter()
            .filter(|a| a.assignment_id == assignment_id)
            .cloned()
            .collect())
    }
}
