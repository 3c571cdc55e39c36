mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;

use agency_core::capability::Role;
use agency_core::employee::UpdateEmployee;
use agency_core::error::CoreError;
use agency_core::repository::{StoreError, WorkflowRepository};
use agency_core::workflow::{
    NewWorkflowInstance, NewWorkflowTask, TaskStatus, TaskUpdateFields, TeamAssignmentStatus,
    WorkflowDetail, WorkflowListQuery, WorkflowStatus,
};
use agency_engine::workflows::UpdateWorkflowNotes;
use agency_engine::{Actor, Engine, EngineConfig, RetryPolicy, Stores};
use agency_events::kinds;

use common::{harness, task, Harness, CLIENT_USER};

async fn staffed(h: &Harness) -> WorkflowDetail {
    h.register_chain_template("website").await;
    let wf = h.create_workflow("website").await;
    h.engine.assign_team(&h.admin, wf.workflow.id).await.unwrap();
    h.engine.get_workflow(&h.admin, wf.workflow.id).await.unwrap()
}

async fn set(h: &Harness, task_id: i64, to: TaskStatus) -> Result<(), CoreError> {
    h.engine
        .update_task_status(&h.admin, task_id, to, TaskUpdateFields::default())
        .await
        .map(|_| ())
}

fn assert_progress_invariant(detail: &WorkflowDetail) {
    let total = detail.tasks.len();
    let done = detail
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    let expected = ((100.0 * done as f64) / total as f64).round() as i16;
    assert!((0..=100).contains(&detail.workflow.progress));
    assert_eq!(detail.workflow.progress, expected);
}

#[tokio::test]
async fn starting_before_prerequisites_complete_fails() {
    let h = harness();
    h.employee(10, 40.0, &["web"]).await;
    let wf = staffed(&h).await;
    let t1 = task(&wf, "T1").id;
    let t2 = task(&wf, "T2").id;

    let result = set(&h, t2, TaskStatus::InProgress).await;
    assert_matches!(
        result,
        Err(CoreError::DependencyNotSatisfied { task_id, pending }) if task_id == t2 && pending == vec![t1]
    );

    let after = h.engine.get_workflow(&h.admin, wf.workflow.id).await.unwrap();
    assert_eq!(task(&after, "T2").status, TaskStatus::Assigned);
}

#[tokio::test]
async fn completing_the_chain_completes_the_workflow_and_releases_capacity() {
    let h = harness();
    let dev = h.employee(10, 40.0, &["web"]).await;
    let wf = staffed(&h).await;
    let id = wf.workflow.id;
    let (t1, t2, t3) = (task(&wf, "T1").id, task(&wf, "T2").id, task(&wf, "T3").id);

    set(&h, t1, TaskStatus::InProgress).await.unwrap();
    let detail = h.engine.get_workflow(&h.admin, id).await.unwrap();
    assert_eq!(detail.workflow.status, WorkflowStatus::InProgress);
    assert!(detail.workflow.started_at.is_some());
    assert_progress_invariant(&detail);

    set(&h, t1, TaskStatus::Completed).await.unwrap();
    let detail = h.engine.get_workflow(&h.admin, id).await.unwrap();
    assert_eq!(detail.workflow.progress, 33);
    assert_progress_invariant(&detail);
    assert_eq!(h.employee_state(dev.id).await.current_workload, 4.0);

    set(&h, t2, TaskStatus::InProgress).await.unwrap();
    set(&h, t3, TaskStatus::InProgress).await.unwrap();
    set(&h, t2, TaskStatus::Completed).await.unwrap();
    let detail = h.engine.get_workflow(&h.admin, id).await.unwrap();
    assert_eq!(detail.workflow.progress, 67);
    assert_eq!(detail.workflow.status, WorkflowStatus::InProgress);

    set(&h, t3, TaskStatus::Completed).await.unwrap();
    let detail = h.engine.get_workflow(&h.admin, id).await.unwrap();
    assert_eq!(detail.workflow.status, WorkflowStatus::Completed);
    assert_eq!(detail.workflow.progress, 100);
    assert!(detail.workflow.completed_at.is_some());
    assert_eq!(detail.team[0].status, TeamAssignmentStatus::Completed);

    let dev = h.employee_state(dev.id).await;
    assert_eq!(dev.current_workload, 0.0);
    assert_eq!(dev.current_project_count, 0);
}

#[tokio::test]
async fn blocking_requires_a_reason_and_unblocking_clears_it() {
    let h = harness();
    h.employee(10, 40.0, &["web"]).await;
    let wf = staffed(&h).await;
    let t1 = task(&wf, "T1").id;
    set(&h, t1, TaskStatus::InProgress).await.unwrap();

    let no_reason = set(&h, t1, TaskStatus::Blocked).await;
    assert_matches!(no_reason, Err(CoreError::Validation(_)));

    let blocked = h
        .engine
        .update_task_status(
            &h.admin,
            t1,
            TaskStatus::Blocked,
            TaskUpdateFields {
                blocked_reason: Some("waiting on client assets".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(blocked.blocked_reason.as_deref(), Some("waiting on client assets"));

    let done = h
        .engine
        .update_task_status(
            &h.admin,
            t1,
            TaskStatus::Completed,
            TaskUpdateFields {
                completed_work: Some("assets received, build done".into()),
                actual_hours: Some(2.5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(done.blocked_reason.is_none());
    assert_eq!(done.actual_hours, Some(2.5));
    assert!(done.completed_at.is_some());
}

#[tokio::test]
async fn completed_tasks_cannot_move_again() {
    let h = harness();
    h.employee(10, 40.0, &["web"]).await;
    let wf = staffed(&h).await;
    let t1 = task(&wf, "T1").id;
    set(&h, t1, TaskStatus::InProgress).await.unwrap();
    set(&h, t1, TaskStatus::Completed).await.unwrap();

    let result = set(&h, t1, TaskStatus::InProgress).await;
    assert_matches!(result, Err(CoreError::InvalidTransition { entity: "task", .. }));
}

#[tokio::test]
async fn held_workflows_reject_task_updates() {
    let h = harness();
    h.employee(10, 40.0, &["web"]).await;
    let wf = staffed(&h).await;
    h.engine
        .update_workflow_status(&h.admin, wf.workflow.id, WorkflowStatus::OnHold)
        .await
        .unwrap();

    let result = set(&h, task(&wf, "T1").id, TaskStatus::InProgress).await;
    assert_matches!(result, Err(CoreError::InvalidTransition { .. }));

    let resumed = h
        .engine
        .update_workflow_status(&h.admin, wf.workflow.id, WorkflowStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(resumed.status, WorkflowStatus::InProgress);
    set(&h, task(&wf, "T1").id, TaskStatus::InProgress).await.unwrap();
}

#[tokio::test]
async fn cancelling_releases_every_reservation() {
    let h = harness();
    let dev = h.employee(10, 40.0, &["web"]).await;
    let wf = staffed(&h).await;
    assert_eq!(h.employee_state(dev.id).await.current_workload, 6.0);

    let cancelled = h
        .engine
        .update_workflow_status(&h.admin, wf.workflow.id, WorkflowStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status, WorkflowStatus::Cancelled);

    let dev = h.employee_state(dev.id).await;
    assert_eq!(dev.current_workload, 0.0);
    assert_eq!(dev.current_project_count, 0);
    let detail = h.engine.get_workflow(&h.admin, wf.workflow.id).await.unwrap();
    assert!(detail.team.iter().all(|t| t.status == TeamAssignmentStatus::Completed));

    let reopen = h
        .engine
        .update_workflow_status(&h.admin, wf.workflow.id, WorkflowStatus::Pending)
        .await;
    assert_matches!(reopen, Err(CoreError::InvalidTransition { entity: "workflow", .. }));
}

#[tokio::test]
async fn explicit_completion_requires_every_task_done() {
    let h = harness();
    h.employee(10, 40.0, &["web"]).await;
    let wf = staffed(&h).await;

    let result = h
        .engine
        .update_workflow_status(&h.admin, wf.workflow.id, WorkflowStatus::Completed)
        .await;
    assert_matches!(result, Err(CoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn employees_only_update_their_own_tasks() {
    let h = harness();
    h.employee(10, 40.0, &["web"]).await;
    h.employee(11, 40.0, &["seo"]).await;
    let wf = staffed(&h).await;
    let t1 = task(&wf, "T1").id;

    let outsider = Actor::new(11, Role::Employee);
    let denied = h
        .engine
        .update_task_status(&outsider, t1, TaskStatus::InProgress, TaskUpdateFields::default())
        .await;
    assert_matches!(denied, Err(CoreError::Forbidden(_)));

    let owner = Actor::new(10, Role::Employee);
    let started = h
        .engine
        .update_task_status(&owner, t1, TaskStatus::InProgress, TaskUpdateFields::default())
        .await
        .unwrap();
    assert_eq!(started.status, TaskStatus::InProgress);

    let client = Actor::new(CLIENT_USER, Role::Client);
    let result = h
        .engine
        .update_task_status(&client, t1, TaskStatus::Completed, TaskUpdateFields::default())
        .await;
    assert_matches!(result, Err(CoreError::Forbidden(_)));
}

#[tokio::test]
async fn reassignment_moves_hours_between_employees() {
    let h = harness();
    let first = h.employee(10, 40.0, &["web"]).await;
    let wf = staffed(&h).await;
    let second = h.employee(11, 40.0, &["web"]).await;
    let t2 = task(&wf, "T2").id;

    let moved = h.engine.reassign_task(&h.admin, t2, second.id).await.unwrap();
    assert_eq!(moved.assigned_to_id, Some(second.id));
    assert_eq!(moved.status, TaskStatus::Assigned);

    let first = h.employee_state(first.id).await;
    let second = h.employee_state(second.id).await;
    assert_eq!(first.current_workload, 3.0);
    assert_eq!(first.current_project_count, 1);
    assert_eq!(second.current_workload, 3.0);
    assert_eq!(second.current_project_count, 1);

    let t1 = task(&wf, "T1").id;
    set(&h, t1, TaskStatus::InProgress).await.unwrap();
    let late = h.engine.reassign_task(&h.admin, t1, second.id).await;
    assert_matches!(late, Err(CoreError::InvalidTransition { .. }));
}

#[tokio::test(start_paused = true)]
async fn reassignment_rechecks_the_employee_on_retry() {
    let h = harness();
    h.employee(10, 40.0, &["web"]).await;
    let wf = staffed(&h).await;
    let second = h.employee(11, 40.0, &["web"]).await;
    let t2 = task(&wf, "T2").id;

    let slow_retry = EngineConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(200),
            backoff_multiplier: 1.0,
            jitter: false,
        },
        ..EngineConfig::default()
    };
    let engine = Engine::new(Stores::shared(h.store.clone()), h.bus.clone(), slow_retry);
    h.store.fail_next_commits(1);

    let admin = h.admin;
    let pending = tokio::spawn(async move { engine.reassign_task(&admin, t2, second.id).await });

    // First attempt failed and is backing off.
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.engine
        .update_employee(
            &h.admin,
            second.id,
            UpdateEmployee {
                available_for_work: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = pending.await.unwrap();
    assert_matches!(result, Err(CoreError::Conflict(_)));
    let second = h.employee_state(second.id).await;
    assert_eq!(second.current_workload, 0.0);
    assert_eq!(second.current_project_count, 0);
}

#[tokio::test]
async fn deleting_releases_open_reservations() {
    let h = harness();
    let dev = h.employee(10, 40.0, &["web"]).await;
    let wf = staffed(&h).await;

    let manager = Actor::new(2, Role::Manager);
    let denied = h.engine.delete_workflow(&manager, wf.workflow.id).await;
    assert_matches!(denied, Err(CoreError::Forbidden(_)));

    h.engine.delete_workflow(&h.admin, wf.workflow.id).await.unwrap();
    let gone = h.engine.get_workflow(&h.admin, wf.workflow.id).await;
    assert_matches!(gone, Err(CoreError::NotFound { .. }));

    let dev = h.employee_state(dev.id).await;
    assert_eq!(dev.current_workload, 0.0);
    assert_eq!(dev.current_project_count, 0);
}

#[tokio::test]
async fn clients_see_only_their_own_workflows() {
    let h = harness();
    h.employee(10, 40.0, &["web"]).await;
    let wf = staffed(&h).await;
    h.engine
        .update_workflow_notes(
            &h.admin,
            wf.workflow.id,
            UpdateWorkflowNotes {
                internal_notes: Some("discounted".into()),
                client_notes: Some("Kickoff call on Monday".into()),
            },
        )
        .await
        .unwrap();

    let owner = Actor::new(CLIENT_USER, Role::Client);
    let view = h.engine.get_workflow(&owner, wf.workflow.id).await.unwrap();
    assert!(view.workflow.internal_notes.is_none());
    assert_eq!(view.workflow.client_notes.as_deref(), Some("Kickoff call on Monday"));

    let stranger = Actor::new(CLIENT_USER + 1, Role::Client);
    assert_matches!(
        h.engine.get_workflow(&stranger, wf.workflow.id).await,
        Err(CoreError::NotFound { .. })
    );
    let listed = h
        .engine
        .list_workflows(&stranger, WorkflowListQuery::default())
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn notes_never_touch_progress() {
    let h = harness();
    h.employee(10, 40.0, &["web"]).await;
    let wf = staffed(&h).await;
    let t1 = task(&wf, "T1").id;
    set(&h, t1, TaskStatus::InProgress).await.unwrap();
    set(&h, t1, TaskStatus::Completed).await.unwrap();

    let updated = h
        .engine
        .update_workflow_notes(
            &h.admin,
            wf.workflow.id,
            UpdateWorkflowNotes {
                internal_notes: Some("on track".into()),
                client_notes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.progress, 33);
    assert_eq!(updated.internal_notes.as_deref(), Some("on track"));
}

#[tokio::test]
async fn state_changes_are_published() {
    let h = harness();
    h.employee(10, 40.0, &["web"]).await;
    let wf = staffed(&h).await;
    let mut rx = h.bus.subscribe();

    let t1 = task(&wf, "T1").id;
    set(&h, t1, TaskStatus::InProgress).await.unwrap();

    let first = rx.recv().await.unwrap();
    assert_eq!(first.event_type, kinds::TASK_STATUS_CHANGED);
    assert_eq!(first.source_entity_id, Some(t1));
    assert_eq!(first.payload["to"], "in_progress");

    let second = rx.recv().await.unwrap();
    assert_eq!(second.event_type, kinds::WORKFLOW_STATUS_CHANGED);
    assert_eq!(second.payload["from"], "pending");
    assert_eq!(second.payload["to"], "in_progress");
}

#[tokio::test]
async fn unknown_dependency_key_leaves_no_partial_instance() {
    let h = harness();
    let instance = NewWorkflowInstance {
        user_id: CLIENT_USER,
        template_id: None,
        service_name: "Broken".into(),
        service_tier: "basic".into(),
        service_amount_cents: 0,
        expected_completion_date: None,
        internal_notes: None,
        client_notes: None,
    };
    let tasks = [NewWorkflowTask {
        key: "t1".into(),
        title: "T1".into(),
        description: None,
        order: 1,
        estimated_hours: 1.0,
        required_skills: Default::default(),
        dependency_keys: vec!["missing".into()],
        visible_to_client: true,
    }];

    let result = h.store.create_instance(&instance, &tasks, Utc::now()).await;
    assert_matches!(result, Err(StoreError::Conflict(_)));
    let all = h.store.list(&WorkflowListQuery::default()).await.unwrap();
    assert!(all.is_empty());

    // The store is still usable afterwards.
    h.register_chain_template("website").await;
    let wf = h.create_workflow("website").await;
    assert_eq!(wf.tasks.len(), 3);
    assert!(h.store.find_task(wf.workflow.id + 1).await.unwrap().is_some());
}
