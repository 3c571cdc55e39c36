mod common;

use assert_matches::assert_matches;

use agency_core::capability::Role;
use agency_core::error::CoreError;
use agency_core::planner::GapReason;
use agency_core::workflow::{TaskStatus, TeamAssignmentStatus, WorkflowStatus};
use agency_engine::Actor;

use common::{harness, request, task};

#[tokio::test]
async fn three_task_chain_is_staffed_by_the_only_matching_employee() {
    let h = harness();
    let dev = h.employee(10, 40.0, &["web"]).await;
    h.register_chain_template("website").await;
    let wf = h.create_workflow("website").await;

    let result = h.engine.assign_team(&h.admin, wf.workflow.id).await.unwrap();

    assert_eq!(result.assignments.len(), 3);
    assert!(result.assignments.iter().all(|a| a.employee_id == dev.id));
    assert!(result.unassigned.is_empty());
    assert!(result.capacity_warnings.is_empty());

    let detail = h.engine.get_workflow(&h.admin, wf.workflow.id).await.unwrap();
    assert!(detail.workflow.team_assigned);
    assert!(detail.workflow.assignment_started_at.is_none());
    assert!(detail.tasks.iter().all(|t| t.status == TaskStatus::Assigned));
    assert_eq!(detail.team.len(), 1);
    assert_eq!(detail.team[0].status, TeamAssignmentStatus::Active);

    let dev = h.employee_state(dev.id).await;
    assert_eq!(dev.current_workload, 6.0);
    assert_eq!(dev.current_project_count, 1);
}

#[tokio::test]
async fn second_run_fails_and_leaves_mapping_unchanged() {
    let h = harness();
    h.employee(10, 40.0, &["web"]).await;
    h.employee(11, 40.0, &["web"]).await;
    h.register_chain_template("website").await;
    let wf = h.create_workflow("website").await;

    let first = h.engine.assign_team(&h.admin, wf.workflow.id).await.unwrap();
    let second = h.engine.assign_team(&h.admin, wf.workflow.id).await;
    assert_matches!(second, Err(CoreError::AlreadyAssigned { workflow_id }) if workflow_id == wf.workflow.id);

    let detail = h.engine.get_workflow(&h.admin, wf.workflow.id).await.unwrap();
    for a in &first.assignments {
        let t = detail.tasks.iter().find(|t| t.id == a.task_id).unwrap();
        assert_eq!(t.assigned_to_id, Some(a.employee_id));
    }
}

#[tokio::test]
async fn equivalent_workflows_get_identical_mappings() {
    let run = || async {
        let h = harness();
        h.employee(10, 40.0, &["web", "seo"]).await;
        h.employee(11, 40.0, &["web"]).await;
        h.employee(12, 8.0, &["web", "design"]).await;
        h.register_chain_template("website").await;
        let wf = h.create_workflow("website").await;
        let result = h.engine.assign_team(&h.admin, wf.workflow.id).await.unwrap();
        let detail = h.engine.get_workflow(&h.admin, wf.workflow.id).await.unwrap();
        let mut by_title: Vec<(String, i64)> = detail
            .tasks
            .iter()
            .map(|t| (t.title.clone(), result.employee_for(t.id).unwrap()))
            .collect();
        by_title.sort();
        by_title
    };

    assert_eq!(run().await, run().await);
}

#[tokio::test]
async fn tasks_on_cancelled_workflows_do_not_count_against_candidates() {
    let h = harness();
    let first = h.employee(10, 40.0, &["web"]).await;
    let second = h.employee(11, 40.0, &["web"]).await;
    h.register_chain_template("website").await;

    let earlier = h.create_workflow("website").await;
    let before = h.engine.assign_team(&h.admin, earlier.workflow.id).await.unwrap();
    h.engine
        .update_workflow_status(&h.admin, earlier.workflow.id, WorkflowStatus::Cancelled)
        .await
        .unwrap();
    for id in [first.id, second.id] {
        let e = h.employee_state(id).await;
        assert_eq!(e.current_workload, 0.0);
        assert_eq!(e.current_project_count, 0);
    }

    let later = h.create_workflow("website").await;
    let after = h.engine.assign_team(&h.admin, later.workflow.id).await.unwrap();

    // Same employee state as before the first run, so the same mapping.
    assert_eq!(after.employee_for(task(&later, "T1").id), Some(first.id));
    for title in ["T1", "T2", "T3"] {
        assert_eq!(
            after.employee_for(task(&later, title).id),
            before.employee_for(task(&earlier, title).id),
            "{title} staffed differently after cancellation"
        );
    }
}

#[tokio::test]
async fn load_is_spread_by_available_hours() {
    let h = harness();
    let first = h.employee(10, 100.0, &["web"]).await;
    let second = h.employee(11, 100.0, &["web"]).await;
    h.register_chain_template("website").await;
    let wf = h.create_workflow("website").await;

    let result = h.engine.assign_team(&h.admin, wf.workflow.id).await.unwrap();

    // T1 ties and goes to the lower id; T2 then prefers the idle employee;
    // T3 goes back to whoever has more hours left.
    assert_eq!(result.employee_for(task(&wf, "T1").id), Some(first.id));
    assert_eq!(result.employee_for(task(&wf, "T2").id), Some(second.id));
    assert_eq!(result.employee_for(task(&wf, "T3").id), Some(first.id));

    let detail = h.engine.get_workflow(&h.admin, wf.workflow.id).await.unwrap();
    assert_eq!(detail.team.len(), 2);
}

#[tokio::test]
async fn tasks_without_a_skill_match_stay_pending_and_are_reported() {
    let h = harness();
    h.employee(10, 40.0, &["seo"]).await;
    h.register_chain_template("website").await;
    let wf = h.create_workflow("website").await;

    let result = h.engine.assign_team(&h.admin, wf.workflow.id).await.unwrap();

    assert!(result.assignments.is_empty());
    assert_eq!(result.unassigned.len(), 3);
    assert!(result.unassigned.iter().all(|u| u.reason == GapReason::NoSkillMatch));

    let detail = h.engine.get_workflow(&h.admin, wf.workflow.id).await.unwrap();
    assert!(detail.workflow.team_assigned);
    assert!(detail.tasks.iter().all(|t| t.status == TaskStatus::Pending && t.assigned_to_id.is_none()));
}

#[tokio::test]
async fn overcommit_is_a_warning_not_a_failure() {
    let h = harness();
    let dev = h.employee(10, 4.0, &["web"]).await;
    h.register_chain_template("website").await;
    let wf = h.create_workflow("website").await;

    let result = h.engine.assign_team(&h.admin, wf.workflow.id).await.unwrap();

    assert_eq!(result.assignments.len(), 3);
    let t2 = task(&wf, "T2");
    let warning = result
        .capacity_warnings
        .iter()
        .find(|w| w.task_id == t2.id)
        .expect("T2 should overcommit");
    assert_eq!(warning.employee_id, dev.id);
    assert_eq!(warning.required_hours, 3.0);
    assert_eq!(warning.available_hours, 2.0);

    let dev = h.employee_state(dev.id).await;
    assert_eq!(dev.current_workload, 6.0);
}

#[tokio::test]
async fn full_project_slots_make_employees_ineligible() {
    let h = harness();
    h.employee_with_slots(10, 40.0, 1, &["web"]).await;
    h.register_chain_template("website").await;
    let first = h.create_workflow("website").await;
    let second = h.create_workflow("website").await;

    let r1 = h.engine.assign_team(&h.admin, first.workflow.id).await.unwrap();
    assert_eq!(r1.assignments.len(), 3);

    let r2 = h.engine.assign_team(&h.admin, second.workflow.id).await.unwrap();
    assert!(r2.assignments.is_empty());
    assert!(r2
        .unassigned
        .iter()
        .all(|u| u.reason == GapReason::NoAvailableEmployee));
}

#[tokio::test]
async fn auto_assign_staffs_on_creation() {
    let h = harness();
    h.employee(10, 40.0, &["web"]).await;
    h.register_chain_template("website").await;

    let created = h
        .engine
        .create_workflow(&h.admin, request("website", true))
        .await
        .unwrap();

    let assignment = created.assignment.expect("assignment result");
    assert_eq!(assignment.assignments.len(), 3);
    assert!(created.detail.workflow.team_assigned);
    assert!(created.detail.tasks.iter().all(|t| t.assigned_to_id.is_some()));
}

#[tokio::test]
async fn concurrent_runs_assign_each_task_once() {
    let h = harness();
    let dev = h.employee(10, 40.0, &["web"]).await;
    h.register_chain_template("website").await;
    let wf = h.create_workflow("website").await;

    let (a, b) = tokio::join!(
        h.engine.assign_team(&h.admin, wf.workflow.id),
        h.engine.assign_team(&h.admin, wf.workflow.id),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let failure = if a.is_err() { a } else { b };
    assert_matches!(
        failure,
        Err(CoreError::AlreadyAssigned { .. }) | Err(CoreError::Conflict(_))
    );

    // Reserved exactly once.
    assert_eq!(h.employee_state(dev.id).await.current_workload, 6.0);
}

#[tokio::test]
async fn employees_cannot_run_assignment() {
    let h = harness();
    h.register_chain_template("website").await;
    let wf = h.create_workflow("website").await;

    let result = h
        .engine
        .assign_team(&Actor::new(77, Role::Employee), wf.workflow.id)
        .await;
    assert_matches!(result, Err(CoreError::Forbidden(_)));
}

#[tokio::test]
async fn unknown_workflow_is_not_found() {
    let h = harness();
    let result = h.engine.assign_team(&h.admin, 9_999).await;
    assert_matches!(result, Err(CoreError::NotFound { entity: "workflow", id: 9_999 }));
}

#[tokio::test]
async fn default_catalog_template_is_seeded_on_first_use() {
    let h = harness();
    h.employee(10, 80.0, &["strategy", "seo", "copywriting", "qa"]).await;

    let wf = h.create_workflow("seo").await;
    assert_eq!(wf.tasks.len(), 5);

    let result = h.engine.assign_team(&h.admin, wf.workflow.id).await.unwrap();
    assert_eq!(result.assignments.len(), 5);
    assert!(result.unassigned.is_empty());
}
