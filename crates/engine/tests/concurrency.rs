mod common;

use assert_matches::assert_matches;

use agency_core::error::CoreError;
use agency_core::workflow::{TaskStatus, TaskUpdateFields, WorkflowStatus};

use common::{harness, task, Harness};

async fn start(h: &Harness, task_id: i64) {
    h.engine
        .update_task_status(&h.admin, task_id, TaskStatus::InProgress, TaskUpdateFields::default())
        .await
        .unwrap();
}

async fn complete(h: &Harness, task_id: i64) {
    h.engine
        .update_task_status(&h.admin, task_id, TaskStatus::Completed, TaskUpdateFields::default())
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_completions_on_one_workflow_stay_consistent() {
    let h = harness();
    let dev = h.employee(10, 40.0, &["web"]).await;
    h.register_chain_template("website").await;
    let wf = h.create_workflow("website").await;
    h.engine.assign_team(&h.admin, wf.workflow.id).await.unwrap();
    let (t1, t2, t3) = (task(&wf, "T1").id, task(&wf, "T2").id, task(&wf, "T3").id);

    start(&h, t1).await;
    complete(&h, t1).await;
    start(&h, t2).await;
    start(&h, t3).await;

    let handles: Vec<_> = [t2, t3]
        .into_iter()
        .map(|id| {
            let engine = h.engine.clone();
            let admin = h.admin;
            tokio::spawn(async move {
                engine
                    .update_task_status(&admin, id, TaskStatus::Completed, TaskUpdateFields::default())
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let detail = h.engine.get_workflow(&h.admin, wf.workflow.id).await.unwrap();
    assert_eq!(detail.workflow.status, WorkflowStatus::Completed);
    assert_eq!(detail.workflow.progress, 100);
    assert!(detail.tasks.iter().all(|t| t.status == TaskStatus::Completed));

    let dev = h.employee_state(dev.id).await;
    assert_eq!(dev.current_workload, 0.0);
    assert_eq!(dev.current_project_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_workflows_never_drive_workload_negative() {
    let h = harness();
    let dev = h.employee_with_slots(10, 40.0, 10, &["web"]).await;
    h.register_chain_template("website").await;

    let mut workflows = Vec::new();
    for _ in 0..4 {
        let wf = h.create_workflow("website").await;
        h.engine.assign_team(&h.admin, wf.workflow.id).await.unwrap();
        workflows.push(wf);
    }
    assert_eq!(h.employee_state(dev.id).await.current_workload, 24.0);
    assert_eq!(h.employee_state(dev.id).await.current_project_count, 4);

    let handles: Vec<_> = workflows
        .iter()
        .map(|wf| {
            let engine = h.engine.clone();
            let admin = h.admin;
            let ids = [task(wf, "T1").id, task(wf, "T2").id, task(wf, "T3").id];
            tokio::spawn(async move {
                let fields = TaskUpdateFields::default;
                engine.update_task_status(&admin, ids[0], TaskStatus::InProgress, fields()).await?;
                engine.update_task_status(&admin, ids[0], TaskStatus::Completed, fields()).await?;
                for id in &ids[1..] {
                    engine.update_task_status(&admin, *id, TaskStatus::InProgress, fields()).await?;
                    engine.update_task_status(&admin, *id, TaskStatus::Completed, fields()).await?;
                }
                Ok::<_, CoreError>(())
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let dev = h.employee_state(dev.id).await;
    assert_eq!(dev.current_workload, 0.0);
    assert_eq!(dev.current_project_count, 0);
}

#[tokio::test]
async fn transient_commit_failures_are_retried() {
    let h = harness();
    h.employee(10, 40.0, &["web"]).await;
    h.register_chain_template("website").await;
    let wf = h.create_workflow("website").await;
    h.engine.assign_team(&h.admin, wf.workflow.id).await.unwrap();
    let t1 = task(&wf, "T1").id;

    h.store.fail_next_commits(2);
    start(&h, t1).await;

    let detail = h.engine.get_workflow(&h.admin, wf.workflow.id).await.unwrap();
    assert_eq!(task(&detail, "T1").status, TaskStatus::InProgress);
    assert_eq!(detail.workflow.status, WorkflowStatus::InProgress);
}

#[tokio::test]
async fn exhausted_retries_surface_as_transient_and_change_nothing() {
    let h = harness();
    let dev = h.employee(10, 40.0, &["web"]).await;
    h.register_chain_template("website").await;
    let wf = h.create_workflow("website").await;
    h.engine.assign_team(&h.admin, wf.workflow.id).await.unwrap();
    let t1 = task(&wf, "T1").id;
    start(&h, t1).await;

    h.store.fail_next_commits(10);
    let result = h
        .engine
        .update_task_status(&h.admin, t1, TaskStatus::Completed, TaskUpdateFields::default())
        .await;
    assert_matches!(result, Err(CoreError::TransientStore(_)));
    h.store.fail_next_commits(0);

    let detail = h.engine.get_workflow(&h.admin, wf.workflow.id).await.unwrap();
    assert_eq!(task(&detail, "T1").status, TaskStatus::InProgress);
    assert_eq!(detail.workflow.progress, 0);
    assert_eq!(h.employee_state(dev.id).await.current_workload, 6.0);
}
