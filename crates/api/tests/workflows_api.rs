//! Workflow creation, team assignment and task progression over HTTP.

mod common;

use agency_core::types::DbId;
use axum::http::StatusCode;
use common::{body_json, create_employee, TestApp, CLIENT};
use serde_json::{json, Value};

const DESIGNER_USER: DbId = 10;

async fn register_website_template(app: &TestApp) {
    let response = app
        .put(
            "/api/v1/templates",
            &app.manager(),
            json!({
                "service_type": "website",
                "service_tier": "basic",
                "blueprints": [
                    { "key": "design", "title": "Design", "order": 1,
                      "estimated_hours": 2.0, "required_skills": ["web"] },
                    { "key": "build", "title": "Build", "order": 2,
                      "estimated_hours": 3.0, "required_skills": ["web"],
                      "dependencies": ["design"], "visible_to_client": false },
                ],
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

async fn create_website(app: &TestApp, auto_assign: bool) -> Value {
    let response = app
        .post(
            "/api/v1/workflows",
            &app.manager(),
            json!({
                "user_id": CLIENT,
                "service_type": "website",
                "service_name": "Marketing site",
                "service_tier": "basic",
                "service_amount_cents": 250_000,
                "internal_notes": "rush job",
                "auto_assign": auto_assign,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

fn task_id(detail: &Value, title: &str) -> DbId {
    detail["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["title"] == title)
        .and_then(|t| t["id"].as_i64())
        .unwrap_or_else(|| panic!("task {title} missing"))
}

async fn set_status(app: &TestApp, token: &str, task: DbId, status: &str) -> axum::response::Response {
    app.put(
        &format!("/api/v1/tasks/{task}/status"),
        token,
        json!({ "status": status }),
    )
    .await
}

#[tokio::test]
async fn auto_assigned_workflow_runs_to_completion() {
    let app = common::build_test_app();
    register_website_template(&app).await;
    let employee = create_employee(&app, DESIGNER_USER, 40.0, &["web"]).await;

    let created = create_website(&app, true).await;
    let workflow_id = created["workflow"]["id"].as_i64().unwrap();
    assert_eq!(created["workflow"]["status"], "pending");
    assert_eq!(created["workflow"]["team_assigned"], true);
    let assignments = created["assignment"]["assignments"].as_array().unwrap();
    assert_eq!(assignments.len(), 2);
    assert!(assignments.iter().all(|a| a["employee_id"] == employee));

    let worker = app.token(DESIGNER_USER, "employee");
    let design = task_id(&created, "Design");
    let build = task_id(&created, "Build");

    let response = set_status(&app, &worker, build, "in_progress").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["code"], "DEPENDENCY_NOT_SATISFIED");

    for (task, status) in [
        (design, "in_progress"),
        (design, "completed"),
        (build, "in_progress"),
        (build, "completed"),
    ] {
        let response = set_status(&app, &worker, task, status).await;
        assert_eq!(response.status(), StatusCode::OK, "{task} -> {status}");
    }

    let detail = body_json(
        app.get(&format!("/api/v1/workflows/{workflow_id}"), &app.manager())
            .await,
    )
    .await;
    assert_eq!(detail["data"]["workflow"]["status"], "completed");
    assert_eq!(detail["data"]["workflow"]["progress"], 100);
    assert_eq!(detail["data"]["team"][0]["status"], "completed");

    let staff = body_json(
        app.get(&format!("/api/v1/employees/{employee}"), &app.manager())
            .await,
    )
    .await;
    assert_eq!(staff["data"]["current_workload"], 0.0);
    assert_eq!(staff["data"]["current_project_count"], 0);
}

#[tokio::test]
async fn second_assignment_run_conflicts() {
    let app = common::build_test_app();
    register_website_template(&app).await;
    create_employee(&app, DESIGNER_USER, 40.0, &["web"]).await;
    let created = create_website(&app, false).await;
    let workflow_id = created["workflow"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/workflows/{workflow_id}/assign-team");

    let first = app.post(&uri, &app.manager(), json!({})).await;
    assert_eq!(first.status(), StatusCode::OK);
    let result = body_json(first).await;
    assert_eq!(result["data"]["workflow_id"], workflow_id);
    assert!(result["data"]["unassigned"].as_array().unwrap().is_empty());

    let second = app.post(&uri, &app.manager(), json!({})).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(second).await["code"], "ALREADY_ASSIGNED");
}

#[tokio::test]
async fn unstaffable_tasks_are_reported_not_failed() {
    let app = common::build_test_app();
    register_website_template(&app).await;
    create_employee(&app, DESIGNER_USER, 40.0, &["seo"]).await;
    let created = create_website(&app, false).await;
    let workflow_id = created["workflow"]["id"].as_i64().unwrap();

    let response = app
        .post(
            &format!("/api/v1/workflows/{workflow_id}/assign-team"),
            &app.manager(),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let result = body_json(response).await;
    assert!(result["data"]["assignments"].as_array().unwrap().is_empty());
    assert_eq!(result["data"]["unassigned"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn clients_get_a_filtered_view_of_their_workflow() {
    let app = common::build_test_app();
    register_website_template(&app).await;
    let created = create_website(&app, false).await;
    let workflow_id = created["workflow"]["id"].as_i64().unwrap();

    let client = app.token(CLIENT, "client");
    let response = app
        .get(&format!("/api/v1/workflows/{workflow_id}"), &client)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    assert!(view["data"]["workflow"]["internal_notes"].is_null());
    let titles: Vec<&str> = view["data"]["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["title"].as_str())
        .collect();
    assert_eq!(titles, ["Design"]);

    let stranger = app.token(CLIENT + 1, "client");
    let response = app
        .get(&format!("/api/v1/workflows/{workflow_id}"), &stranger)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let listed = body_json(app.get("/api/v1/workflows", &stranger).await).await;
    assert!(listed["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn illegal_workflow_transitions_are_unprocessable() {
    let app = common::build_test_app();
    register_website_template(&app).await;
    let created = create_website(&app, false).await;
    let workflow_id = created["workflow"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/workflows/{workflow_id}/status");

    let cancelled = app
        .put(&uri, &app.manager(), json!({ "status": "cancelled" }))
        .await;
    assert_eq!(cancelled.status(), StatusCode::OK);
    assert_eq!(body_json(cancelled).await["data"]["status"], "cancelled");

    let response = app
        .put(&uri, &app.manager(), json!({ "status": "in_progress" }))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn notes_update_leaves_progress_alone() {
    let app = common::build_test_app();
    register_website_template(&app).await;
    let created = create_website(&app, false).await;
    let workflow_id = created["workflow"]["id"].as_i64().unwrap();

    let response = app
        .put(
            &format!("/api/v1/workflows/{workflow_id}/notes"),
            &app.manager(),
            json!({ "client_notes": "Kickoff moved to Monday" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["data"]["client_notes"], "Kickoff moved to Monday");
    assert_eq!(updated["data"]["internal_notes"], "rush job");
    assert_eq!(updated["data"]["progress"], 0);
}

#[tokio::test]
async fn unknown_template_tier_is_a_validation_error() {
    let app = common::build_test_app();
    let response = app
        .get("/api/v1/templates/seo/platinum", &app.manager())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    let response = app.get("/api/v1/templates/seo/premium", &app.manager()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let template = body_json(response).await;
    assert_eq!(template["data"]["name"], "seo:premium");
}

#[tokio::test]
async fn active_filter_hides_inactive_employees() {
    let app = common::build_test_app();
    create_employee(&app, 10, 40.0, &["web"]).await;
    let benched = create_employee(&app, 11, 40.0, &["web"]).await;
    let response = app
        .put(
            &format!("/api/v1/employees/{benched}"),
            &app.admin(),
            json!({ "status": "inactive" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let all = body_json(app.get("/api/v1/employees", &app.manager()).await).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);
    let active = body_json(app.get("/api/v1/employees?active=true", &app.manager()).await).await;
    assert_eq!(active["data"].as_array().unwrap().len(), 1);
    assert_eq!(active["data"][0]["user_id"], 10);
}
