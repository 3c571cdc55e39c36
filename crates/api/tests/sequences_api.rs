//! Sequence review and per-lead assignment runs over HTTP.

mod common;

use agency_core::types::DbId;
use axum::http::StatusCode;
use common::{body_json, TestApp};
use serde_json::{json, Value};

const LEAD: DbId = 77;

async fn approved_sequence(app: &TestApp) -> DbId {
    let response = app
        .post(
            "/api/v1/sequences",
            &app.manager(),
            json!({
                "name": "Welcome drip",
                "steps": [
                    { "order": 2, "action": "sms", "delay_hours": 24.0, "body": "Still there?" },
                    { "order": 1, "action": "email", "subject": "Hello", "body": "Welcome!" },
                ],
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["data"]["status"], "draft");
    assert_eq!(created["data"]["steps"][0]["action"], "email");
    let id = created["data"]["id"].as_i64().unwrap();

    for status in ["pending", "approved"] {
        let response = app
            .put(
                &format!("/api/v1/sequences/{id}/status"),
                &app.admin(),
                json!({ "status": status }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "-> {status}");
    }
    id
}

async fn assign(app: &TestApp, sequence_id: DbId, auto_start: bool) -> axum::response::Response {
    app.post(
        "/api/v1/sequence-assignments",
        &app.manager(),
        json!({ "sequence_id": sequence_id, "lead_id": LEAD, "auto_start": auto_start }),
    )
    .await
}

async fn advance(app: &TestApp, id: DbId) -> Value {
    let response = app
        .post(
            &format!("/api/v1/sequence-assignments/{id}/advance"),
            &app.manager(),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["data"].clone()
}

#[tokio::test]
async fn approval_records_the_approver() {
    let app = common::build_test_app();
    let id = approved_sequence(&app).await;

    let fetched = body_json(
        app.get(&format!("/api/v1/sequences/{id}"), &app.manager())
            .await,
    )
    .await;
    assert_eq!(fetched["data"]["status"], "approved");
    assert_eq!(fetched["data"]["approved_by_id"], common::ADMIN);
    assert!(fetched["data"]["approved_at"].is_string());

    let listed = body_json(app.get("/api/v1/sequences", &app.manager()).await).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn assignments_need_an_existing_lead() {
    let app = common::build_test_app();
    let sequence = approved_sequence(&app).await;

    let response = assign(&app, sequence, false).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn second_open_assignment_for_a_lead_conflicts() {
    let app = common::build_test_app();
    app.store.add_lead(LEAD);
    let sequence = approved_sequence(&app).await;

    let first = assign(&app, sequence, false).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(body_json(first).await["data"]["status"], "pending");

    let second = assign(&app, sequence, true).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(second).await["code"],
        "DUPLICATE_ACTIVE_ASSIGNMENT"
    );
}

#[tokio::test]
async fn advancing_walks_every_step_and_completes() {
    let app = common::build_test_app();
    app.store.add_lead(LEAD);
    let sequence = approved_sequence(&app).await;

    let created = body_json(assign(&app, sequence, true).await).await;
    assert_eq!(created["data"]["status"], "active");
    let id = created["data"]["id"].as_i64().unwrap();

    let after_first = advance(&app, id).await;
    assert_eq!(after_first["status"], "active");
    assert_eq!(after_first["current_step"], 1);

    let after_last = advance(&app, id).await;
    assert_eq!(after_last["status"], "completed");

    let response = app
        .post(
            &format!("/api/v1/sequence-assignments/{id}/advance"),
            &app.manager(),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let activities = body_json(
        app.get(
            &format!("/api/v1/sequence-assignments/{id}/activities"),
            &app.manager(),
        )
        .await,
    )
    .await;
    let kinds: Vec<&str> = activities["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["action_type"].as_str())
        .collect();
    assert_eq!(
        kinds,
        ["sequence_active", "step_email", "step_sms", "sequence_completed"]
    );
}

#[tokio::test]
async fn pausing_and_resuming_an_assignment() {
    let app = common::build_test_app();
    app.store.add_lead(LEAD);
    let sequence = approved_sequence(&app).await;
    let created = body_json(assign(&app, sequence, true).await).await;
    let id = created["data"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/sequence-assignments/{id}/status");

    let paused = app
        .put(&uri, &app.manager(), json!({ "status": "paused", "notes": "lead on vacation" }))
        .await;
    assert_eq!(paused.status(), StatusCode::OK);
    assert_eq!(body_json(paused).await["data"]["status"], "paused");

    let resumed = app
        .put(&uri, &app.manager(), json!({ "status": "active" }))
        .await;
    assert_eq!(resumed.status(), StatusCode::OK);

    let fetched = body_json(
        app.get(&format!("/api/v1/sequence-assignments/{id}"), &app.manager())
            .await,
    )
    .await;
    assert_eq!(fetched["data"]["status"], "active");
}

#[tokio::test]
async fn employees_cannot_create_sequences() {
    let app = common::build_test_app();
    let response = app
        .post(
            "/api/v1/sequences",
            &app.token(10, "employee"),
            json!({ "name": "Nope", "steps": [{ "order": 1, "action": "wait" }] }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
