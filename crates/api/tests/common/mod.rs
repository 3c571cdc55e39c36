#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use agency_api::auth::jwt::{generate_access_token, JwtConfig};
use agency_api::config::ServerConfig;
use agency_api::router::build_app_router;
use agency_api::state::AppState;
use agency_core::types::DbId;
use agency_engine::{Engine, EngineConfig, InMemoryStore, RetryPolicy, Stores};
use agency_events::EventBus;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

pub const ADMIN: DbId = 1;
pub const MANAGER: DbId = 2;
pub const CLIENT: DbId = 500;

/// Build a test `ServerConfig` with safe defaults and quick retries.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        database_url: None,
        db_max_connections: 1,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
        engine: EngineConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                backoff_multiplier: 2.0,
                jitter: false,
            },
            assignment_lease: Duration::from_secs(300),
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    config: ServerConfig,
}

/// Build the full application router over a fresh in-memory store.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(InMemoryStore::new());
    let engine = Engine::new(
        Stores::shared(store.clone()),
        Arc::new(EventBus::default()),
        config.engine.clone(),
    );
    let state = AppState {
        config: Arc::new(config.clone()),
        engine,
        pool: None,
    };
    TestApp {
        router: build_app_router(state, &config),
        store,
        config,
    }
}

impl TestApp {
    pub fn token(&self, user_id: DbId, role: &str) -> String {
        generate_access_token(user_id, role, &self.config.jwt).expect("token should encode")
    }

    pub fn admin(&self) -> String {
        self.token(ADMIN, "admin")
    }

    pub fn manager(&self) -> String {
        self.token(MANAGER, "manager")
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: serde_json::Value) -> Response<Body> {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: serde_json::Value) -> Response<Body> {
        self.send(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(Method::DELETE, uri, token, None).await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        body: Option<serde_json::Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {token}"));
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("request should build"))
            .await
            .expect("router should respond")
    }
}

/// Send a request without any `Authorization` header.
pub async fn get_anonymous(app: &TestApp, uri: &str) -> Response<Body> {
    app.router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

/// Onboard an employee through the API and return its id.
pub async fn create_employee(app: &TestApp, user_id: DbId, capacity: f64, skills: &[&str]) -> DbId {
    let response = app
        .post(
            "/api/v1/employees",
            &app.admin(),
            serde_json::json!({
                "user_id": user_id,
                "employee_role": "developer",
                "weekly_capacity": capacity,
                "max_concurrent_projects": 3,
                "skill_set": skills,
            }),
        )
        .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    body_json(response).await["data"]["id"]
        .as_i64()
        .expect("employee id")
}
