//! Common test helpers for integration tests.
//!
//! Builds an in-memory application seeded with the demo users, project and
//! tasks, and wraps `tower::ServiceExt::oneshot` so endpoint tests read as
//! request/response pairs.
//!
//! Each integration test file is compiled as its own crate, so helpers used
//! by only some files would otherwise warn as dead code.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use taskboard::api::{AppState, AuthConfig, router};
use taskboard::domain::{MIN_PASSWORD_COST, Project, Task};
use taskboard::infrastructure::{
    DEMO_PROJECT_NAME, RepositoryFactory, Repositories, TaskFilter, seed_demo_data,
};

pub const TEST_SECRET: &str = "integration-test-secret";
pub const ADMIN_EMAIL: &str = "admin@demo.test";
pub const ADMIN_PASSWORD: &str = "Passw0rd!";

// =============================================================================
// Application Setup
// =============================================================================

/// In-memory repositories with the demo data loaded, hashed at the
/// cheapest bcrypt cost.
pub async fn seeded_repositories() -> Repositories {
    let repositories = RepositoryFactory::in_memory();
    seed_demo_data(&repositories, MIN_PASSWORD_COST)
        .await
        .expect("seeding in-memory repositories should succeed");
    repositories
}

/// Router over `repositories`, signing tokens with [`TEST_SECRET`].
pub fn create_test_app(repositories: &Repositories) -> Router {
    router(AppState::new(
        repositories.clone(),
        &AuthConfig::new(TEST_SECRET),
    ))
}

pub async fn demo_project(repositories: &Repositories) -> Project {
    repositories
        .project_repository
        .search(Some(DEMO_PROJECT_NAME))
        .await
        .expect("project search should succeed")
        .into_iter()
        .next()
        .expect("demo project should exist")
}

pub async fn demo_tasks(repositories: &Repositories) -> Vec<Task> {
    let project = demo_project(repositories).await;
    repositories
        .task_repository
        .list(&TaskFilter::for_project(project.project_id))
        .await
        .expect("task listing should succeed")
}

/// The seeded task titled `title`.
pub async fn demo_task(repositories: &Repositories, title: &str) -> Task {
    demo_tasks(repositories)
        .await
        .into_iter()
        .find(|task| task.title == title)
        .expect("demo task should exist")
}

// =============================================================================
// Request Helpers
// =============================================================================

/// Decoded response: status, headers and JSON body.
///
/// An empty body decodes as `Null`; a non-JSON body (axum's own extractor
/// rejections) is kept as a string.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn etag(&self) -> Option<&str> {
        self.headers
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
    }
}

/// Sends one request through the router.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

/// Logs in and returns the bearer token.
pub async fn login(app: &Router, email: &str, password: &str) -> String {
    let response = send(
        app,
        Method::POST,
        "/auth/login",
        None,
        &[],
        Some(serde_json::json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "login failed: {:?}", response.body);
    response.body["access_token"]
        .as_str()
        .expect("token response should carry access_token")
        .to_string()
}

pub async fn admin_token(app: &Router) -> String {
    login(app, ADMIN_EMAIL, ADMIN_PASSWORD).await
}
