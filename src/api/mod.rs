//! HTTP API: route definitions, handlers and wire types.

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod project;
pub mod task;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use auth::{AuthConfig, AuthConfigError, AuthError, AuthenticatedUser, Claims, TokenService, login};
pub use dto::{
    CreateProjectRequest, CreateTaskRequest, LoginRequest, ProjectResponse, ProjectSearchQuery,
    TaskListQuery, TaskResponse, TokenResponse, UpdateTaskRequest,
};
pub use error::{ApiError, ApiErrorResponse, FieldError};
pub use handlers::{AppState, HealthResponse, health_check};
pub use project::{create_project, list_projects};
pub use task::{create_task, delete_task, get_task, list_tasks, update_task};

/// Builds the application router with tracing and permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(login))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{id}/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
