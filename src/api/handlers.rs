//! Shared application state and the health endpoint.

use std::sync::Arc;

use axum::Json;

use super::auth::{AuthConfig, TokenService};
use crate::infrastructure::{ProjectRepository, Repositories, TaskRepository, UserRepository};

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
///
/// Repositories are trait objects so the backend can be selected at runtime
/// by `RepositoryFactory`.
#[derive(Clone)]
pub struct AppState {
    pub task_repository: Arc<dyn TaskRepository>,
    pub project_repository: Arc<dyn ProjectRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    /// Creates the state from initialized repositories and token settings.
    #[must_use]
    pub fn new(repositories: Repositories, auth: &AuthConfig) -> Self {
        Self {
            task_repository: repositories.task_repository,
            project_repository: repositories.project_repository,
            user_repository: repositories.user_repository,
            tokens: Arc::new(TokenService::new(auth)),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AppState")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Health check response body.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness check. Requires no authentication.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}
