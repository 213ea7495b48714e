//! Transport between the controller and the task store.
//!
//! [`TaskGateway`] is the seam the controller talks through. Two
//! implementations exist: [`HttpTaskGateway`] speaks to a remote server over
//! a [`Session`], and [`RepositoryGateway`] calls a `TaskRepository` in the
//! same process.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::session::Session;
use crate::api::{
    ApiError, CreateProjectRequest, CreateTaskRequest, ProjectResponse, TaskListQuery,
    TaskResponse, UpdateTaskRequest,
};
use crate::domain::{Project, ProjectId, Task, TaskId, TaskPatch, TaskStatus, Timestamp, UserId};
use crate::infrastructure::{RepositoryError, TaskFilter, TaskRepository};

// =============================================================================
// Gateway Error
// =============================================================================

/// Failures of a gateway call, as seen by the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The expected version was stale.
    #[error("version conflict, current version is {current_version}")]
    Conflict { current_version: u64 },

    #[error("not found")]
    NotFound,

    /// The session is missing or was rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// The user may not perform this operation.
    #[error("forbidden")]
    Forbidden,

    /// No response arrived in time. The request may or may not have applied.
    #[error("request timed out")]
    Timeout,

    /// The request failed below HTTP. The request may or may not have applied.
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected response status {status}")]
    Unexpected { status: u16 },
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if let Some(status) = error.status() {
            Self::Unexpected {
                status: status.as_u16(),
            }
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl From<RepositoryError> for GatewayError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(_) => Self::NotFound,
            RepositoryError::VersionConflict { actual, .. } => Self::Conflict {
                current_version: actual,
            },
            RepositoryError::InvalidPatch(_) => Self::Unexpected { status: 400 },
            RepositoryError::AlreadyExists(_) => Self::Unexpected { status: 409 },
            RepositoryError::SerializationError(_) | RepositoryError::DatabaseError(_) => {
                Self::Unexpected { status: 500 }
            }
        }
    }
}

// =============================================================================
// Task Gateway
// =============================================================================

/// Remote task operations used by the optimistic update controller.
pub trait TaskGateway: Send + Sync {
    /// Reads the authoritative record of one task.
    fn fetch_task(&self, task_id: &TaskId) -> BoxFuture<'static, Result<Task, GatewayError>>;

    /// Lists tasks of a project, optionally filtered by status and assignee.
    fn list_tasks(
        &self,
        project_id: &ProjectId,
        status: Option<TaskStatus>,
        assignee: Option<&UserId>,
    ) -> BoxFuture<'static, Result<Vec<Task>, GatewayError>>;

    /// Creates a task under a project.
    fn create_task(
        &self,
        project_id: &ProjectId,
        request: &CreateTaskRequest,
    ) -> BoxFuture<'static, Result<Task, GatewayError>>;

    /// Submits a version-fenced update.
    fn update_task(
        &self,
        task_id: &TaskId,
        patch: &TaskPatch,
        expected_version: u64,
    ) -> BoxFuture<'static, Result<Task, GatewayError>>;
}

// =============================================================================
// HTTP Gateway
// =============================================================================

/// [`TaskGateway`] over the server's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpTaskGateway {
    session: Arc<Session>,
}

impl HttpTaskGateway {
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// `GET /projects?q=`
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` on transport failure or a non-success status.
    pub async fn list_projects(&self, query: Option<&str>) -> Result<Vec<Project>, GatewayError> {
        let mut builder = self.session.request(Method::GET, "/projects");
        if let Some(query) = query {
            builder = builder.query(&[("q", query)]);
        }
        let response = self.session.send(builder).await?;
        let projects: Vec<ProjectResponse> = decode(response).await?;
        Ok(projects.into_iter().map(Project::from).collect())
    }

    /// `POST /projects`
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` on transport failure or a non-success status.
    pub async fn create_project(&self, request: &CreateProjectRequest) -> Result<Project, GatewayError> {
        let builder = self.session.request(Method::POST, "/projects").json(request);
        let response = self.session.send(builder).await?;
        decode::<ProjectResponse>(response).await.map(Project::from)
    }

    /// `DELETE /tasks/{id}`
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` if the task does not exist.
    pub async fn delete_task(&self, task_id: &TaskId) -> Result<(), GatewayError> {
        let builder = self
            .session
            .request(Method::DELETE, &format!("/tasks/{task_id}"));
        let response = self.session.send(builder).await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            status => Err(status_error(status, response).await),
        }
    }
}

/// Decodes a success body or maps the error status.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        response.json().await.map_err(GatewayError::from)
    } else {
        Err(status_error(status, response).await)
    }
}

async fn status_error(status: StatusCode, response: Response) -> GatewayError {
    match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound,
        StatusCode::UNAUTHORIZED => GatewayError::Unauthorized,
        StatusCode::FORBIDDEN => GatewayError::Forbidden,
        StatusCode::CONFLICT => match response.json::<ApiError>().await {
            Ok(ApiError {
                current_version: Some(current_version),
                ..
            }) => GatewayError::Conflict { current_version },
            _ => GatewayError::Unexpected {
                status: status.as_u16(),
            },
        },
        _ => GatewayError::Unexpected {
            status: status.as_u16(),
        },
    }
}

impl TaskGateway for HttpTaskGateway {
    fn fetch_task(&self, task_id: &TaskId) -> BoxFuture<'static, Result<Task, GatewayError>> {
        let session = Arc::clone(&self.session);
        let path = format!("/tasks/{task_id}");

        async move {
            let response = session.send(session.request(Method::GET, &path)).await?;
            decode::<TaskResponse>(response).await.map(Task::from)
        }
        .boxed()
    }

    fn list_tasks(
        &self,
        project_id: &ProjectId,
        status: Option<TaskStatus>,
        assignee: Option<&UserId>,
    ) -> BoxFuture<'static, Result<Vec<Task>, GatewayError>> {
        let session = Arc::clone(&self.session);
        let path = format!("/projects/{project_id}/tasks");
        let query = TaskListQuery {
            status,
            assignee: assignee.cloned(),
        };

        async move {
            let builder = session.request(Method::GET, &path).query(&query);
            let response = session.send(builder).await?;
            let tasks: Vec<TaskResponse> = decode(response).await?;
            Ok(tasks.into_iter().map(Task::from).collect())
        }
        .boxed()
    }

    fn create_task(
        &self,
        project_id: &ProjectId,
        request: &CreateTaskRequest,
    ) -> BoxFuture<'static, Result<Task, GatewayError>> {
        let session = Arc::clone(&self.session);
        let path = format!("/projects/{project_id}/tasks");
        let request = request.clone();

        async move {
            let builder = session.request(Method::POST, &path).json(&request);
            let response = session.send(builder).await?;
            decode::<TaskResponse>(response).await.map(Task::from)
        }
        .boxed()
    }

    fn update_task(
        &self,
        task_id: &TaskId,
        patch: &TaskPatch,
        expected_version: u64,
    ) -> BoxFuture<'static, Result<Task, GatewayError>> {
        let session = Arc::clone(&self.session);
        let path = format!("/tasks/{task_id}");
        let body = UpdateTaskRequest::from(patch.clone());

        async move {
            let builder = session
                .request(Method::PATCH, &path)
                .header(reqwest::header::IF_MATCH, format!("\"{expected_version}\""))
                .json(&body);
            let response = session.send(builder).await?;
            decode::<TaskResponse>(response).await.map(Task::from)
        }
        .boxed()
    }
}

// =============================================================================
// In-Process Gateway
// =============================================================================

/// [`TaskGateway`] backed directly by a `TaskRepository`.
///
/// Created tasks have no creating user, so they stay unassigned unless the
/// request names an assignee.
#[derive(Clone)]
pub struct RepositoryGateway {
    repository: Arc<dyn TaskRepository>,
}

impl RepositoryGateway {
    #[must_use]
    pub fn new(repository: Arc<dyn TaskRepository>) -> Self {
        Self { repository }
    }
}

impl std::fmt::Debug for RepositoryGateway {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RepositoryGateway")
            .field("repository", &"Arc<dyn TaskRepository>")
            .finish()
    }
}

impl TaskGateway for RepositoryGateway {
    fn fetch_task(&self, task_id: &TaskId) -> BoxFuture<'static, Result<Task, GatewayError>> {
        self.repository
            .find_by_id(task_id)
            .map(|result| {
                result
                    .map_err(GatewayError::from)
                    .and_then(|task| task.ok_or(GatewayError::NotFound))
            })
            .boxed()
    }

    fn list_tasks(
        &self,
        project_id: &ProjectId,
        status: Option<TaskStatus>,
        assignee: Option<&UserId>,
    ) -> BoxFuture<'static, Result<Vec<Task>, GatewayError>> {
        let filter = TaskFilter::for_project(project_id.clone())
            .with_status(status)
            .with_assignee(assignee.cloned());
        self.repository
            .list(&filter)
            .map(|result| result.map_err(GatewayError::from))
            .boxed()
    }

    fn create_task(
        &self,
        project_id: &ProjectId,
        request: &CreateTaskRequest,
    ) -> BoxFuture<'static, Result<Task, GatewayError>> {
        let task = Task::new(
            TaskId::generate(),
            project_id.clone(),
            request.title.trim(),
            Timestamp::now(),
        )
        .with_assignee(request.assignee_user_id.clone())
        .with_due_date(request.due_date);
        let repository = Arc::clone(&self.repository);

        async move {
            repository.create(&task).await?;
            Ok(task)
        }
        .boxed()
    }

    fn update_task(
        &self,
        task_id: &TaskId,
        patch: &TaskPatch,
        expected_version: u64,
    ) -> BoxFuture<'static, Result<Task, GatewayError>> {
        self.repository
            .conditional_update(task_id, patch, expected_version, Timestamp::now())
            .map(|result| result.map_err(GatewayError::from))
            .boxed()
    }
}

// =============================================================================
// Tests
// =============================================================================
