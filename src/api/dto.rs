//! Data Transfer Objects for API requests and responses.
//!
//! The same types are used by the HTTP client in [`crate::client`], so each
//! response DTO is both `Serialize` and `Deserialize`.

use serde::{Deserialize, Serialize};

use crate::domain::{
    FieldUpdate, Project, ProjectId, Task, TaskId, TaskPatch, TaskStatus, Timestamp, UserId,
};

// =============================================================================
// Auth DTOs
// =============================================================================

/// Request body for `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response body for a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `"bearer"`.
    pub token_type: String,
}

impl TokenResponse {
    #[must_use]
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

// =============================================================================
// Project DTOs
// =============================================================================

/// Request body for `POST /projects`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Query string for `GET /projects`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectSearchQuery {
    /// Case-insensitive substring of the project name.
    pub q: Option<String>,
}

/// Response DTO for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Timestamp,
}

impl From<Project> for ProjectResponse {
    fn from(project: Project) -> Self {
        Self {
            id: project.project_id,
            name: project.name,
            description: project.description,
            created_at: project.created_at,
        }
    }
}

impl From<ProjectResponse> for Project {
    fn from(response: ProjectResponse) -> Self {
        Self {
            project_id: response.id,
            name: response.name,
            description: response.description,
            created_at: response.created_at,
        }
    }
}

// =============================================================================
// Task DTOs
// =============================================================================

/// Request body for `POST /projects/{id}/tasks`.
///
/// When `assignee_user_id` is omitted the creating user becomes the assignee.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_user_id: Option<UserId>,
}

impl CreateTaskRequest {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_assignee(self, assignee_user_id: UserId) -> Self {
        Self {
            assignee_user_id: Some(assignee_user_id),
            ..self
        }
    }

    #[must_use]
    pub fn with_due_date(self, due_date: Timestamp) -> Self {
        Self {
            due_date: Some(due_date),
            ..self
        }
    }
}

/// Request body for `PATCH /tasks/{id}`.
///
/// Field encoding follows [`TaskPatch`]. `version` is only read when the
/// request carries no `If-Match` header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default, skip_serializing_if = "FieldUpdate::is_keep")]
    pub title: FieldUpdate<String>,
    #[serde(default, skip_serializing_if = "FieldUpdate::is_keep")]
    pub status: FieldUpdate<TaskStatus>,
    #[serde(default, skip_serializing_if = "FieldUpdate::is_keep")]
    pub assignee_user_id: FieldUpdate<UserId>,
    #[serde(default, skip_serializing_if = "FieldUpdate::is_keep")]
    pub due_date: FieldUpdate<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl UpdateTaskRequest {
    /// Splits the request into the patch and the body version.
    #[must_use]
    pub fn into_parts(self) -> (TaskPatch, Option<u64>) {
        let patch = TaskPatch {
            title: self.title,
            status: self.status,
            assignee_user_id: self.assignee_user_id,
            due_date: self.due_date,
        };
        (patch, self.version)
    }
}

impl From<TaskPatch> for UpdateTaskRequest {
    fn from(patch: TaskPatch) -> Self {
        Self {
            title: patch.title,
            status: patch.status,
            assignee_user_id: patch.assignee_user_id,
            due_date: patch.due_date,
            version: None,
        }
    }
}

/// Query string for `GET /projects/{id}/tasks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskListQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserId>,
}

/// Response DTO for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub title: String,
    pub status: TaskStatus,
    pub assignee_user_id: Option<UserId>,
    pub due_date: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub version: u64,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.task_id,
            project_id: task.project_id,
            title: task.title,
            status: task.status,
            assignee_user_id: task.assignee_user_id,
            due_date: task.due_date,
            created_at: task.created_at,
            updated_at: task.updated_at,
            version: task.version,
        }
    }
}

impl From<TaskResponse> for Task {
    fn from(response: TaskResponse) -> Self {
        Self {
            task_id: response.id,
            project_id: response.project_id,
            title: response.title,
            status: response.status,
            assignee_user_id: response.assignee_user_id,
            due_date: response.due_date,
            created_at: response.created_at,
            updated_at: response.updated_at,
            version: response.version,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
