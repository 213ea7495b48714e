//! Task endpoints.
//!
//! `PATCH /tasks/{id}` is the version-fenced update. The expected version is
//! taken from `If-Match` (`3` or `"3"`), falling back to a `version` field in
//! the body. A request with neither is answered with 428 so that no client
//! can update a task without stating which version it read.
//!
//! Members see and edit only the tasks assigned to them and may not change
//! assignees; admins may do both.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{ETAG, IF_MATCH},
    },
    response::{IntoResponse, Response},
};

use super::auth::AuthenticatedUser;
use super::dto::{CreateTaskRequest, TaskListQuery, TaskResponse, UpdateTaskRequest};
use super::error::{ApiErrorResponse, FieldError};
use crate::api::handlers::AppState;
use crate::domain::{PatchError, ProjectId, Task, TaskId, TaskPatch, Timestamp, validate_title};
use crate::infrastructure::{RepositoryError, TaskFilter};

// =============================================================================
// Helpers
// =============================================================================

/// Strong entity tag for a task version.
fn etag(version: u64) -> String {
    format!("\"{version}\"")
}

/// Responds with the task as JSON plus its `ETag`.
fn task_response(status: StatusCode, task: Task) -> Response {
    let tag = etag(task.version);
    (status, [(ETAG, tag)], Json(TaskResponse::from(task))).into_response()
}

/// Parses an `If-Match` value: a bare or double-quoted non-negative integer.
fn parse_if_match(value: &HeaderValue) -> Option<u64> {
    let text = value.to_str().ok()?.trim();
    let unquoted = text
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(text);
    unquoted.parse().ok()
}

/// Resolves the expected version from the headers, then the body.
fn expected_version(headers: &HeaderMap, body_version: Option<u64>) -> Result<u64, ApiErrorResponse> {
    match headers.get(IF_MATCH) {
        Some(value) => parse_if_match(value).ok_or_else(|| {
            ApiErrorResponse::bad_request(
                "INVALID_IF_MATCH",
                "If-Match must be a task version such as 3 or \"3\"",
            )
        }),
        None => body_version.ok_or_else(|| {
            ApiErrorResponse::precondition_required(
                "Task updates require an If-Match header or a version field",
            )
        }),
    }
}

/// Checks that `user` may apply `patch` to `task`.
fn authorize_update(user: &AuthenticatedUser, task: &Task, patch: &TaskPatch) -> Result<(), ApiErrorResponse> {
    if user.is_admin() {
        return Ok(());
    }
    if task.assignee_user_id.as_ref() != Some(&user.user_id) {
        return Err(ApiErrorResponse::forbidden("Members can only edit their own tasks"));
    }
    if !patch.assignee_user_id.is_keep() {
        return Err(ApiErrorResponse::forbidden("Only admins can reassign tasks"));
    }
    Ok(())
}

fn title_error(error: &PatchError) -> ApiErrorResponse {
    ApiErrorResponse::validation_error(
        "Validation failed",
        vec![FieldError::new("title", error.to_string())],
    )
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /projects/{id}/tasks?status=&assignee=`
///
/// Members only ever see tasks assigned to them; an `assignee` naming anyone
/// else yields an empty list.
///
/// # Errors
///
/// Returns 404 if the project does not exist.
pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<TaskResponse>>, ApiErrorResponse> {
    state
        .project_repository
        .find_by_id(&project_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Project {project_id} not found")))?;

    let assignee = if user.is_admin() {
        query.assignee
    } else {
        if query.assignee.as_ref().is_some_and(|assignee| *assignee != user.user_id) {
            return Ok(Json(Vec::new()));
        }
        Some(user.user_id)
    };

    let filter = TaskFilter::for_project(project_id)
        .with_status(query.status)
        .with_assignee(assignee);
    let tasks = state.task_repository.list(&filter).await?;

    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

/// `POST /projects/{id}/tasks`
///
/// The new task starts at version 0. Without an explicit assignee the
/// requesting user is assigned.
///
/// # Errors
///
/// Returns 404 for an unknown project and 400 for an invalid title.
pub async fn create_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(project_id): Path<ProjectId>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Response, ApiErrorResponse> {
    validate_title(&request.title).map_err(|error| title_error(&error))?;

    state
        .project_repository
        .find_by_id(&project_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Project {project_id} not found")))?;

    let assignee = request.assignee_user_id.unwrap_or(user.user_id);
    let task = Task::new(
        TaskId::generate(),
        project_id,
        request.title.trim(),
        Timestamp::now(),
    )
    .with_assignee(Some(assignee))
    .with_due_date(request.due_date);

    state.task_repository.create(&task).await?;
    tracing::info!(task_id = %task.task_id, project_id = %task.project_id, "Task created");

    Ok(task_response(StatusCode::CREATED, task))
}

/// `GET /tasks/{id}`
///
/// # Errors
///
/// Returns 404 if the task does not exist.
pub async fn get_task(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(task_id): Path<TaskId>,
) -> Result<Response, ApiErrorResponse> {
    let task = state
        .task_repository
        .find_by_id(&task_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Task {task_id} not found")))?;

    Ok(task_response(StatusCode::OK, task))
}

/// `PATCH /tasks/{id}`
///
/// # Errors
///
/// - 400 for a malformed `If-Match` or an invalid patch
/// - 403 if a member edits a task assigned to someone else or changes the
///   assignee
/// - 404 if the task does not exist
/// - 409 with `current_version` if the expected version is stale
/// - 428 if no expected version was supplied
pub async fn update_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<TaskId>,
    headers: HeaderMap,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<Response, ApiErrorResponse> {
    let (patch, body_version) = request.into_parts();

    let current = state
        .task_repository
        .find_by_id(&task_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Task {task_id} not found")))?;
    authorize_update(&user, &current, &patch).inspect_err(|_| {
        tracing::info!(task_id = %task_id, user_id = %user.user_id, "Rejected task update by member");
    })?;

    // The authorization above holds only for the version it saw.
    let expected = expected_version(&headers, body_version)?;
    if expected != current.version {
        return Err(stale_update(&task_id, expected, current.version));
    }

    let patch = patch.trim_title();
    let result = state
        .task_repository
        .conditional_update(&task_id, &patch, expected, Timestamp::now())
        .await;

    match result {
        Ok(task) => {
            tracing::info!(
                task_id = %task_id,
                expected_version = expected,
                version = task.version,
                "Task updated"
            );
            Ok(task_response(StatusCode::OK, task))
        }
        Err(RepositoryError::VersionConflict { actual, .. }) => {
            Err(stale_update(&task_id, expected, actual))
        }
        Err(error) => Err(error.into()),
    }
}

fn stale_update(task_id: &TaskId, expected: u64, actual: u64) -> ApiErrorResponse {
    tracing::warn!(
        task_id = %task_id,
        expected_version = expected,
        actual_version = actual,
        "Rejected stale task update"
    );
    RepositoryError::VersionConflict { expected, actual }.into()
}

/// `DELETE /tasks/{id}`
///
/// # Errors
///
/// Returns 404 if the task does not exist.
pub async fn delete_task(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(task_id): Path<TaskId>,
) -> Result<StatusCode, ApiErrorResponse> {
    if state.task_repository.delete(&task_id).await? {
        tracing::info!(task_id = %task_id, "Task deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiErrorResponse::not_found(format!("Task {task_id} not found")))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{UserId, UserRole};
    use rstest::rstest;

    fn headers_with_if_match(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(IF_MATCH, value.parse().unwrap());
        headers
    }

    #[rstest]
    #[case("3", Some(3))]
    #[case("\"3\"", Some(3))]
    #[case(" 12 ", Some(12))]
    #[case("*", None)]
    #[case("W/\"3\"", None)]
    #[case("-1", None)]
    #[case("\"3", None)]
    fn test_parse_if_match(#[case] value: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse_if_match(&value.parse().unwrap()), expected);
    }

    #[rstest]
    fn test_expected_version_prefers_header() {
        let headers = headers_with_if_match("\"4\"");
        assert_eq!(expected_version(&headers, Some(9)).unwrap(), 4);
    }

    #[rstest]
    fn test_expected_version_falls_back_to_body() {
        assert_eq!(expected_version(&HeaderMap::new(), Some(2)).unwrap(), 2);
    }

    #[rstest]
    fn test_expected_version_missing_is_428() {
        let error = expected_version(&HeaderMap::new(), None).unwrap_err();
        assert_eq!(error.status, StatusCode::PRECONDITION_REQUIRED);
    }

    #[rstest]
    fn test_expected_version_malformed_is_400() {
        let error = expected_version(&headers_with_if_match("abc"), Some(1)).unwrap_err();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    fn member_owning(task: &Task) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: task.assignee_user_id.clone().unwrap(),
            role: UserRole::Member,
        }
    }

    fn assigned_task() -> Task {
        Task::new(TaskId::generate(), ProjectId::generate(), "Mine", Timestamp::now())
            .with_assignee(Some(UserId::generate()))
    }

    #[rstest]
    fn test_member_may_edit_own_task() {
        let task = assigned_task();
        let patch = TaskPatch::new().title("Renamed");
        assert!(authorize_update(&member_owning(&task), &task, &patch).is_ok());
    }

    #[rstest]
    #[case(TaskPatch::new().assignee(UserId::generate()))]
    #[case(TaskPatch::new().clear_assignee())]
    fn test_member_may_not_reassign(#[case] patch: TaskPatch) {
        let task = assigned_task();
        let error = authorize_update(&member_owning(&task), &task, &patch).unwrap_err();
        assert_eq!(error.status, StatusCode::FORBIDDEN);
    }

    #[rstest]
    fn test_member_may_not_edit_others_task() {
        let task = assigned_task();
        let stranger = AuthenticatedUser {
            user_id: UserId::generate(),
            role: UserRole::Member,
        };
        let error = authorize_update(&stranger, &task, &TaskPatch::new().title("X")).unwrap_err();
        assert_eq!(error.status, StatusCode::FORBIDDEN);
        assert_eq!(error.error.code, "FORBIDDEN");
    }

    #[rstest]
    fn test_admin_may_reassign_any_task() {
        let task = assigned_task();
        let admin = AuthenticatedUser {
            user_id: UserId::generate(),
            role: UserRole::Admin,
        };
        assert!(authorize_update(&admin, &task, &TaskPatch::new().clear_assignee()).is_ok());
    }

    #[rstest]
    fn test_etag_is_quoted_version() {
        assert_eq!(etag(7), "\"7\"");
    }
}
