//! Project endpoints: search and create.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};

use super::auth::AuthenticatedUser;
use super::dto::{CreateProjectRequest, ProjectResponse, ProjectSearchQuery};
use super::error::{ApiErrorResponse, FieldError};
use super::handlers::AppState;
use crate::domain::{MAX_TITLE_LENGTH, Project, ProjectId, Timestamp};

/// `GET /projects?q=`
///
/// # Errors
///
/// Returns 500 if the repository fails.
pub async fn list_projects(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<ProjectSearchQuery>,
) -> Result<Json<Vec<ProjectResponse>>, ApiErrorResponse> {
    let projects = state
        .project_repository
        .search(query.q.as_deref())
        .await?;

    Ok(Json(projects.into_iter().map(ProjectResponse::from).collect()))
}

/// `POST /projects`
///
/// # Errors
///
/// Returns 400 if the name is blank or longer than 200 characters.
pub async fn create_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiErrorResponse> {
    let name = validate_project_name(&request.name)?;
    let description = request
        .description
        .map(|description| description.trim().to_string())
        .filter(|description| !description.is_empty());

    let mut project = Project::new(ProjectId::generate(), name, Timestamp::now());
    if let Some(description) = description {
        project = project.with_description(description);
    }

    state.project_repository.create(&project).await?;
    tracing::info!(project_id = %project.project_id, user_id = %user.user_id, "Project created");

    Ok((StatusCode::CREATED, Json(ProjectResponse::from(project))))
}

fn validate_project_name(name: &str) -> Result<String, ApiErrorResponse> {
    let trimmed = name.trim();
    let message = if trimmed.is_empty() {
        "name must not be empty".to_string()
    } else if trimmed.chars().count() > MAX_TITLE_LENGTH {
        format!("name must be at most {MAX_TITLE_LENGTH} characters")
    } else {
        return Ok(trimmed.to_string());
    };
    Err(ApiErrorResponse::validation_error(
        "Validation failed",
        vec![FieldError::new("name", message)],
    ))
}
