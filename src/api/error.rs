//! API error handling.
//!
//! Every handler error is an [`ApiErrorResponse`]: a status code plus a JSON
//! body of the form `{code, message, details?, current_version?}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::auth::AuthError;
use crate::domain::PatchError;
use crate::infrastructure::RepositoryError;

// =============================================================================
// API Error
// =============================================================================

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Field-level errors for validation failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
    /// Authoritative version of the task, present on version conflicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<u64>,
}

impl ApiError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            current_version: None,
        }
    }

    /// Creates a validation error with field-level details.
    #[must_use]
    pub fn validation(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self {
            details: Some(details),
            ..Self::new("VALIDATION_ERROR", message)
        }
    }
}

/// Field-level error for validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// API Error Response
// =============================================================================

/// API error response containing status code and error details.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub error: ApiError,
}

impl ApiErrorResponse {
    #[must_use]
    pub const fn new(status: StatusCode, error: ApiError) -> Self {
        Self { status, error }
    }

    /// Creates a 400 Bad Request response.
    #[must_use]
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiError::new(code, message))
    }

    /// Creates a 400 Bad Request response for validation errors.
    #[must_use]
    pub fn validation_error(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ApiError::validation(message, details),
        )
    }

    /// Creates a 401 Unauthorized response.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ApiError::new("UNAUTHORIZED", message),
        )
    }

    /// Creates a 403 Forbidden response.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, ApiError::new("FORBIDDEN", message))
    }

    /// Creates a 404 Not Found response.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", message))
    }

    /// Creates a 409 Conflict response carrying the authoritative version.
    #[must_use]
    pub fn conflict(message: impl Into<String>, current_version: u64) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            ApiError {
                current_version: Some(current_version),
                ..ApiError::new("VERSION_CONFLICT", message)
            },
        )
    }

    /// Creates a 428 Precondition Required response.
    #[must_use]
    pub fn precondition_required(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::PRECONDITION_REQUIRED,
            ApiError::new("PRECONDITION_REQUIRED", message),
        )
    }

    /// Creates a 500 Internal Server Error response.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new("INTERNAL_ERROR", message),
        )
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<RepositoryError> for ApiErrorResponse {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(id) => Self::not_found(format!("Entity {id} not found")),
            RepositoryError::VersionConflict { expected, actual } => Self::conflict(
                format!("Expected version {expected}, found {actual}"),
                actual,
            ),
            RepositoryError::AlreadyExists(id) => Self::new(
                StatusCode::CONFLICT,
                ApiError::new("ALREADY_EXISTS", format!("Entity {id} already exists")),
            ),
            RepositoryError::InvalidPatch(error) => Self::from(error),
            RepositoryError::DatabaseError(_) | RepositoryError::SerializationError(_) => {
                tracing::error!(%error, "Repository failure");
                Self::internal_error("An internal error occurred")
            }
        }
    }
}

impl From<PatchError> for ApiErrorResponse {
    fn from(error: PatchError) -> Self {
        let field = match error {
            PatchError::NotNullable(field) => field,
            PatchError::EmptyTitle | PatchError::TitleTooLong => "title",
        };
        Self::validation_error(
            "Validation failed",
            vec![FieldError::new(field, error.to_string())],
        )
    }
}

impl From<AuthError> for ApiErrorResponse {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::TokenIssue(_) => {
                tracing::error!(%error, "Token issuance failed");
                Self::internal_error("An internal error occurred")
            }
            AuthError::Repository(error) => Self::from(error),
            AuthError::MissingToken
            | AuthError::MalformedHeader
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::UnknownUser
            | AuthError::InvalidCredentials => Self::unauthorized(error.to_string()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_version_conflict_maps_to_409_with_current_version() {
        let response = ApiErrorResponse::from(RepositoryError::VersionConflict {
            expected: 0,
            actual: 1,
        });

        assert_eq!(response.status, StatusCode::CONFLICT);
        assert_eq!(response.error.code, "VERSION_CONFLICT");
        assert_eq!(response.error.current_version, Some(1));
    }

    #[rstest]
    fn test_conflict_body_serialization() {
        let response = ApiErrorResponse::conflict("Expected version 0, found 1", 1);

        let json = serde_json::to_value(&response.error).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "code": "VERSION_CONFLICT",
                "message": "Expected version 0, found 1",
                "current_version": 1
            })
        );
    }

    #[rstest]
    #[case(RepositoryError::NotFound("x".to_string()), StatusCode::NOT_FOUND)]
    #[case(RepositoryError::AlreadyExists("x".to_string()), StatusCode::CONFLICT)]
    #[case(RepositoryError::InvalidPatch(PatchError::EmptyTitle), StatusCode::BAD_REQUEST)]
    #[case(RepositoryError::DatabaseError("boom".to_string()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_repository_error_status(#[case] error: RepositoryError, #[case] expected: StatusCode) {
        assert_eq!(ApiErrorResponse::from(error).status, expected);
    }

    #[rstest]
    fn test_internal_error_hides_details() {
        let response = ApiErrorResponse::from(RepositoryError::DatabaseError(
            "password authentication failed".to_string(),
        ));

        assert!(!response.error.message.contains("password"));
    }

    #[rstest]
    fn test_patch_error_names_field() {
        let response = ApiErrorResponse::from(PatchError::NotNullable("status"));

        let details = response.error.details.unwrap();
        assert_eq!(details[0].field, "status");
    }

    #[rstest]
    fn test_auth_error_maps_to_401() {
        let response = ApiErrorResponse::from(AuthError::ExpiredToken);
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }
}
