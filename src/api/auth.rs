//! Bearer-token authentication.
//!
//! `POST /auth/login` exchanges an email and password for an HS256 JWT whose
//! `sub` claim is the user id. Protected handlers take an
//! [`AuthenticatedUser`] argument, which rejects the request with 401 when the
//! `Authorization` header is missing, malformed, expired or names an unknown
//! user.

use std::env;

use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::dto::{LoginRequest, TokenResponse};
use super::error::ApiErrorResponse;
use super::handlers::AppState;
use crate::domain::{UserId, UserRole};
use crate::infrastructure::RepositoryError;

const BEARER_PREFIX: &str = "Bearer ";

/// Default token lifetime in minutes.
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 30;

// =============================================================================
// Configuration
// =============================================================================

/// Token signing configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
}

impl AuthConfig {
    #[must_use]
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            token_ttl: Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES),
        }
    }

    #[must_use]
    pub fn with_token_ttl(self, token_ttl: Duration) -> Self {
        Self { token_ttl, ..self }
    }

    /// Reads `JWT_SECRET` and `TOKEN_TTL_MINUTES`.
    ///
    /// Without `JWT_SECRET` a random per-process secret is used, so tokens do
    /// not survive a restart.
    ///
    /// # Errors
    ///
    /// Returns `AuthConfigError::InvalidTokenTtl` if `TOKEN_TTL_MINUTES` is not
    /// a positive integer.
    pub fn from_env() -> Result<Self, AuthConfigError> {
        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|secret| !secret.trim().is_empty())
            .unwrap_or_else(|| {
                tracing::warn!("JWT_SECRET not set, using a random secret for this process");
                Uuid::new_v4().simple().to_string()
            });

        let token_ttl = match env::var("TOKEN_TTL_MINUTES") {
            Ok(value) => parse_token_ttl(&value)?,
            Err(_) => Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES),
        };

        Ok(Self {
            jwt_secret,
            token_ttl,
        })
    }
}

/// Parses a token lifetime in minutes. Zero, negative and out-of-range values
/// are rejected.
fn parse_token_ttl(value: &str) -> Result<Duration, AuthConfigError> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|minutes| *minutes > 0)
        .and_then(Duration::try_minutes)
        .ok_or_else(|| AuthConfigError::InvalidTokenTtl(value.to_string()))
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthConfigError {
    #[error("Invalid TOKEN_TTL_MINUTES: '{0}'. Expected a positive integer")]
    InvalidTokenTtl(String),
}

// =============================================================================
// Errors
// =============================================================================

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication token")]
    MissingToken,

    #[error("Malformed authorization header")]
    MalformedHeader,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Authentication token has expired")]
    ExpiredToken,

    #[error("Token subject is not a known user")]
    UnknownUser,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Failed to issue token: {0}")]
    TokenIssue(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

// =============================================================================
// Token Service
// =============================================================================

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Issues and verifies HS256 tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TokenService")
            .field("token_ttl", &self.token_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_ttl: config.token_ttl,
        }
    }

    /// Issues a token for `user_id` expiring after the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenIssue` if encoding fails.
    pub fn issue(&self, user_id: &UserId) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + self.token_ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|error| AuthError::TokenIssue(error.to_string()))
    }

    /// Verifies a token and returns the user id it was issued for.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ExpiredToken` or `AuthError::InvalidToken`.
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|error| {
            match error.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            }
        })?;

        data.claims
            .sub
            .parse()
            .map_err(|_| AuthError::InvalidToken)
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?;
    let value = header.to_str().map_err(|_| AuthError::MalformedHeader)?;
    value
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MalformedHeader)
}

// =============================================================================
// Extractor
// =============================================================================

/// The user on whose behalf a request is made.
///
/// The role is read from the user record on every request, so a role change
/// takes effect without reissuing tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub role: UserRole,
}

impl AuthenticatedUser {
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiErrorResponse;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let user_id = state.tokens.verify(token).inspect_err(|error| {
            tracing::debug!(%error, "Rejected bearer token");
        })?;

        let user = state
            .user_repository
            .find_by_id(&user_id)
            .await
            .map_err(AuthError::from)?
            .ok_or(AuthError::UnknownUser)?;

        Ok(Self {
            user_id: user.user_id,
            role: user.role,
        })
    }
}

// =============================================================================
// POST /auth/login Handler
// =============================================================================

/// Exchanges credentials for a bearer token.
///
/// # Errors
///
/// - 401 if the email is unknown or the password does not match
/// - 500 if the user lookup or token signing fails
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiErrorResponse> {
    let user = state
        .user_repository
        .find_by_email(&request.email)
        .await?
        .filter(|user| user.password.verify(&request.password))
        .ok_or_else(|| {
            tracing::info!(email = %request.email, "Login rejected");
            AuthError::InvalidCredentials
        })?;

    let token = state.tokens.issue(&user.user_id)?;
    tracing::info!(user_id = %user.user_id, "User logged in");

    Ok(Json(TokenResponse::bearer(token)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use rstest::rstest;

    fn token_service() -> TokenService {
        TokenService::new(&AuthConfig::new("test-secret"))
    }

    fn parts_with_authorization(value: &str) -> Parts {
        let (parts, ()) = Request::builder()
            .header(AUTHORIZATION, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[rstest]
    fn test_issue_and_verify_round_trip() {
        let service = token_service();
        let user_id = UserId::generate();

        let token = service.issue(&user_id).unwrap();

        assert_eq!(service.verify(&token).unwrap(), user_id);
    }

    #[rstest]
    fn test_verify_rejects_foreign_secret() {
        let token = token_service().issue(&UserId::generate()).unwrap();
        let other = TokenService::new(&AuthConfig::new("other-secret"));

        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[rstest]
    fn test_verify_rejects_expired_token() {
        let service = TokenService::new(
            &AuthConfig::new("test-secret").with_token_ttl(Duration::minutes(-5)),
        );
        let token = service.issue(&UserId::generate()).unwrap();

        assert!(matches!(service.verify(&token), Err(AuthError::ExpiredToken)));
    }

    #[rstest]
    fn test_verify_rejects_garbage() {
        assert!(matches!(
            token_service().verify("not-a-jwt"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[rstest]
    #[case("Bearer abc", Ok("abc"))]
    #[case("Basic abc", Err(()))]
    #[case("Bearer ", Err(()))]
    fn test_bearer_token(#[case] header: &str, #[case] expected: Result<&str, ()>) {
        let parts = parts_with_authorization(header);
        assert_eq!(bearer_token(&parts).map_err(|_| ()), expected);
    }

    #[rstest]
    #[case("30", 30)]
    #[case(" 5 ", 5)]
    fn test_parse_token_ttl_accepts_positive_minutes(#[case] value: &str, #[case] minutes: i64) {
        assert_eq!(parse_token_ttl(value), Ok(Duration::minutes(minutes)));
    }

    #[rstest]
    #[case("0")]
    #[case("-3")]
    #[case("soon")]
    #[case("9223372036854775807")]
    fn test_parse_token_ttl_rejects_invalid_minutes(#[case] value: &str) {
        assert_eq!(
            parse_token_ttl(value),
            Err(AuthConfigError::InvalidTokenTtl(value.to_string()))
        );
    }

    #[rstest]
    fn test_bearer_token_missing() {
        let (parts, ()) = Request::builder().body(()).unwrap().into_parts();
        assert!(matches!(bearer_token(&parts), Err(AuthError::MissingToken)));
    }
}
