//! Users known to the authentication collaborator.
//!
//! Tasks only hold a `UserId` reference; the store never checks that the
//! referenced user exists.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::task::uuid_identifier;

uuid_identifier! {
    /// Identifier of a user, referenced by `Task::assignee_user_id`.
    UserId
}

/// bcrypt cost used for stored passwords.
pub const DEFAULT_PASSWORD_COST: u32 = bcrypt::DEFAULT_COST;

/// Cheapest cost bcrypt accepts; for fixtures only.
// `bcrypt::MIN_COST` (4) is private in the bcrypt crate.
pub const MIN_PASSWORD_COST: u32 = 4;

// =============================================================================
// Password Hash
// =============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Failed to hash password: {0}")]
pub struct PasswordHashError(String);

/// A bcrypt hash string (`$2b$<cost>$<salt+digest>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hashes `password` at [`DEFAULT_PASSWORD_COST`].
    ///
    /// # Errors
    ///
    /// Returns `PasswordHashError` if bcrypt rejects the input.
    pub fn new(password: &str) -> Result<Self, PasswordHashError> {
        Self::with_cost(password, DEFAULT_PASSWORD_COST)
    }

    /// Hashes `password` at the given bcrypt cost.
    ///
    /// # Errors
    ///
    /// Returns `PasswordHashError` for a cost outside bcrypt's range.
    pub fn with_cost(password: &str, cost: u32) -> Result<Self, PasswordHashError> {
        bcrypt::hash(password, cost)
            .map(Self)
            .map_err(|error| PasswordHashError(error.to_string()))
    }

    /// Wraps a hash loaded from storage.
    #[must_use]
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if `password` matches. A malformed stored hash never
    /// matches.
    #[must_use]
    pub fn verify(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.0).unwrap_or(false)
    }
}

// =============================================================================
// Role
// =============================================================================

/// What a user may do with tasks they are not assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Sees and edits every task, and may reassign tasks.
    Admin,
    /// Sees and edits only tasks assigned to them.
    #[default]
    Member,
}

impl UserRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown user role: '{0}'")]
pub struct UnknownRole(pub String);

impl std::str::FromStr for UserRole {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

// =============================================================================
// User
// =============================================================================

/// A registered user.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub password: PasswordHash,
    pub role: UserRole,
}

impl User {
    /// Creates a member; the email is stored lowercased.
    #[must_use]
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        email: impl Into<String>,
        password: PasswordHash,
    ) -> Self {
        Self {
            user_id,
            name: name.into(),
            email: email.into().to_lowercase(),
            password,
            role: UserRole::Member,
        }
    }

    #[must_use]
    pub fn with_role(self, role: UserRole) -> Self {
        Self { role, ..self }
    }
}
