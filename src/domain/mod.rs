//! Domain module for project and task management.
//!
//! This module contains domain models and value objects. Nothing here
//! performs I/O.

pub mod patch;
pub mod project;
pub mod task;
pub mod user;

pub use patch::{FieldUpdate, MAX_TITLE_LENGTH, PatchError, TaskPatch, validate_title};
pub use project::{Project, ProjectId};
pub use task::{Task, TaskId, TaskStatus, Timestamp, UnknownStatus};
pub use user::{
    DEFAULT_PASSWORD_COST, MIN_PASSWORD_COST, PasswordHash, PasswordHashError, UnknownRole, User,
    UserId, UserRole,
};
