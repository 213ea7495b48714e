//! Task domain model.
//!
//! A task is the only entity in the system that is guarded by optimistic
//! concurrency control. Every accepted mutation produces a new record whose
//! `version` is exactly one greater than the record it replaced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::patch::{FieldUpdate, TaskPatch};
use super::project::ProjectId;
use super::user::UserId;

// =============================================================================
// Value Objects - Newtypes
// =============================================================================

/// Declares a UUID-backed identifier newtype.
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wraps an existing UUID without generating a new one.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Generates a time-ordered identifier (UUID v7).
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(value).map(Self)
            }
        }
    };
}

pub(crate) use uuid_identifier;

uuid_identifier! {
    /// Unique, immutable identifier for a task.
    TaskId
}

/// A UTC timestamp, serialized as RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    #[must_use]
    pub const fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the current time.
    ///
    /// Reads the system clock; callers in pure code should take a
    /// `Timestamp` argument instead.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0.to_rfc3339())
    }
}

// =============================================================================
// Enums
// =============================================================================

/// The status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started yet.
    #[default]
    Todo,
    /// Currently being worked on.
    InProgress,
    /// Finished.
    Done,
}

impl TaskStatus {
    /// Returns the wire/database representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Task
// =============================================================================

/// The task record as held by the store and mirrored by clients.
///
/// `version` starts at 0 and is the only concurrency token: there is no
/// separate etag or content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_field_names)]
pub struct Task {
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub title: String,
    pub status: TaskStatus,
    pub assignee_user_id: Option<UserId>,
    pub due_date: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub version: u64,
}

impl Task {
    /// Version assigned to every newly created task.
    pub const INITIAL_VERSION: u64 = 0;

    /// Creates a new task in the `todo` state at the initial version.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        project_id: ProjectId,
        title: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            task_id,
            project_id,
            title: title.into(),
            status: TaskStatus::Todo,
            assignee_user_id: None,
            due_date: None,
            created_at: timestamp,
            updated_at: timestamp,
            version: Self::INITIAL_VERSION,
        }
    }

    #[must_use]
    pub fn with_status(self, status: TaskStatus) -> Self {
        Self { status, ..self }
    }

    #[must_use]
    pub fn with_assignee(self, assignee_user_id: Option<UserId>) -> Self {
        Self {
            assignee_user_id,
            ..self
        }
    }

    #[must_use]
    pub fn with_due_date(self, due_date: Option<Timestamp>) -> Self {
        Self { due_date, ..self }
    }

    #[must_use]
    pub fn with_updated_at(self, timestamp: Timestamp) -> Self {
        Self {
            updated_at: timestamp,
            ..self
        }
    }

    /// Returns a new task with an incremented version.
    ///
    /// # Panics
    ///
    /// Panics if the version number overflows `u64::MAX`.
    #[must_use]
    pub fn increment_version(self) -> Self {
        Self {
            version: self
                .version
                .checked_add(1)
                .expect("Version overflow: version number exceeded u64::MAX"),
            ..self
        }
    }

    /// Applies the field changes of `patch`, leaving version and timestamps
    /// untouched.
    ///
    /// `Clear` on a non-nullable field is ignored here; callers validate the
    /// patch before it reaches a record.
    #[must_use]
    pub fn apply_fields(self, patch: &TaskPatch) -> Self {
        let title = match &patch.title {
            FieldUpdate::Set(title) => title.clone(),
            FieldUpdate::Keep | FieldUpdate::Clear => self.title,
        };
        let status = match patch.status {
            FieldUpdate::Set(status) => status,
            FieldUpdate::Keep | FieldUpdate::Clear => self.status,
        };
        Self {
            title,
            status,
            assignee_user_id: patch.assignee_user_id.clone().apply_to(self.assignee_user_id),
            due_date: patch.due_date.clone().apply_to(self.due_date),
            ..self
        }
    }

    /// Produces the record that an accepted conditional update commits:
    /// patched fields, `version + 1` and a refreshed `updated_at`.
    #[must_use]
    pub fn commit_patch(self, patch: &TaskPatch, now: Timestamp) -> Self {
        self.apply_fields(patch)
            .increment_version()
            .with_updated_at(now)
    }
}

// =============================================================================
// Tests
// =============================================================================
