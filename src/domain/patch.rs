//! Partial task updates.
//!
//! A patch distinguishes three cases per field: absent (leave unchanged),
//! present but `null` (clear the field) and present with a value. Plain
//! `Option<T>` cannot express the middle case, so every field is a
//! [`FieldUpdate`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::task::{TaskStatus, Timestamp};
use super::user::UserId;

/// Maximum number of characters allowed in a task title.
pub const MAX_TITLE_LENGTH: usize = 200;

// =============================================================================
// FieldUpdate
// =============================================================================

/// Tri-state change for a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    /// Field absent from the patch.
    Keep,
    /// Field present as `null`.
    Clear,
    /// Field present with a new value.
    Set(T),
}

// Written by hand: the derive would require `T: Default`.
impl<T> Default for FieldUpdate<T> {
    fn default() -> Self {
        Self::Keep
    }
}

impl<T> FieldUpdate<T> {
    #[must_use]
    pub const fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }

    /// Resolves the update against the current value of a nullable field.
    pub fn apply_to(self, current: Option<T>) -> Option<T> {
        match self {
            Self::Keep => current,
            Self::Clear => None,
            Self::Set(value) => Some(value),
        }
    }

    /// Returns `later` unless it is `Keep`, in which case `self` survives.
    #[must_use]
    pub fn or_earlier(later: Self, earlier: Self) -> Self {
        if later.is_keep() { earlier } else { later }
    }
}

impl<T: Serialize> Serialize for FieldUpdate<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Skipped by `skip_serializing_if`; emitted as null if reached.
            Self::Keep | Self::Clear => serializer.serialize_none(),
            Self::Set(value) => serializer.serialize_some(value),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldUpdate<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Only called when the key is present; absence falls back to `Default`.
        Option::<T>::deserialize(deserializer).map(|value| value.map_or(Self::Clear, Self::Set))
    }
}

// =============================================================================
// TaskPatch
// =============================================================================

/// The mutable subset of task fields carried by a conditional update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "FieldUpdate::is_keep")]
    pub title: FieldUpdate<String>,
    #[serde(default, skip_serializing_if = "FieldUpdate::is_keep")]
    pub status: FieldUpdate<TaskStatus>,
    #[serde(default, skip_serializing_if = "FieldUpdate::is_keep")]
    pub assignee_user_id: FieldUpdate<UserId>,
    #[serde(default, skip_serializing_if = "FieldUpdate::is_keep")]
    pub due_date: FieldUpdate<Timestamp>,
}

/// Reasons a patch cannot be applied to a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// `null` was sent for a field that cannot be empty.
    #[error("field `{0}` cannot be cleared")]
    NotNullable(&'static str),

    /// Title is blank after trimming.
    #[error("title must not be empty")]
    EmptyTitle,

    /// Title exceeds [`MAX_TITLE_LENGTH`] characters.
    #[error("title must be at most {MAX_TITLE_LENGTH} characters")]
    TitleTooLong,
}

impl TaskPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn title(self, title: impl Into<String>) -> Self {
        Self {
            title: FieldUpdate::Set(title.into()),
            ..self
        }
    }

    #[must_use]
    pub fn status(self, status: TaskStatus) -> Self {
        Self {
            status: FieldUpdate::Set(status),
            ..self
        }
    }

    #[must_use]
    pub fn assignee(self, assignee_user_id: UserId) -> Self {
        Self {
            assignee_user_id: FieldUpdate::Set(assignee_user_id),
            ..self
        }
    }

    #[must_use]
    pub fn clear_assignee(self) -> Self {
        Self {
            assignee_user_id: FieldUpdate::Clear,
            ..self
        }
    }

    #[must_use]
    pub fn due_date(self, due_date: Timestamp) -> Self {
        Self {
            due_date: FieldUpdate::Set(due_date),
            ..self
        }
    }

    #[must_use]
    pub fn clear_due_date(self) -> Self {
        Self {
            due_date: FieldUpdate::Clear,
            ..self
        }
    }

    /// Trims surrounding whitespace from a new title.
    #[must_use]
    pub fn trim_title(self) -> Self {
        match self.title {
            FieldUpdate::Set(title) => Self {
                title: FieldUpdate::Set(title.trim().to_string()),
                ..self
            },
            FieldUpdate::Keep | FieldUpdate::Clear => self,
        }
    }

    /// Returns `true` when the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_keep()
            && self.status.is_keep()
            && self.assignee_user_id.is_keep()
            && self.due_date.is_keep()
    }

    /// Folds a later edit into this one; fields present in `later` win.
    #[must_use]
    pub fn merge(self, later: Self) -> Self {
        Self {
            title: FieldUpdate::or_earlier(later.title, self.title),
            status: FieldUpdate::or_earlier(later.status, self.status),
            assignee_user_id: FieldUpdate::or_earlier(later.assignee_user_id, self.assignee_user_id),
            due_date: FieldUpdate::or_earlier(later.due_date, self.due_date),
        }
    }

    /// Checks the patch against the task field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError`] when `title` or `status` is cleared, or when
    /// the title is blank or too long.
    pub fn validate(&self) -> Result<(), PatchError> {
        if matches!(self.status, FieldUpdate::Clear) {
            return Err(PatchError::NotNullable("status"));
        }
        match &self.title {
            FieldUpdate::Clear => Err(PatchError::NotNullable("title")),
            FieldUpdate::Set(title) => validate_title(title),
            FieldUpdate::Keep => Ok(()),
        }
    }
}

/// Validates a task title.
///
/// # Errors
///
/// Returns [`PatchError::EmptyTitle`] or [`PatchError::TitleTooLong`].
pub fn validate_title(title: &str) -> Result<(), PatchError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        Err(PatchError::EmptyTitle)
    } else if trimmed.chars().count() > MAX_TITLE_LENGTH {
        Err(PatchError::TitleTooLong)
    } else {
        Ok(())
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
    fn test_absent_fields_deserialize_as_keep() {
        let patch: TaskPatch = serde_json::from_str(r#"{"title": "X"}"#).unwrap();

        assert_eq!(patch.title, FieldUpdate::Set("X".to_string()));
        assert!(patch.status.is_keep());
        assert!(patch.assignee_user_id.is_keep());
        assert!(patch.due_date.is_keep());
    }

    #[rstest]
    fn test_null_deserializes_as_clear() {
        let patch: TaskPatch =
            serde_json::from_str(r#"{"assignee_user_id": null, "due_date": null}"#).unwrap();

        assert_eq!(patch.assignee_user_id, FieldUpdate::Clear);
        assert_eq!(patch.due_date, FieldUpdate::Clear);
        assert!(patch.title.is_keep());
    }

    #[rstest]
    fn test_serialization_omits_keep_and_writes_null_for_clear() {
        let patch = TaskPatch::new().status(TaskStatus::Done).clear_due_date();

        let json = serde_json::to_value(&patch).unwrap();

        assert_eq!(json, serde_json::json!({"status": "done", "due_date": null}));
    }

    #[rstest]
    fn test_merge_prefers_later_present_fields() {
        let first = TaskPatch::new().title("First").status(TaskStatus::InProgress);
        let second = TaskPatch::new().title("Second").clear_assignee();

        let merged = first.merge(second);

        assert_eq!(merged.title, FieldUpdate::Set("Second".to_string()));
        assert_eq!(merged.status, FieldUpdate::Set(TaskStatus::InProgress));
        assert_eq!(merged.assignee_user_id, FieldUpdate::Clear);
        assert!(merged.due_date.is_keep());
    }

    #[rstest]
    fn test_trim_title() {
        let patch = TaskPatch::new().title("  Renamed ").trim_title();
        assert_eq!(patch.title, FieldUpdate::Set("Renamed".to_string()));
    }

    #[rstest]
    fn test_is_empty() {
        assert!(TaskPatch::new().is_empty());
        assert!(!TaskPatch::new().clear_due_date().is_empty());
    }

    #[rstest]
    #[case(r#"{"title": null}"#, PatchError::NotNullable("title"))]
    #[case(r#"{"status": null}"#, PatchError::NotNullable("status"))]
    #[case(r#"{"title": "   "}"#, PatchError::EmptyTitle)]
    fn test_validate_rejects(#[case] body: &str, #[case] expected: PatchError) {
        let patch: TaskPatch = serde_json::from_str(body).unwrap();
        assert_eq!(patch.validate(), Err(expected));
    }

    #[rstest]
    fn test_validate_rejects_long_title() {
        let patch = TaskPatch::new().title("x".repeat(MAX_TITLE_LENGTH + 1));
        assert_eq!(patch.validate(), Err(PatchError::TitleTooLong));
    }

    #[rstest]
    fn test_validate_accepts_clearing_nullable_fields() {
        let patch = TaskPatch::new().clear_assignee().clear_due_date();
        assert!(patch.validate().is_ok());
    }
}
