//! Repository traits for domain entities.
//!
//! Every method returns a boxed `'static` future so implementations can be
//! stored behind `Arc<dyn ...>` and selected at runtime. Implementations
//! clone whatever handles they need into the future before returning it.

use futures::future::BoxFuture;
use thiserror::Error;

use crate::domain::{PatchError, Project, ProjectId, Task, TaskId, TaskPatch, TaskStatus, Timestamp, User, UserId};

// =============================================================================
// Repository Error
// =============================================================================

/// Errors that can occur during repository operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Entity was not found.
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// The expected version did not match the stored version.
    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    /// An entity with the same identifier already exists.
    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    /// The patch violates a field constraint.
    #[error("Invalid patch: {0}")]
    InvalidPatch(#[from] PatchError),

    /// A stored record could not be decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),
}

// =============================================================================
// Task Filter
// =============================================================================

/// Exact-match filters for task listing, combined with logical AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub project_id: Option<ProjectId>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<UserId>,
}

impl TaskFilter {
    #[must_use]
    pub fn for_project(project_id: ProjectId) -> Self {
        Self {
            project_id: Some(project_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_status(self, status: Option<TaskStatus>) -> Self {
        Self { status, ..self }
    }

    #[must_use]
    pub fn with_assignee(self, assignee: Option<UserId>) -> Self {
        Self { assignee, ..self }
    }

    /// Returns `true` if `task` satisfies every filter that is set.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.project_id
            .as_ref()
            .is_none_or(|project_id| &task.project_id == project_id)
            && self.status.is_none_or(|status| task.status == status)
            && self
                .assignee
                .as_ref()
                .is_none_or(|assignee| task.assignee_user_id.as_ref() == Some(assignee))
    }
}

/// Orders tasks by creation time, then id, so listings are stable.
pub fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|left, right| {
        left.created_at
            .cmp(&right.created_at)
            .then_with(|| left.task_id.cmp(&right.task_id))
    });
}

// =============================================================================
// Task Repository
// =============================================================================

/// The authoritative task store.
///
/// `conditional_update` is the only mutating operation on existing tasks and
/// must behave as an atomic compare-and-increment per task: the version check,
/// the field changes, the version increment and the `updated_at` refresh are
/// observed by other callers either entirely or not at all. Updates to
/// different tasks must not wait on each other.
pub trait TaskRepository: Send + Sync {
    /// Finds a task by its ID.
    fn find_by_id(&self, id: &TaskId) -> BoxFuture<'static, Result<Option<Task>, RepositoryError>>;

    /// Inserts a new task. The task must be at `Task::INITIAL_VERSION`.
    fn create(&self, task: &Task) -> BoxFuture<'static, Result<(), RepositoryError>>;

    /// Applies `patch` if the stored version equals `expected_version`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the task does not exist
    /// - `VersionConflict` carrying the stored version on mismatch; nothing is
    ///   written in that case
    /// - `InvalidPatch` if the patch fails validation
    fn conditional_update(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
        expected_version: u64,
        now: Timestamp,
    ) -> BoxFuture<'static, Result<Task, RepositoryError>>;

    /// Deletes a task. Returns `Ok(false)` if it did not exist.
    fn delete(&self, id: &TaskId) -> BoxFuture<'static, Result<bool, RepositoryError>>;

    /// Lists tasks matching `filter`, ordered by creation time.
    fn list(&self, filter: &TaskFilter) -> BoxFuture<'static, Result<Vec<Task>, RepositoryError>>;
}

// =============================================================================
// Project Repository
// =============================================================================

/// Repository trait for Project entities. Projects are not versioned.
pub trait ProjectRepository: Send + Sync {
    /// Finds a project by its ID.
    fn find_by_id(&self, id: &ProjectId) -> BoxFuture<'static, Result<Option<Project>, RepositoryError>>;

    /// Inserts a new project.
    fn create(&self, project: &Project) -> BoxFuture<'static, Result<(), RepositoryError>>;

    /// Lists projects whose name contains `query` (case-insensitive), ordered
    /// by creation time. `None` lists everything.
    fn search(&self, query: Option<&str>) -> BoxFuture<'static, Result<Vec<Project>, RepositoryError>>;
}

// =============================================================================
// User Repository
// =============================================================================

/// Lookup of users for login and token validation.
pub trait UserRepository: Send + Sync {
    /// Finds a user by email (case-insensitive).
    fn find_by_email(&self, email: &str) -> BoxFuture<'static, Result<Option<User>, RepositoryError>>;

    /// Finds a user by ID.
    fn find_by_id(&self, id: &UserId) -> BoxFuture<'static, Result<Option<User>, RepositoryError>>;

    /// Inserts a user.
    fn create(&self, user: &User) -> BoxFuture<'static, Result<(), RepositoryError>>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn test_task(project_id: &ProjectId) -> Task {
        Task::new(TaskId::generate(), project_id.clone(), "Task", Timestamp::now())
    }

    #[rstest]
    fn test_repository_error_display() {
        let error = RepositoryError::VersionConflict {
            expected: 0,
            actual: 1,
        };
        assert_eq!(error.to_string(), "Version conflict: expected 0, found 1");

        let error = RepositoryError::NotFound("task-123".to_string());
        assert_eq!(error.to_string(), "Entity not found: task-123");
    }

    #[rstest]
    fn test_empty_filter_matches_everything() {
        let task = test_task(&ProjectId::generate());
        assert!(TaskFilter::default().matches(&task));
    }

    #[rstest]
    fn test_filter_combines_with_and() {
        let project_id = ProjectId::generate();
        let alice = UserId::generate();
        let task = test_task(&project_id)
            .with_status(TaskStatus::InProgress)
            .with_assignee(Some(alice.clone()));

        let both = TaskFilter::for_project(project_id.clone())
            .with_status(Some(TaskStatus::InProgress))
            .with_assignee(Some(alice));
        let wrong_assignee = TaskFilter::for_project(project_id.clone())
            .with_status(Some(TaskStatus::InProgress))
            .with_assignee(Some(UserId::generate()));
        let wrong_status = TaskFilter::for_project(project_id).with_status(Some(TaskStatus::Done));

        assert!(both.matches(&task));
        assert!(!wrong_assignee.matches(&task));
        assert!(!wrong_status.matches(&task));
    }

    #[rstest]
    fn test_assignee_filter_excludes_unassigned_tasks() {
        let task = test_task(&ProjectId::generate());
        let filter = TaskFilter::default().with_assignee(Some(UserId::generate()));
        assert!(!filter.matches(&task));
    }

    #[rstest]
    fn test_sort_tasks_orders_by_creation_time() {
        let project_id = ProjectId::generate();
        let early = Timestamp::from_datetime(chrono::DateTime::UNIX_EPOCH);
        let mut later_task = test_task(&project_id);
        let early_task = Task::new(TaskId::generate(), project_id, "Early", early);
        later_task.title = "Later".to_string();

        let mut tasks = vec![later_task, early_task];
        sort_tasks(&mut tasks);

        assert_eq!(tasks[0].title, "Early");
        assert_eq!(tasks[1].title, "Later");
    }
}
