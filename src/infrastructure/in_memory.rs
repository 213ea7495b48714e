//! In-memory repository implementations.
//!
//! Suitable for tests, local development and the default server mode.
//!
//! # Locking
//!
//! Each task lives in its own slot, `Arc<tokio::sync::Mutex<Option<Task>>>`.
//! The outer map is only locked long enough to look a slot up, insert it or
//! remove it, so conditional updates on different tasks never wait on each
//! other. A deleted slot is set to `None` under its own lock, which makes a
//! delete racing an update serialize like any two writers on the same task.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::domain::{Project, ProjectId, Task, TaskId, TaskPatch, Timestamp, User, UserId};
use crate::infrastructure::repository::sort_tasks;
use crate::infrastructure::{
    ProjectRepository, RepositoryError, TaskFilter, TaskRepository, UserRepository,
};

type TaskSlot = Arc<Mutex<Option<Task>>>;

// =============================================================================
// In-Memory Task Repository
// =============================================================================

/// In-memory implementation of `TaskRepository` with per-task locks.
///
/// # Example
///
/// ```ignore
/// let repository = InMemoryTaskRepository::new();
/// repository.create(&task).await?;
/// let updated = repository
///     .conditional_update(&task.task_id, &TaskPatch::new().title("X"), 0, Timestamp::now())
///     .await?;
/// assert_eq!(updated.version, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    slots: Arc<RwLock<HashMap<TaskId, TaskSlot>>>,
}

impl InMemoryTaskRepository {
    /// Creates a new empty in-memory task repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &TaskId) -> Option<TaskSlot> {
        self.slots.read().get(id).cloned()
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn find_by_id(&self, id: &TaskId) -> BoxFuture<'static, Result<Option<Task>, RepositoryError>> {
        let slot = self.slot(id);
        async move {
            match slot {
                Some(slot) => Ok(slot.lock().await.clone()),
                None => Ok(None),
            }
        }
        .boxed()
    }

    fn create(&self, task: &Task) -> BoxFuture<'static, Result<(), RepositoryError>> {
        let result = if task.version == Task::INITIAL_VERSION {
            let mut slots = self.slots.write();
            if slots.contains_key(&task.task_id) {
                Err(RepositoryError::AlreadyExists(task.task_id.to_string()))
            } else {
                slots.insert(task.task_id.clone(), Arc::new(Mutex::new(Some(task.clone()))));
                Ok(())
            }
        } else {
            Err(RepositoryError::VersionConflict {
                expected: Task::INITIAL_VERSION,
                actual: task.version,
            })
        };
        futures::future::ready(result).boxed()
    }

    fn conditional_update(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
        expected_version: u64,
        now: Timestamp,
    ) -> BoxFuture<'static, Result<Task, RepositoryError>> {
        let slot = self.slot(id);
        let id = id.clone();
        let patch = patch.clone();
        async move {
            patch.validate()?;
            let slot = slot.ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

            let mut guard = slot.lock().await;
            let current = guard
                .as_ref()
                .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

            if current.version != expected_version {
                return Err(RepositoryError::VersionConflict {
                    expected: expected_version,
                    actual: current.version,
                });
            }

            let updated = current.clone().commit_patch(&patch, now);
            *guard = Some(updated.clone());
            Ok(updated)
        }
        .boxed()
    }

    fn delete(&self, id: &TaskId) -> BoxFuture<'static, Result<bool, RepositoryError>> {
        let removed = self.slots.write().remove(id);
        async move {
            match removed {
                Some(slot) => {
                    // Updaters still holding the slot observe the deletion.
                    *slot.lock().await = None;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        .boxed()
    }

    fn list(&self, filter: &TaskFilter) -> BoxFuture<'static, Result<Vec<Task>, RepositoryError>> {
        let slots: Vec<TaskSlot> = self.slots.read().values().cloned().collect();
        let filter = filter.clone();
        async move {
            let mut tasks = Vec::with_capacity(slots.len());
            for slot in slots {
                if let Some(task) = slot.lock().await.as_ref().filter(|task| filter.matches(task)) {
                    tasks.push(task.clone());
                }
            }
            sort_tasks(&mut tasks);
            Ok(tasks)
        }
        .boxed()
    }
}

// =============================================================================
// In-Memory Project Repository
// =============================================================================

/// In-memory implementation of `ProjectRepository`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProjectRepository {
    projects: Arc<RwLock<HashMap<ProjectId, Project>>>,
}

impl InMemoryProjectRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectRepository for InMemoryProjectRepository {
    fn find_by_id(&self, id: &ProjectId) -> BoxFuture<'static, Result<Option<Project>, RepositoryError>> {
        let project = self.projects.read().get(id).cloned();
        futures::future::ready(Ok(project)).boxed()
    }

    fn create(&self, project: &Project) -> BoxFuture<'static, Result<(), RepositoryError>> {
        let mut projects = self.projects.write();
        let result = if projects.contains_key(&project.project_id) {
            Err(RepositoryError::AlreadyExists(project.project_id.to_string()))
        } else {
            projects.insert(project.project_id.clone(), project.clone());
            Ok(())
        };
        futures::future::ready(result).boxed()
    }

    fn search(&self, query: Option<&str>) -> BoxFuture<'static, Result<Vec<Project>, RepositoryError>> {
        let mut projects: Vec<Project> = self
            .projects
            .read()
            .values()
            .filter(|project| query.is_none_or(|query| project.matches_query(query)))
            .cloned()
            .collect();
        projects.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.project_id.cmp(&right.project_id))
        });
        futures::future::ready(Ok(projects)).boxed()
    }
}

// =============================================================================
// In-Memory User Repository
// =============================================================================

/// In-memory implementation of `UserRepository`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl InMemoryUserRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserRepository for InMemoryUserRepository {
    fn find_by_email(&self, email: &str) -> BoxFuture<'static, Result<Option<User>, RepositoryError>> {
        let email = email.trim().to_lowercase();
        let user = self
            .users
            .read()
            .values()
            .find(|user| user.email == email)
            .cloned();
        futures::future::ready(Ok(user)).boxed()
    }

    fn find_by_id(&self, id: &UserId) -> BoxFuture<'static, Result<Option<User>, RepositoryError>> {
        let user = self.users.read().get(id).cloned();
        futures::future::ready(Ok(user)).boxed()
    }

    fn create(&self, user: &User) -> BoxFuture<'static, Result<(), RepositoryError>> {
        let mut users = self.users.write();
        let duplicate = users
            .values()
            .any(|existing| existing.user_id == user.user_id || existing.email == user.email);
        let result = if duplicate {
            Err(RepositoryError::AlreadyExists(user.email.clone()))
        } else {
            users.insert(user.user_id.clone(), user.clone());
            Ok(())
        };
        futures::future::ready(result).boxed()
    }
}

// =============================================================================
// Tests
// =============================================================================
