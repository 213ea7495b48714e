//! Optimistic update controller.
//!
//! Keeps a local copy of each task the client works with and lets the user
//! edit it without waiting for the server. Each cached task is in one of
//! three states:
//!
//! ```text
//!   Synced --apply_local_edit--> PendingEdit --commit ok--> Synced
//!                                     |
//!                      conflict / unknown outcome
//!                                     v
//!                                   Stale --refresh--> Synced
//! ```
//!
//! The visible record is the last server record (`base`) with the pending
//! patch applied on top; `base.version` is the version every commit is
//! fenced on. A commit that loses a version race is never retried: the edit
//! is discarded and reported, and the task is re-read from the server.

use std::collections::HashMap;
use std::future::Future;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use super::config::ClientConfig;
use super::gateway::{GatewayError, TaskGateway};
use crate::api::CreateTaskRequest;
use crate::domain::{PatchError, ProjectId, Task, TaskId, TaskPatch, TaskStatus, UserId};

// =============================================================================
// State and Errors
// =============================================================================

/// Synchronization state of one cached task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// The cache equals the last record read from the server.
    Synced,
    /// Local edits are waiting to be committed.
    PendingEdit,
    /// The cache is known or suspected to be behind the server; edits are
    /// refused until the task is refreshed.
    Stale,
}

/// Errors surfaced by the controller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Another writer committed first. The local edit was dropped.
    #[error("edit lost to a concurrent update; task is now at version {current_version}")]
    EditLost {
        discarded: TaskPatch,
        current_version: u64,
    },

    /// The task no longer exists on the server and was evicted.
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("not authorized; log in again")]
    Unauthorized,

    /// The server refused the edit for this user. The edit was dropped and
    /// the cached record is unchanged.
    #[error("not permitted to make this edit")]
    Forbidden { rejected: TaskPatch },

    /// The commit may or may not have been applied. The task is stale until
    /// refreshed, and `unconfirmed` holds the edit that was in doubt.
    #[error("outcome of commit unknown: {cause}")]
    OutcomeUnknown {
        unconfirmed: TaskPatch,
        cause: GatewayError,
    },

    #[error("task {0} is not cached; load or refresh it first")]
    NotCached(TaskId),

    #[error("task {0} is stale; refresh it before editing")]
    Stale(TaskId),

    #[error("a commit for task {0} is already in flight")]
    CommitInProgress(TaskId),

    #[error("invalid edit: {0}")]
    InvalidEdit(#[from] PatchError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ControllerError {
    fn from_gateway(task_id: &TaskId, error: GatewayError) -> Self {
        match error {
            GatewayError::NotFound => Self::NotFound(task_id.clone()),
            GatewayError::Unauthorized => Self::Unauthorized,
            other => Self::Gateway(other),
        }
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    base: Task,
    pending: TaskPatch,
    in_flight: Option<TaskPatch>,
    state: SyncState,
}

impl CacheEntry {
    fn synced(task: Task) -> Self {
        Self {
            base: task,
            pending: TaskPatch::new(),
            in_flight: None,
            state: SyncState::Synced,
        }
    }

    fn visible(&self) -> Task {
        let task = match &self.in_flight {
            Some(in_flight) => self.base.clone().apply_fields(in_flight),
            None => self.base.clone(),
        };
        task.apply_fields(&self.pending)
    }

    /// Removes every local edit not yet confirmed by the server.
    fn take_unconfirmed(&mut self) -> TaskPatch {
        let in_flight = self.in_flight.take().unwrap_or_default();
        in_flight.merge(mem::take(&mut self.pending))
    }

    const fn state_after_commit(&self) -> SyncState {
        if self.pending.is_empty() {
            SyncState::Synced
        } else {
            SyncState::PendingEdit
        }
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Client-side cache with optimistic edits and version-fenced commits.
///
/// # Example
///
/// ```ignore
/// let controller = OptimisticUpdateController::new(gateway, Duration::from_secs(5));
/// controller.load(&project_id, None, None).await?;
/// controller.apply_local_edit(&task_id, TaskPatch::new().title("Renamed"))?;
/// match controller.commit(&task_id).await {
///     Ok(task) => println!("saved at version {}", task.version),
///     Err(ControllerError::EditLost { current_version, .. }) => {
///         println!("someone else saved version {current_version} first");
///     }
///     Err(error) => return Err(error.into()),
/// }
/// ```
pub struct OptimisticUpdateController {
    gateway: Arc<dyn TaskGateway>,
    commit_timeout: Duration,
    cache: Mutex<HashMap<TaskId, CacheEntry>>,
}

impl std::fmt::Debug for OptimisticUpdateController {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("OptimisticUpdateController")
            .field("commit_timeout", &self.commit_timeout)
            .field("cached_tasks", &self.cache.lock().len())
            .finish_non_exhaustive()
    }
}

impl OptimisticUpdateController {
    #[must_use]
    pub fn new(gateway: Arc<dyn TaskGateway>, commit_timeout: Duration) -> Self {
        Self {
            gateway,
            commit_timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn from_config(gateway: Arc<dyn TaskGateway>, config: &ClientConfig) -> Self {
        Self::new(gateway, config.commit_timeout)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// The task as the user currently sees it, pending edits included.
    #[must_use]
    pub fn visible_task(&self, task_id: &TaskId) -> Option<Task> {
        self.cache.lock().get(task_id).map(CacheEntry::visible)
    }

    #[must_use]
    pub fn sync_state(&self, task_id: &TaskId) -> Option<SyncState> {
        self.cache.lock().get(task_id).map(|entry| entry.state)
    }

    /// Version of the last server record seen for the task.
    #[must_use]
    pub fn last_known_version(&self, task_id: &TaskId) -> Option<u64> {
        self.cache.lock().get(task_id).map(|entry| entry.base.version)
    }

    /// Edits applied locally but not yet sent.
    #[must_use]
    pub fn pending_patch(&self, task_id: &TaskId) -> Option<TaskPatch> {
        self.cache.lock().get(task_id).map(|entry| entry.pending.clone())
    }

    /// Drops a task from the cache, discarding any pending edit.
    pub fn evict(&self, task_id: &TaskId) {
        self.cache.lock().remove(task_id);
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Lists a project's tasks and caches them.
    ///
    /// Entries with a pending or in-flight edit keep their local state, as do
    /// entries already newer than the listing; the returned list shows them
    /// as visible to the user.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` or `Gateway` if the listing fails.
    pub async fn load(
        &self,
        project_id: &ProjectId,
        status: Option<TaskStatus>,
        assignee: Option<&UserId>,
    ) -> Result<Vec<Task>, ControllerError> {
        let tasks = self
            .bounded(self.gateway.list_tasks(project_id, status, assignee))
            .await
            .map_err(|error| match error {
                GatewayError::Unauthorized => ControllerError::Unauthorized,
                other => ControllerError::Gateway(other),
            })?;

        let mut cache = self.cache.lock();
        let visible = tasks
            .into_iter()
            .map(|task| {
                let entry = cache
                    .entry(task.task_id.clone())
                    .or_insert_with(|| CacheEntry::synced(task.clone()));
                if entry.pending.is_empty()
                    && entry.in_flight.is_none()
                    && task.version >= entry.base.version
                {
                    *entry = CacheEntry::synced(task);
                }
                entry.visible()
            })
            .collect();

        tracing::debug!(project_id = %project_id, "Loaded project tasks");
        Ok(visible)
    }

    /// Re-reads one task and replaces its cache entry, dropping any pending
    /// edit. Evicts the entry if the task no longer exists.
    ///
    /// A commit started while the read was outstanding wins: the entry is
    /// left alone. A read older than the cached record keeps the cached
    /// record.
    ///
    /// # Errors
    ///
    /// - `CommitInProgress` while a commit for the task is in flight, before
    ///   or after the read
    /// - `NotFound` if the task was deleted
    /// - `Unauthorized` or `Gateway` if the read fails
    pub async fn refresh(&self, task_id: &TaskId) -> Result<Task, ControllerError> {
        if self
            .cache
            .lock()
            .get(task_id)
            .is_some_and(|entry| entry.in_flight.is_some())
        {
            return Err(ControllerError::CommitInProgress(task_id.clone()));
        }

        match self.bounded(self.gateway.fetch_task(task_id)).await {
            Ok(task) => self.adopt_fetched(task),
            Err(GatewayError::NotFound) => {
                self.evict(task_id);
                Err(ControllerError::NotFound(task_id.clone()))
            }
            Err(error) => Err(ControllerError::from_gateway(task_id, error)),
        }
    }

    /// Creates a task and caches it as synced.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEdit` for a blank or over-long title, otherwise the
    /// gateway failure.
    pub async fn create(
        &self,
        project_id: &ProjectId,
        request: &CreateTaskRequest,
    ) -> Result<Task, ControllerError> {
        crate::domain::validate_title(&request.title)?;

        let task = self
            .bounded(self.gateway.create_task(project_id, request))
            .await
            .map_err(|error| match error {
                GatewayError::Unauthorized => ControllerError::Unauthorized,
                other => ControllerError::Gateway(other),
            })?;

        self.cache
            .lock()
            .insert(task.task_id.clone(), CacheEntry::synced(task.clone()));
        tracing::debug!(task_id = %task.task_id, "Created task");
        Ok(task)
    }

    // -------------------------------------------------------------------------
    // Edits
    // -------------------------------------------------------------------------

    /// Applies `changes` to the cached task immediately.
    ///
    /// Changes accumulate until the next commit; a later change to the same
    /// field replaces the earlier one.
    ///
    /// # Errors
    ///
    /// - `InvalidEdit` if the changes violate a field constraint
    /// - `NotCached` if the task was never loaded
    /// - `Stale` if the task must be refreshed first
    pub fn apply_local_edit(
        &self,
        task_id: &TaskId,
        changes: TaskPatch,
    ) -> Result<Task, ControllerError> {
        changes.validate()?;

        let mut cache = self.cache.lock();
        let entry = cache
            .get_mut(task_id)
            .ok_or_else(|| ControllerError::NotCached(task_id.clone()))?;

        if entry.state == SyncState::Stale {
            return Err(ControllerError::Stale(task_id.clone()));
        }

        entry.pending = mem::take(&mut entry.pending).merge(changes);
        if !entry.pending.is_empty() {
            entry.state = SyncState::PendingEdit;
        }
        Ok(entry.visible())
    }

    /// Sends the pending edit as a conditional update fenced on the last
    /// known version.
    ///
    /// On success the cache adopts the server's record. An empty pending
    /// edit is a no-op that returns the cached record.
    ///
    /// # Errors
    ///
    /// - `EditLost` if another writer got there first; the task is re-read
    /// - `NotFound` if the task was deleted; it is evicted
    /// - `OutcomeUnknown` on timeout or transport failure; the task is stale
    /// - `Unauthorized` if the session was rejected; the edit stays pending
    /// - `Forbidden` if the user may not make the edit; it is dropped
    /// - `NotCached`, `Stale` or `CommitInProgress` if no request was sent
    pub async fn commit(&self, task_id: &TaskId) -> Result<Task, ControllerError> {
        let (patch, expected_version) = {
            let mut cache = self.cache.lock();
            let entry = cache
                .get_mut(task_id)
                .ok_or_else(|| ControllerError::NotCached(task_id.clone()))?;

            if entry.in_flight.is_some() {
                return Err(ControllerError::CommitInProgress(task_id.clone()));
            }
            if entry.state == SyncState::Stale {
                return Err(ControllerError::Stale(task_id.clone()));
            }
            if entry.pending.is_empty() {
                return Ok(entry.visible());
            }

            let patch = mem::take(&mut entry.pending);
            entry.in_flight = Some(patch.clone());
            (patch, entry.base.version)
        };

        tracing::debug!(task_id = %task_id, expected_version, "Committing task edit");
        let outcome = self
            .bounded(self.gateway.update_task(task_id, &patch, expected_version))
            .await;

        match outcome {
            Ok(task) => Ok(self.adopt_committed(task)),
            Err(GatewayError::Conflict { current_version }) => {
                tracing::info!(
                    task_id = %task_id,
                    expected_version,
                    actual_version = current_version,
                    "Commit lost version race, discarding edit"
                );
                let discarded = self.discard_unconfirmed(task_id);
                let current_version = match self.refresh(task_id).await {
                    Ok(task) => task.version,
                    Err(error) => {
                        tracing::warn!(task_id = %task_id, %error, "Refetch after conflict failed");
                        current_version
                    }
                };
                Err(ControllerError::EditLost {
                    discarded,
                    current_version,
                })
            }
            Err(GatewayError::NotFound) => {
                tracing::info!(task_id = %task_id, "Committed task no longer exists");
                self.evict(task_id);
                Err(ControllerError::NotFound(task_id.clone()))
            }
            Err(GatewayError::Unauthorized) => {
                self.restore_pending(task_id);
                Err(ControllerError::Unauthorized)
            }
            Err(GatewayError::Forbidden) => {
                tracing::info!(task_id = %task_id, "Commit refused by server");
                let rejected = self.reject_in_flight(task_id);
                Err(ControllerError::Forbidden { rejected })
            }
            Err(cause) => {
                tracing::warn!(task_id = %task_id, expected_version, %cause, "Commit outcome unknown");
                let unconfirmed = self.discard_unconfirmed(task_id);
                Err(ControllerError::OutcomeUnknown { unconfirmed, cause })
            }
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Bounds a gateway call by the commit timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        tokio::time::timeout(self.commit_timeout, call)
            .await
            .unwrap_or(Err(GatewayError::Timeout))
    }

    fn adopt_fetched(&self, task: Task) -> Result<Task, ControllerError> {
        let mut cache = self.cache.lock();
        let task_id = task.task_id.clone();
        let base = match cache.get(&task_id) {
            Some(entry) if entry.in_flight.is_some() => {
                tracing::debug!(task_id = %task_id, "Commit started during refresh, keeping local state");
                return Err(ControllerError::CommitInProgress(task_id));
            }
            Some(entry) if entry.base.version > task.version => entry.base.clone(),
            _ => task,
        };
        tracing::debug!(task_id = %task_id, version = base.version, "Refreshed task");
        cache.insert(task_id, CacheEntry::synced(base.clone()));
        Ok(base)
    }

    fn adopt_committed(&self, task: Task) -> Task {
        let mut cache = self.cache.lock();
        let entry = cache
            .entry(task.task_id.clone())
            .or_insert_with(|| CacheEntry::synced(task.clone()));
        entry.base = task;
        entry.in_flight = None;
        entry.state = entry.state_after_commit();
        tracing::debug!(task_id = %entry.base.task_id, version = entry.base.version, "Commit accepted");
        entry.visible()
    }

    /// Drops all unconfirmed edits and marks the task stale.
    fn discard_unconfirmed(&self, task_id: &TaskId) -> TaskPatch {
        let mut cache = self.cache.lock();
        cache.get_mut(task_id).map_or_else(TaskPatch::new, |entry| {
            entry.state = SyncState::Stale;
            entry.take_unconfirmed()
        })
    }

    /// Drops the in-flight edit only; edits made meanwhile stay pending.
    fn reject_in_flight(&self, task_id: &TaskId) -> TaskPatch {
        let mut cache = self.cache.lock();
        cache.get_mut(task_id).map_or_else(TaskPatch::new, |entry| {
            let rejected = entry.in_flight.take().unwrap_or_default();
            entry.state = entry.state_after_commit();
            rejected
        })
    }

    /// Puts an unsent edit back in front of any edits made meanwhile.
    fn restore_pending(&self, task_id: &TaskId) {
        if let Some(entry) = self.cache.lock().get_mut(task_id) {
            entry.pending = entry.take_unconfirmed();
            entry.state = if entry.pending.is_empty() {
                SyncState::Synced
            } else {
                SyncState::PendingEdit
            };
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
