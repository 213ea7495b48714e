//! `PostgreSQL` repository implementations.
//!
//! Tasks are stored column-per-field so that the conditional update can be a
//! single row-level compare-and-increment executed by the database.
//!
//! # Table Schema
//!
//! ```sql
//! CREATE TABLE projects (
//!     id UUID PRIMARY KEY,
//!     name TEXT NOT NULL,
//!     description TEXT,
//!     created_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE tasks (
//!     id UUID PRIMARY KEY,
//!     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
//!     title TEXT NOT NULL,
//!     status TEXT NOT NULL,
//!     assignee_user_id UUID,
//!     due_date TIMESTAMPTZ,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL,
//!     version BIGINT NOT NULL DEFAULT 0
//! );
//!
//! CREATE TABLE users (
//!     id UUID PRIMARY KEY,
//!     name TEXT NOT NULL,
//!     email TEXT NOT NULL UNIQUE,
//!     password_hash TEXT NOT NULL,
//!     role TEXT NOT NULL DEFAULT 'member'
//! );
//! ```

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    FieldUpdate, PasswordHash, Project, ProjectId, Task, TaskId, TaskPatch, TaskStatus,
    Timestamp, User, UserId, UserRole,
};
use crate::infrastructure::{
    ProjectRepository, RepositoryError, TaskFilter, TaskRepository, UserRepository,
};

const SCHEMA_STATEMENTS: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS projects (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        id UUID PRIMARY KEY,
        project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        status TEXT NOT NULL,
        assignee_user_id UUID,
        due_date TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        version BIGINT NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_project_id ON tasks(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_assignee_user_id ON tasks(assignee_user_id)",
    "CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'member'
    )",
];

const TASK_COLUMNS: &str =
    "id, project_id, title, status, assignee_user_id, due_date, created_at, updated_at, version";

/// Creates the tables used by the `PostgreSQL` repositories if they are missing.
///
/// # Errors
///
/// Returns `RepositoryError::DatabaseError` if any statement fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), RepositoryError> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(database_error)?;
    }
    Ok(())
}

#[allow(clippy::needless_pass_by_value)]
fn database_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::DatabaseError(error.to_string())
}

fn version_to_database(version: u64) -> Result<i64, RepositoryError> {
    i64::try_from(version)
        .map_err(|_| RepositoryError::SerializationError(format!("version {version} out of range")))
}

fn version_from_database(version: i64) -> Result<u64, RepositoryError> {
    u64::try_from(version)
        .map_err(|_| RepositoryError::SerializationError(format!("negative version {version}")))
}

/// Splits a tri-state update into the `(present, value)` pair bound to a
/// `CASE WHEN` column assignment.
fn field_binding<T: Clone, U>(update: &FieldUpdate<T>, convert: impl Fn(T) -> U) -> (bool, Option<U>) {
    match update {
        FieldUpdate::Keep => (false, None),
        FieldUpdate::Clear => (true, None),
        FieldUpdate::Set(value) => (true, Some(convert(value.clone()))),
    }
}

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    project_id: Uuid,
    title: String,
    status: String,
    assignee_user_id: Option<Uuid>,
    due_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = RepositoryError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status: TaskStatus = row
            .status
            .parse()
            .map_err(|error: crate::domain::UnknownStatus| {
                RepositoryError::SerializationError(error.to_string())
            })?;
        Ok(Self {
            task_id: TaskId::from_uuid(row.id),
            project_id: ProjectId::from_uuid(row.project_id),
            title: row.title,
            status,
            assignee_user_id: row.assignee_user_id.map(UserId::from_uuid),
            due_date: row.due_date.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            version: version_from_database(row.version)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Self {
            project_id: ProjectId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            created_at: Timestamp::from_datetime(row.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: UserRole = row
            .role
            .parse()
            .map_err(|error: crate::domain::UnknownRole| {
                RepositoryError::SerializationError(error.to_string())
            })?;
        Ok(Self {
            user_id: UserId::from_uuid(row.id),
            name: row.name,
            email: row.email,
            password: PasswordHash::from_hash(row.password_hash),
            role,
        })
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|database_error| database_error.is_unique_violation())
}

// =============================================================================
// PostgreSQL Task Repository
// =============================================================================

/// `PostgreSQL` implementation of `TaskRepository`.
///
/// The conditional update is one `UPDATE ... WHERE id = $1 AND version = $2`
/// statement, so the database row lock is the per-task lock.
///
/// # Example
///
/// ```ignore
/// let pool = PgPool::connect("postgres://localhost/taskboard").await?;
/// ensure_schema(&pool).await?;
/// let repository = PostgresTaskRepository::new(pool);
/// let found = repository.find_by_id(&task_id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl TaskRepository for PostgresTaskRepository {
    fn find_by_id(&self, id: &TaskId) -> BoxFuture<'static, Result<Option<Task>, RepositoryError>> {
        let pool = self.pool.clone();
        let task_id = id.clone();

        async move {
            let row: Option<TaskRow> =
                sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
                    .bind(task_id.as_uuid())
                    .fetch_optional(&pool)
                    .await
                    .map_err(database_error)?;

            row.map(Task::try_from).transpose()
        }
        .boxed()
    }

    fn create(&self, task: &Task) -> BoxFuture<'static, Result<(), RepositoryError>> {
        let pool = self.pool.clone();
        let task = task.clone();

        async move {
            if task.version != Task::INITIAL_VERSION {
                return Err(RepositoryError::VersionConflict {
                    expected: Task::INITIAL_VERSION,
                    actual: task.version,
                });
            }

            sqlx::query(
                "INSERT INTO tasks \
                 (id, project_id, title, status, assignee_user_id, due_date, created_at, updated_at, version) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(task.task_id.as_uuid())
            .bind(task.project_id.as_uuid())
            .bind(&task.title)
            .bind(task.status.as_str())
            .bind(task.assignee_user_id.as_ref().map(UserId::as_uuid))
            .bind(task.due_date.map(|due_date| *due_date.as_datetime()))
            .bind(task.created_at.as_datetime())
            .bind(task.updated_at.as_datetime())
            .bind(version_to_database(task.version)?)
            .execute(&pool)
            .await
            .map_err(|error| {
                if is_unique_violation(&error) {
                    RepositoryError::AlreadyExists(task.task_id.to_string())
                } else {
                    database_error(error)
                }
            })?;

            Ok(())
        }
        .boxed()
    }

    fn conditional_update(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
        expected_version: u64,
        now: Timestamp,
    ) -> BoxFuture<'static, Result<Task, RepositoryError>> {
        let pool = self.pool.clone();
        let task_id = id.clone();
        let patch = patch.clone();

        async move {
            patch.validate()?;

            let (title_present, title) = field_binding(&patch.title, |title| title);
            let (status_present, status) =
                field_binding(&patch.status, |status| status.as_str().to_string());
            let (assignee_present, assignee) =
                field_binding(&patch.assignee_user_id, |user_id| *user_id.as_uuid());
            let (due_date_present, due_date) =
                field_binding(&patch.due_date, |due_date| *due_date.as_datetime());

            let row: Option<TaskRow> = sqlx::query_as(&format!(
                "UPDATE tasks SET \
                 title = CASE WHEN $3 THEN $4 ELSE title END, \
                 status = CASE WHEN $5 THEN $6 ELSE status END, \
                 assignee_user_id = CASE WHEN $7 THEN $8 ELSE assignee_user_id END, \
                 due_date = CASE WHEN $9 THEN $10 ELSE due_date END, \
                 version = version + 1, \
                 updated_at = $11 \
                 WHERE id = $1 AND version = $2 \
                 RETURNING {TASK_COLUMNS}"
            ))
            .bind(task_id.as_uuid())
            .bind(version_to_database(expected_version)?)
            .bind(title_present)
            .bind(title)
            .bind(status_present)
            .bind(status)
            .bind(assignee_present)
            .bind(assignee)
            .bind(due_date_present)
            .bind(due_date)
            .bind(now.as_datetime())
            .fetch_optional(&pool)
            .await
            .map_err(database_error)?;

            if let Some(row) = row {
                return Task::try_from(row);
            }

            let current: Option<(i64,)> = sqlx::query_as("SELECT version FROM tasks WHERE id = $1")
                .bind(task_id.as_uuid())
                .fetch_optional(&pool)
                .await
                .map_err(database_error)?;

            match current {
                Some((actual,)) => Err(RepositoryError::VersionConflict {
                    expected: expected_version,
                    actual: version_from_database(actual)?,
                }),
                None => Err(RepositoryError::NotFound(task_id.to_string())),
            }
        }
        .boxed()
    }

    fn delete(&self, id: &TaskId) -> BoxFuture<'static, Result<bool, RepositoryError>> {
        let pool = self.pool.clone();
        let task_id = id.clone();

        async move {
            let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
                .bind(task_id.as_uuid())
                .execute(&pool)
                .await
                .map_err(database_error)?;

            Ok(result.rows_affected() > 0)
        }
        .boxed()
    }

    fn list(&self, filter: &TaskFilter) -> BoxFuture<'static, Result<Vec<Task>, RepositoryError>> {
        let pool = self.pool.clone();
        let filter = filter.clone();

        async move {
            // NULL parameters disable the corresponding filter.
            let rows: Vec<TaskRow> = sqlx::query_as(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks \
                 WHERE ($1::uuid IS NULL OR project_id = $1) \
                 AND ($2::text IS NULL OR status = $2) \
                 AND ($3::uuid IS NULL OR assignee_user_id = $3) \
                 ORDER BY created_at ASC, id ASC"
            ))
            .bind(filter.project_id.as_ref().map(ProjectId::as_uuid))
            .bind(filter.status.map(TaskStatus::as_str))
            .bind(filter.assignee.as_ref().map(UserId::as_uuid))
            .fetch_all(&pool)
            .await
            .map_err(database_error)?;

            rows.into_iter().map(Task::try_from).collect()
        }
        .boxed()
    }
}

// =============================================================================
// PostgreSQL Project Repository
// =============================================================================

/// `PostgreSQL` implementation of `ProjectRepository`.
#[derive(Debug, Clone)]
pub struct PostgresProjectRepository {
    pool: PgPool,
}

impl PostgresProjectRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ProjectRepository for PostgresProjectRepository {
    fn find_by_id(&self, id: &ProjectId) -> BoxFuture<'static, Result<Option<Project>, RepositoryError>> {
        let pool = self.pool.clone();
        let project_id = id.clone();

        async move {
            let row: Option<ProjectRow> = sqlx::query_as(
                "SELECT id, name, description, created_at FROM projects WHERE id = $1",
            )
            .bind(project_id.as_uuid())
            .fetch_optional(&pool)
            .await
            .map_err(database_error)?;

            Ok(row.map(Project::from))
        }
        .boxed()
    }

    fn create(&self, project: &Project) -> BoxFuture<'static, Result<(), RepositoryError>> {
        let pool = self.pool.clone();
        let project = project.clone();

        async move {
            sqlx::query(
                "INSERT INTO projects (id, name, description, created_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(project.project_id.as_uuid())
            .bind(&project.name)
            .bind(project.description.as_deref())
            .bind(project.created_at.as_datetime())
            .execute(&pool)
            .await
            .map_err(|error| {
                if is_unique_violation(&error) {
                    RepositoryError::AlreadyExists(project.project_id.to_string())
                } else {
                    database_error(error)
                }
            })?;

            Ok(())
        }
        .boxed()
    }

    fn search(&self, query: Option<&str>) -> BoxFuture<'static, Result<Vec<Project>, RepositoryError>> {
        let pool = self.pool.clone();
        let pattern = query
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .map(|query| format!("%{}%", escape_like(query)));

        async move {
            let rows: Vec<ProjectRow> = sqlx::query_as(
                "SELECT id, name, description, created_at FROM projects \
                 WHERE ($1::text IS NULL OR name ILIKE $1 ESCAPE '\\') \
                 ORDER BY created_at ASC, id ASC",
            )
            .bind(pattern)
            .fetch_all(&pool)
            .await
            .map_err(database_error)?;

            Ok(rows.into_iter().map(Project::from).collect())
        }
        .boxed()
    }
}

/// Escapes `LIKE` wildcards so a search term matches literally.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for character in query.chars() {
        if matches!(character, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

// =============================================================================
// PostgreSQL User Repository
// =============================================================================

/// `PostgreSQL` implementation of `UserRepository`.
#[derive(Debug, Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UserRepository for PostgresUserRepository {
    fn find_by_email(&self, email: &str) -> BoxFuture<'static, Result<Option<User>, RepositoryError>> {
        let pool = self.pool.clone();
        let email = email.trim().to_lowercase();

        async move {
            let row: Option<UserRow> = sqlx::query_as(
                "SELECT id, name, email, password_hash, role FROM users WHERE email = $1",
            )
            .bind(&email)
            .fetch_optional(&pool)
            .await
            .map_err(database_error)?;

            row.map(User::try_from).transpose()
        }
        .boxed()
    }

    fn find_by_id(&self, id: &UserId) -> BoxFuture<'static, Result<Option<User>, RepositoryError>> {
        let pool = self.pool.clone();
        let user_id = id.clone();

        async move {
            let row: Option<UserRow> = sqlx::query_as(
                "SELECT id, name, email, password_hash, role FROM users WHERE id = $1",
            )
            .bind(user_id.as_uuid())
            .fetch_optional(&pool)
            .await
            .map_err(database_error)?;

            row.map(User::try_from).transpose()
        }
        .boxed()
    }

    fn create(&self, user: &User) -> BoxFuture<'static, Result<(), RepositoryError>> {
        let pool = self.pool.clone();
        let user = user.clone();

        async move {
            sqlx::query(
                "INSERT INTO users (id, name, email, password_hash, role) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(user.user_id.as_uuid())
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.password.as_str())
            .bind(user.role.as_str())
            .execute(&pool)
            .await
            .map_err(|error| {
                if is_unique_violation(&error) {
                    RepositoryError::AlreadyExists(user.email.clone())
                } else {
                    database_error(error)
                }
            })?;

            Ok(())
        }
        .boxed()
    }
}

// =============================================================================
// Tests
// =============================================================================
