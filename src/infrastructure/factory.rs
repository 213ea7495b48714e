//! Repository factory for runtime backend selection.
//!
//! # Environment Variables
//!
//! - `STORAGE_MODE`: `in_memory` (default) | `postgres`
//! - `DATABASE_URL`: `PostgreSQL` connection URL (required when `STORAGE_MODE=postgres`)
//! - `SEED_DEMO_DATA`: `true` | `false`; defaults to `true` for in-memory storage
//!
//! # Example
//!
//! ```ignore
//! let factory = RepositoryFactory::from_env()?;
//! let repositories = factory.create().await?;
//! let task = repositories.task_repository.find_by_id(&task_id).await?;
//! ```

use std::env;
use std::str::FromStr;
use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;

use super::{
    InMemoryProjectRepository, InMemoryTaskRepository, InMemoryUserRepository,
    PostgresProjectRepository, PostgresTaskRepository, PostgresUserRepository, ProjectRepository,
    RepositoryError, TaskRepository, UserRepository, ensure_schema,
};

// =============================================================================
// Configuration Types
// =============================================================================

/// Storage backend for projects, tasks and users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Process-local storage. Data is lost on restart.
    #[default]
    InMemory,
    /// `PostgreSQL` storage.
    Postgres,
}

impl FromStr for StorageMode {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            _ => Err(ConfigurationError::InvalidStorageMode(value.to_string())),
        }
    }
}

/// Configuration for the repository factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub storage_mode: StorageMode,
    /// `PostgreSQL` connection URL (required when `storage_mode` is `Postgres`).
    pub database_url: Option<String>,
    /// Whether to insert the demo users, project and tasks on startup.
    pub seed_demo_data: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::InMemory,
            database_url: None,
            seed_demo_data: true,
        }
    }
}

impl RepositoryConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RepositoryConfigBuilder {
        RepositoryConfigBuilder::default()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if:
    /// - `STORAGE_MODE` or `SEED_DEMO_DATA` contains an invalid value
    /// - `DATABASE_URL` is missing when `STORAGE_MODE=postgres`
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let storage_mode = match env::var("STORAGE_MODE") {
            Ok(value) => value.parse()?,
            Err(env::VarError::NotPresent) => StorageMode::default(),
            Err(env::VarError::NotUnicode(_)) => {
                return Err(ConfigurationError::InvalidStorageMode(
                    "<non-UTF-8 value>".to_string(),
                ));
            }
        };

        let database_url = env::var("DATABASE_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let seed_demo_data = match env::var("SEED_DEMO_DATA") {
            Ok(value) => parse_flag(&value)
                .ok_or(ConfigurationError::InvalidSeedFlag(value))?,
            Err(_) => storage_mode == StorageMode::InMemory,
        };

        let config = Self {
            storage_mode,
            database_url,
            seed_demo_data,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::MissingDatabaseUrl` if `PostgreSQL` is
    /// selected without a URL.
    pub const fn validate(&self) -> Result<(), ConfigurationError> {
        if matches!(self.storage_mode, StorageMode::Postgres) && self.database_url.is_none() {
            return Err(ConfigurationError::MissingDatabaseUrl);
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Builder for `RepositoryConfig`.
///
/// # Example
///
/// ```ignore
/// let config = RepositoryConfig::builder()
///     .storage_mode(StorageMode::Postgres)
///     .database_url("postgres://localhost/taskboard")
///     .seed_demo_data(false)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct RepositoryConfigBuilder {
    config: RepositoryConfig,
}

impl RepositoryConfigBuilder {
    #[must_use]
    pub fn storage_mode(mut self, mode: StorageMode) -> Self {
        self.config.storage_mode = mode;
        self
    }

    #[must_use]
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn seed_demo_data(mut self, seed: bool) -> Self {
        self.config.seed_demo_data = seed;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the configuration is invalid.
    pub fn build(self) -> Result<RepositoryConfig, ConfigurationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors in repository configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid storage mode: '{0}'. Expected 'in_memory' or 'postgres'")]
    InvalidStorageMode(String),

    #[error("Invalid SEED_DEMO_DATA value: '{0}'. Expected 'true' or 'false'")]
    InvalidSeedFlag(String),

    #[error("DATABASE_URL environment variable is required when STORAGE_MODE=postgres")]
    MissingDatabaseUrl,
}

/// Errors that can occur during factory initialization.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Database connection error: {0}")]
    DatabaseConnection(String),

    #[error("Schema setup error: {0}")]
    Schema(#[from] RepositoryError),
}

// =============================================================================
// Repository Factory
// =============================================================================

/// Collection of initialized repositories, shared across handlers.
#[derive(Clone)]
pub struct Repositories {
    pub task_repository: Arc<dyn TaskRepository>,
    pub project_repository: Arc<dyn ProjectRepository>,
    pub user_repository: Arc<dyn UserRepository>,
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Repositories")
            .field("task_repository", &"Arc<dyn TaskRepository>")
            .field("project_repository", &"Arc<dyn ProjectRepository>")
            .field("user_repository", &"Arc<dyn UserRepository>")
            .finish()
    }
}

/// Creates repository instances based on configuration.
#[derive(Debug, Clone)]
pub struct RepositoryFactory {
    config: RepositoryConfig,
}

impl RepositoryFactory {
    #[must_use]
    pub const fn new(config: RepositoryConfig) -> Self {
        Self { config }
    }

    /// Creates a new repository factory from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError::Configuration` if environment configuration is invalid.
    pub fn from_env() -> Result<Self, FactoryError> {
        let config = RepositoryConfig::from_env()?;
        Ok(Self::new(config))
    }

    #[must_use]
    pub const fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Creates empty in-memory repositories.
    #[must_use]
    pub fn in_memory() -> Repositories {
        Repositories {
            task_repository: Arc::new(InMemoryTaskRepository::new()),
            project_repository: Arc::new(InMemoryProjectRepository::new()),
            user_repository: Arc::new(InMemoryUserRepository::new()),
        }
    }

    /// Creates all repositories based on the configuration.
    ///
    /// In `PostgreSQL` mode this connects, then creates missing tables.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError` if the connection or schema setup fails.
    pub async fn create(&self) -> Result<Repositories, FactoryError> {
        match self.config.storage_mode {
            StorageMode::InMemory => Ok(Self::in_memory()),
            StorageMode::Postgres => {
                let pool = self.create_postgres_pool().await?;
                ensure_schema(&pool).await?;
                Ok(Self::create_postgres_repositories(pool))
            }
        }
    }

    async fn create_postgres_pool(&self) -> Result<PgPool, FactoryError> {
        let database_url = self
            .config
            .database_url
            .as_ref()
            .ok_or(ConfigurationError::MissingDatabaseUrl)?;

        PgPool::connect(database_url)
            .await
            .map_err(|error| FactoryError::DatabaseConnection(error.to_string()))
    }

    fn create_postgres_repositories(pool: PgPool) -> Repositories {
        Repositories {
            task_repository: Arc::new(PostgresTaskRepository::new(pool.clone())),
            project_repository: Arc::new(PostgresProjectRepository::new(pool.clone())),
            user_repository: Arc::new(PostgresUserRepository::new(pool)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
