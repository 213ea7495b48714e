//! Infrastructure layer: repository traits and their storage backends.

pub mod factory;
pub mod in_memory;
pub mod postgres;
pub mod repository;
pub mod seed;

pub use factory::{
    ConfigurationError, FactoryError, Repositories, RepositoryConfig, RepositoryConfigBuilder,
    RepositoryFactory, StorageMode,
};
pub use in_memory::{InMemoryProjectRepository, InMemoryTaskRepository, InMemoryUserRepository};
pub use postgres::{
    PostgresProjectRepository, PostgresTaskRepository, PostgresUserRepository, ensure_schema,
};
pub use repository::{
    ProjectRepository, RepositoryError, TaskFilter, TaskRepository, UserRepository, sort_tasks,
};
pub use seed::{DEMO_PROJECT_NAME, DEMO_USERS, SeedError, seed_demo_data};
