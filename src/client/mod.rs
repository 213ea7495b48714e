//! Client library: session handling, server access and the optimistic
//! update controller.

pub mod config;
pub mod controller;
pub mod gateway;
pub mod session;

pub use config::{ClientConfig, ClientConfigError, DEFAULT_API_URL, DEFAULT_COMMIT_TIMEOUT_MS};
pub use controller::{ControllerError, OptimisticUpdateController, SyncState};
pub use gateway::{GatewayError, HttpTaskGateway, RepositoryGateway, TaskGateway};
pub use session::Session;
