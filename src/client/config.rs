//! Client configuration.
//!
//! # Environment Variables
//!
//! - `TASKBOARD_API_URL`: base URL of the server (default: `http://localhost:3000`)
//! - `TASKBOARD_COMMIT_TIMEOUT_MS`: upper bound on one commit (default: `5000`)

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Default base URL of the server.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Default commit timeout in milliseconds.
pub const DEFAULT_COMMIT_TIMEOUT_MS: u64 = 5000;

/// Settings shared by the HTTP gateway and the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL without a trailing slash.
    pub api_url: String,
    pub commit_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            commit_timeout: Duration::from_millis(DEFAULT_COMMIT_TIMEOUT_MS),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: normalize_url(&api_url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_commit_timeout(self, commit_timeout: Duration) -> Self {
        Self {
            commit_timeout,
            ..self
        }
    }

    /// Reads the client settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns `ClientConfigError::InvalidCommitTimeout` if the timeout is not
    /// a positive integer.
    pub fn from_env() -> Result<Self, ClientConfigError> {
        let api_url = env::var("TASKBOARD_API_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let commit_timeout = match env::var("TASKBOARD_COMMIT_TIMEOUT_MS") {
            Ok(value) => match value.trim().parse::<u64>() {
                Ok(millis) if millis > 0 => Duration::from_millis(millis),
                _ => return Err(ClientConfigError::InvalidCommitTimeout(value)),
            },
            Err(_) => Duration::from_millis(DEFAULT_COMMIT_TIMEOUT_MS),
        };

        Ok(Self::new(api_url).with_commit_timeout(commit_timeout))
    }

    /// Joins `path` onto the base URL.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientConfigError {
    #[error("Invalid TASKBOARD_COMMIT_TIMEOUT_MS: '{0}'. Expected a positive integer")]
    InvalidCommitTimeout(String),
}
