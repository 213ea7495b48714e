//! Client-side authentication session.
//!
//! A [`Session`] owns the HTTP client and the current bearer token. `login`
//! initializes it; `logout` and any 401 response tear it down again, after
//! which every request goes out unauthenticated until the next login.

use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use super::config::ClientConfig;
use super::gateway::GatewayError;
use crate::api::{LoginRequest, TokenResponse};

/// Authenticated connection to the server.
#[derive(Debug)]
pub struct Session {
    http: Client,
    config: ClientConfig,
    token: RwLock<Option<String>>,
}

impl Session {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            token: RwLock::new(None),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }

    /// Exchanges credentials for a bearer token and stores it.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unauthorized` for wrong credentials and the
    /// transport variants for network failures.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), GatewayError> {
        let response = self
            .http
            .post(self.config.endpoint("/auth/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .map_err(GatewayError::from)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.logout();
            return Err(GatewayError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(GatewayError::Unexpected {
                status: response.status().as_u16(),
            });
        }

        let token: TokenResponse = response.json().await.map_err(GatewayError::from)?;
        *self.token.write() = Some(token.access_token);
        tracing::debug!(email, "Session established");
        Ok(())
    }

    /// Discards the token.
    pub fn logout(&self) {
        if self.token.write().take().is_some() {
            tracing::debug!("Session cleared");
        }
    }

    /// Starts a request to `path`, attaching the bearer token if logged in.
    pub(crate) fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.config.endpoint(path));
        match self.token.read().as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request and clears the session on a 401.
    pub(crate) async fn send(&self, builder: RequestBuilder) -> Result<Response, GatewayError> {
        let response = builder.send().await.map_err(GatewayError::from)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.logout();
            return Err(GatewayError::Unauthorized);
        }
        Ok(response)
    }
}
