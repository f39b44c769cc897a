//! Authenticated request execution with bounded auth retry.
//!
//! Every request goes through [`AuthenticatedRequestExecutor::execute`]:
//!
//! 1. ask the [`Authenticator`] for a token (or none, for public access)
//! 2. send the request with `Authorization: Bearer <token>` when present
//! 3. on 401/403, invalidate that token and try again, at most
//!    `auth_retry_limit` times
//!
//! The final response is returned as-is unless `raise_on_unexpected_status`
//! is set, in which case any status >= 400 becomes
//! [`ClientError::UnexpectedStatus`].

use crate::auth::Authenticator;
use crate::error::ClientError;
use crate::secret::SecretString;
use crate::transport::{ApiRequest, ApiResponse, HttpMethod, HttpTransport, ReqwestTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Executor settings.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Portal base URL; request paths are appended to it.
    pub base_url: String,

    /// Re-authentication retries after a 401/403. Total attempts are
    /// `auth_retry_limit + 1`.
    pub auth_retry_limit: u32,

    /// Map any final status >= 400 to `ClientError::UnexpectedStatus`.
    pub raise_on_unexpected_status: bool,
}

/// Sends API requests with a valid bearer token.
pub struct AuthenticatedRequestExecutor {
    config: ExecutorConfig,
    authenticator: Arc<Authenticator>,
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for AuthenticatedRequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedRequestExecutor")
            .field("config", &self.config)
            .field("authenticator", &self.authenticator)
            .finish_non_exhaustive()
    }
}

impl AuthenticatedRequestExecutor {
    #[must_use]
    pub fn new(
        config: ExecutorConfig,
        authenticator: Arc<Authenticator>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            config: ExecutorConfig { base_url, ..config },
            authenticator,
            transport,
        }
    }

    /// Build an executor over a [`ReqwestTransport`].
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn with_reqwest(
        config: ExecutorConfig,
        authenticator: Arc<Authenticator>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(timeout)?;
        Ok(Self::new(config, authenticator, Arc::new(transport)))
    }

    #[must_use]
    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.authenticator
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a request against `base_url + path`.
    ///
    /// # Errors
    ///
    /// - `Auth` - no token could be obtained (credentials configured)
    /// - `Network` - transport failure on the final attempt
    /// - `UnexpectedStatus` - status >= 400 with `raise_on_unexpected_status`
    #[instrument(skip_all, fields(method = %method, path = %path))]
    pub async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, ClientError> {
        let url = format!("{}{}", self.config.base_url, path);
        let limit = self.config.auth_retry_limit;

        for attempt in 0..=limit {
            let is_final = attempt == limit;
            let token: Option<SecretString> = self.authenticator.get_valid_token().await?;

            let request = ApiRequest {
                method,
                url: url.clone(),
                bearer: token.clone(),
                body: body.cloned(),
            };

            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(e) if is_final => return Err(ClientError::Network(e)),
                Err(e) => {
                    warn!(
                        target: "bim.executor",
                        attempt = attempt + 1,
                        error = %e,
                        "Request failed, retrying"
                    );
                    continue;
                }
            };

            if response.is_auth_rejection() {
                if is_final {
                    warn!(
                        target: "bim.executor",
                        status = response.status,
                        attempts = attempt + 1,
                        "Authorization still rejected after retries"
                    );
                    return self.finish(response);
                }

                debug!(
                    target: "bim.executor",
                    status = response.status,
                    attempt = attempt + 1,
                    "Authorization rejected, invalidating token and retrying"
                );
                if let Some(rejected) = &token {
                    self.authenticator.token_store().clear_if_current(rejected);
                }
                continue;
            }

            return self.finish(response);
        }

        Err(ClientError::RetryLoopExhausted)
    }

    /// `execute` with `GET` and no body.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn get(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.execute(HttpMethod::Get, path, None).await
    }

    /// `execute` with `POST` and a JSON body.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<ApiResponse, ClientError> {
        self.execute(HttpMethod::Post, path, Some(body)).await
    }

    fn finish(&self, response: ApiResponse) -> Result<ApiResponse, ClientError> {
        if self.config.raise_on_unexpected_status && response.status >= 400 {
            return Err(ClientError::UnexpectedStatus {
                status: response.status,
                body: response.text(),
            });
        }
        Ok(response)
    }
}
