//! Login/refresh orchestration for the BIM Portal identity endpoints.
//!
//! The [`Authenticator`] decides whether the cached token is usable and, if
//! not, obtains a new one: refresh first, then a fresh login with the stored
//! credentials.
//!
//! # Single-flight
//!
//! The whole decide-and-maybe-authenticate sequence runs under one
//! `tokio::sync::Mutex` per authenticator, held across the login/refresh
//! network call. When many tasks notice an expiring token at once, the first
//! performs the call and the rest wait, then read its result from the store.
//! If that call failed, the waiters receive the same error instead of
//! repeating it.
//! The cost is that waiters are blocked for up to one HTTP timeout.
//!
//! # Example
//!
//! ```rust,ignore
//! use bim_portal_client::auth::{AuthConfig, Authenticator};
//! use bim_portal_client::config::Credentials;
//!
//! let config = AuthConfig::new("https://via.bund.de/bim".to_string())
//!     .with_credentials(Credentials::new("me@example.org", "password"));
//! let auth = Authenticator::new(config)?;
//!
//! match auth.get_valid_token().await? {
//!     Some(token) => { /* send Authorization: Bearer <token> */ }
//!     None => { /* no credentials: public access */ }
//! }
//! ```
//!
//! # Security
//!
//! - Password and tokens are `SecretString` and never logged
//! - Identity response bodies are logged at trace level only

use crate::clock::{Clock, SystemClock};
use crate::config::{
    Credentials, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TOKEN_REFRESH_MARGIN, LOGIN_PATH, LOGOUT_PATH,
    REFRESH_PATH,
};
use crate::error::{AuthError, AuthOutcome};
use crate::secret::{ExposeSecret, SecretString};
use crate::token_store::{TokenResponse, TokenStore};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace, warn};

/// Default connection timeout for identity calls.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the [`Authenticator`].
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Portal base URL, without trailing slash (e.g. `https://via.bund.de/bim`).
    pub base_url: String,

    /// Login credentials; `None` means anonymous access.
    pub credentials: Option<Credentials>,

    /// Refresh endpoint path (deployments use `/refresh-token` or `/refresh`).
    pub refresh_path: String,

    /// Treat the token as expiring this long before its actual expiry.
    pub token_refresh_margin: Duration,

    /// HTTP timeout for identity calls.
    pub http_timeout: Duration,
}

impl AuthConfig {
    /// Anonymous configuration with default margin and timeout.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
            refresh_path: REFRESH_PATH.to_string(),
            token_refresh_margin: DEFAULT_TOKEN_REFRESH_MARGIN,
            http_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set login credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the refresh endpoint path.
    #[must_use]
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Set the refresh margin.
    #[must_use]
    pub fn with_token_refresh_margin(mut self, margin: Duration) -> Self {
        self.token_refresh_margin = margin;
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

// =============================================================================
// Identity Request Types
// =============================================================================

#[derive(Serialize)]
struct LoginRequest<'a> {
    mail: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Which identity call produced a failure; selects the error mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdentityCall {
    Login,
    Refresh,
}

impl IdentityCall {
    fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Refresh => "refresh",
        }
    }
}

// =============================================================================
// Authenticator
// =============================================================================

/// Obtains and caches bearer tokens for the portal.
#[derive(Debug)]
pub struct Authenticator {
    config: AuthConfig,
    http_client: reqwest::Client,
    store: Arc<TokenStore>,
    clock: Arc<dyn Clock>,
    /// Serialises renewals; holds the failure of the latest attempt.
    flight: Mutex<Option<AuthError>>,
    /// Completed renewal attempts.
    attempts: AtomicU64,
}

impl Authenticator {
    /// Create an authenticator using the system clock.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an authenticator with an injected clock.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the HTTP client cannot be built.
    pub fn with_clock(config: AuthConfig, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(config.http_timeout))
            .build()
            .map_err(|e| AuthError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
            store: Arc::new(TokenStore::new()),
            clock,
            flight: Mutex::new(None),
            attempts: AtomicU64::new(0),
        })
    }

    /// Whether credentials were supplied.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.config.credentials.is_some()
    }

    /// The token cache shared with the request executor.
    #[must_use]
    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// The configuration this authenticator was built with.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Return a usable access token, authenticating if needed.
    ///
    /// `Ok(None)` means no credentials are configured and the caller should
    /// proceed anonymously. It is never returned for a failed login.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` - login rejected with 401
    /// - `NetworkFailure` - identity endpoint unreachable or timed out
    /// - `AuthenticationFailure` - unexpected status or unparseable response
    #[instrument(skip_all)]
    pub async fn get_valid_token(&self) -> Result<Option<SecretString>, AuthError> {
        let Some(credentials) = &self.config.credentials else {
            debug!(
                target: "bim.auth",
                "No credentials configured, proceeding with public access"
            );
            return Ok(None);
        };

        let observed = self.attempts.load(Ordering::Acquire);
        let mut last_failure = self.flight.lock().await;

        if !self
            .store
            .is_expiring(self.config.token_refresh_margin, self.clock.now())
        {
            if let Some(token) = self.store.access_token() {
                return Ok(Some(token));
            }
        }

        // An attempt finished while we waited and it failed: share its error
        if self.attempts.load(Ordering::Acquire) != observed {
            if let Some(e) = last_failure.as_ref() {
                debug!(
                    target: "bim.auth",
                    error = %e,
                    "Concurrent authentication attempt failed, sharing its result"
                );
                return Err(e.clone());
            }
        }

        let result = self.renew(credentials).await;
        *last_failure = result.as_ref().err().cloned();
        self.attempts.fetch_add(1, Ordering::Release);
        result.map(Some)
    }

    /// Refresh if possible, otherwise log in. Caller holds the flight lock.
    async fn renew(&self, credentials: &Credentials) -> Result<SecretString, AuthError> {
        info!(target: "bim.auth", "Token missing or expiring, authenticating");

        if let Some(refresh_token) = self.store.refresh_token() {
            match self.refresh(&refresh_token).await {
                Ok(token) => return Ok(token),
                Err(AuthError::NetworkFailure(reason)) => {
                    warn!(
                        target: "bim.auth",
                        error = %reason,
                        "Network failure during token refresh"
                    );
                    return Err(AuthError::NetworkFailure(reason));
                }
                Err(e) => {
                    info!(
                        target: "bim.auth",
                        error = %e,
                        "Token refresh failed, falling back to login"
                    );
                }
            }
        } else {
            debug!(target: "bim.auth", "No refresh token available");
        }

        self.login(credentials).await
    }

    /// Tagged form of [`get_valid_token`](Self::get_valid_token).
    pub async fn authenticate(&self) -> AuthOutcome {
        match self.get_valid_token().await {
            Ok(Some(token)) => AuthOutcome::Authenticated(token),
            Ok(None) => AuthOutcome::Unconfigured,
            Err(e) => AuthOutcome::Failed(e),
        }
    }

    /// End the server-side session and clear the local token.
    ///
    /// The store is cleared whatever the server answers. Returns whether the
    /// server acknowledged the logout with a 2xx status; `Ok(false)` without
    /// a network call when no token is held.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NetworkFailure` if the logout call cannot be sent.
    #[instrument(skip_all)]
    pub async fn logout(&self) -> Result<bool, AuthError> {
        let _flight = self.flight.lock().await;

        let Some(token) = self.store.access_token() else {
            debug!(target: "bim.auth", "No active session to log out");
            return Ok(false);
        };
        self.store.clear();

        let response = self
            .http_client
            .post(self.config.url(LOGOUT_PATH))
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!(target: "bim.auth", "Logged out");
        } else {
            warn!(target: "bim.auth", status = %status, "Logout not acknowledged");
        }
        Ok(status.is_success())
    }

    /// Exchange the refresh token for a new token triple.
    async fn refresh(&self, refresh_token: &SecretString) -> Result<SecretString, AuthError> {
        debug!(target: "bim.auth", "Refreshing access token");

        let body = RefreshRequest {
            refresh_token: refresh_token.expose_secret(),
        };
        let result = self
            .request_token(&self.config.url(&self.config.refresh_path), &body, IdentityCall::Refresh)
            .await;

        match result {
            Ok(response) => {
                let token = response.token.clone();
                self.store.set_from_response(response);
                info!(target: "bim.auth", "Token refreshed successfully");
                Ok(token)
            }
            Err(AuthError::NetworkFailure(reason)) => Err(AuthError::NetworkFailure(reason)),
            Err(e) => {
                self.store.clear();
                Err(e)
            }
        }
    }

    /// Log in with the configured credentials.
    async fn login(&self, credentials: &Credentials) -> Result<SecretString, AuthError> {
        debug!(target: "bim.auth", "Logging in with configured credentials");

        let body = LoginRequest {
            mail: &credentials.mail,
            password: credentials.password.expose_secret(),
        };

        match self
            .request_token(&self.config.url(LOGIN_PATH), &body, IdentityCall::Login)
            .await
        {
            Ok(response) => {
                let token = response.token.clone();
                self.store.set_from_response(response);
                info!(target: "bim.auth", "Login successful");
                Ok(token)
            }
            Err(e) => {
                warn!(target: "bim.auth", error = %e, "Login failed");
                self.store.clear();
                Err(e)
            }
        }
    }

    /// POST an identity request and parse the token payload.
    async fn request_token<B: Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
        call: IdentityCall,
    ) -> Result<TokenResponse, AuthError> {
        let response = self
            .http_client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                debug!(target: "bim.auth", call = call.as_str(), error = %e, "HTTP request failed");
                AuthError::NetworkFailure(e.to_string())
            })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))?;

        if status.is_success() {
            let token_response: TokenResponse = serde_json::from_slice(&bytes).map_err(|e| {
                warn!(
                    target: "bim.auth",
                    call = call.as_str(),
                    error = %e,
                    "Failed to parse token response"
                );
                AuthError::AuthenticationFailure {
                    status: Some(status.as_u16()),
                    message: format!("Invalid {} response format: {e}", call.as_str()),
                }
            })?;

            if token_response.token.expose_secret().is_empty() {
                return Err(AuthError::AuthenticationFailure {
                    status: Some(status.as_u16()),
                    message: format!("Empty token in {} response", call.as_str()),
                });
            }
            return Ok(token_response);
        }

        let body = String::from_utf8_lossy(&bytes);
        warn!(
            target: "bim.auth",
            call = call.as_str(),
            status = %status,
            "Identity endpoint rejected request"
        );
        trace!(target: "bim.auth", body = %body, "Identity rejection response body");

        Err(match (call, status.as_u16()) {
            (IdentityCall::Login, 401) => AuthError::InvalidCredentials,
            (IdentityCall::Refresh, 401 | 403) => AuthError::TokenExpiredOrInvalid,
            (_, code) => AuthError::AuthenticationFailure {
                status: Some(code),
                message: format!("{} returned status {code}: {body}", call.as_str()),
            },
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
