//! Error types for the BIM Portal client.

use crate::secret::SecretString;
use crate::transport::TransportError;
use thiserror::Error;

/// Failures while establishing an authenticated session.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    /// Login rejected with 401. Not retried with the same credentials.
    #[error("Invalid credentials: login rejected by the portal")]
    InvalidCredentials,

    /// Refresh rejected with 401/403. Triggers a fresh login and is only
    /// surfaced if the caller asks for a refresh directly.
    #[error("Refresh token expired or invalid")]
    TokenExpiredOrInvalid,

    /// Connection or timeout failure talking to the identity endpoints.
    #[error("Network failure during authentication: {0}")]
    NetworkFailure(String),

    /// Terminal failure: unexpected status or unparseable response body.
    #[error("Authentication failed: {message}")]
    AuthenticationFailure {
        /// HTTP status, when the failure came from a response.
        status: Option<u16>,
        /// Diagnostic message (never contains secrets).
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result of an authentication attempt.
///
/// `Unconfigured` is the expected outcome for anonymous use and is not an
/// error: the caller proceeds without an `Authorization` header.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// A usable access token.
    Authenticated(SecretString),
    /// No credentials configured.
    Unconfigured,
    /// Credentials configured, but no session could be established.
    Failed(AuthError),
}

impl AuthOutcome {
    /// Whether a token was obtained.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Errors surfaced by the request executor and the resource client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Authentication failed before the request could be sent.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Transport-level failure on the final attempt.
    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    /// Non-2xx response while `raise_on_unexpected_status` is enabled.
    #[error("Unexpected response status {status}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Response body as (lossy) UTF-8, for diagnostics.
        body: String,
    },

    /// Response body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Invalid request or client configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The auth retry loop ended without producing a result.
    #[error("Authentication retry loop exhausted")]
    RetryLoopExhausted,
}
