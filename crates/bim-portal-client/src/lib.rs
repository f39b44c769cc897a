//! Client library for the BIM Portal REST API.
//!
//! The core of the crate is the token lifecycle:
//!
//! - [`token_store::TokenStore`] holds the current access/refresh token pair
//! - [`auth::Authenticator`] performs lazy login, refresh-before-expiry and
//!   fallback-to-relogin, one network call at a time
//! - [`executor::AuthenticatedRequestExecutor`] attaches the bearer token and
//!   retries once after an authorization failure
//!
//! [`client::ResourceClient`] and [`export::ExportWriter`] build the
//! per-endpoint API and the export-to-disk helpers on top of that core.

#![warn(clippy::pedantic)]

/// Module for environment-driven configuration
pub mod config;

/// Module for error types
pub mod error;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for the injectable UTC clock
pub mod clock;

/// Module for unverified JWT claim extraction
pub mod jwt;

/// Module for the thread-safe token cache
pub mod token_store;

/// Module for login/refresh orchestration
pub mod auth;

/// Module for the HTTP transport seam
pub mod transport;

/// Module for authenticated requests with bounded auth retry
pub mod executor;

/// Module for BIM Portal resource records
pub mod models;

/// Module for per-endpoint resource methods
pub mod client;

/// Module for writing exported artifacts to disk
pub mod export;

pub use auth::{AuthConfig, Authenticator};
pub use client::ResourceClient;
pub use config::Config;
pub use error::{AuthError, AuthOutcome, ClientError};
pub use executor::{AuthenticatedRequestExecutor, ExecutorConfig};
