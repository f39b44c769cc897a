//! Secret types for values that must never reach logs.
//!
//! Re-exports [`secrecy`] so the rest of the crate (and its callers) hold the
//! portal password, access tokens and refresh tokens as [`SecretString`].
//! `SecretString` redacts itself in `Debug`, so any struct deriving `Debug`
//! stays safe to log with `{:?}` or through `tracing` fields.
//!
//! The raw value is only reachable through [`ExposeSecret::expose_secret`],
//! which keeps every point where a token leaves the process easy to grep for:
//! the JSON login/refresh bodies and the `Authorization` header.
//!
//! ```rust
//! use bim_portal_client::secret::{ExposeSecret, SecretString};
//!
//! let token = SecretString::from("eyJhbGciOi...");
//! assert!(!format!("{token:?}").contains("eyJ"));
//! assert_eq!(token.expose_secret(), "eyJhbGciOi...");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

/// Compare two secrets without exposing either outside this function.
#[must_use]
pub fn same_secret(a: &SecretString, b: &SecretString) -> bool {
    a.expose_secret() == b.expose_secret()
}
