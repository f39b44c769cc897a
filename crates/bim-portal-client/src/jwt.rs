//! Unverified JWT claim extraction.
//!
//! The portal's login response normally carries an explicit `validTill`. When
//! it does not, the expiry is read from the access token's own `exp` claim.
//! The signature is NOT verified: the client only needs a hint for when to
//! refresh, and the server remains the authority on whether the token is
//! accepted.
//!
//! Tokens that are not JWTs (opaque strings) simply yield an error here; the
//! caller then stores the token without an expiry.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum token size we are willing to decode (8KB).
///
/// Checked before any base64 or JSON work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

// =============================================================================
// Error Types
// =============================================================================

/// Reasons an expiry could not be read from a token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtDecodeError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("Token exceeds maximum decodable size")]
    TokenTooLarge,

    /// Not a `header.payload.signature` string, or payload is not base64 JSON.
    #[error("Token is not a decodable JWT")]
    MalformedToken,

    /// Payload has no numeric `exp` claim, or it is out of range.
    #[error("Token has no usable exp claim")]
    MissingExp,
}

// =============================================================================
// Functions
// =============================================================================

/// Read the `exp` claim (Unix epoch seconds) from a JWT payload.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - wrong structure, bad base64, or invalid JSON
/// - `MissingExp` - no numeric `exp` claim
pub fn extract_exp(token: &str) -> Result<i64, JwtDecodeError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "bim.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token too large to decode"
        );
        return Err(JwtDecodeError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "bim.jwt", "Token is not in JWT format");
        return Err(JwtDecodeError::MalformedToken);
    };

    // Some issuers pad their base64url segments
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| {
            tracing::debug!(target: "bim.jwt", error = %e, "Failed to decode JWT payload base64");
            JwtDecodeError::MalformedToken
        })?;

    let claims: serde_json::Value = serde_json::from_slice(&payload_bytes).map_err(|e| {
        tracing::debug!(target: "bim.jwt", error = %e, "Failed to parse JWT payload JSON");
        JwtDecodeError::MalformedToken
    })?;

    let exp = claims.get("exp").ok_or(JwtDecodeError::MissingExp)?;

    #[allow(clippy::cast_possible_truncation)]
    exp.as_i64()
        .or_else(|| exp.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
        .ok_or(JwtDecodeError::MissingExp)
}

/// Expiry instant of a JWT, or `None` when it cannot be determined.
#[must_use]
pub fn expiry_of(token: &str) -> Option<DateTime<Utc>> {
    match extract_exp(token) {
        Ok(exp) => DateTime::from_timestamp(exp, 0),
        Err(e) => {
            tracing::debug!(target: "bim.jwt", error = %e, "No expiry derivable from access token");
            None
        }
    }
}
