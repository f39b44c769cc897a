//! Thread-safe token cache.
//!
//! Holds the access token, refresh token and expiry instant behind a single
//! `std::sync::Mutex`. Every operation locks only for the duration of a field
//! read or write; network calls happen in [`crate::auth`], never under this
//! lock.

use crate::jwt;
use crate::secret::{same_secret, ExposeSecret, SecretString};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

// =============================================================================
// Wire Types
// =============================================================================

/// Token payload returned by the login and refresh endpoints.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// Access token (usually a JWT).
    pub token: SecretString,

    /// Refresh token, when the deployment issues one.
    #[serde(default)]
    pub refresh_token: Option<SecretString>,

    /// ISO-8601 expiry of the access token.
    #[serde(default)]
    pub valid_till: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("valid_till", &self.valid_till)
            .finish()
    }
}

impl TokenResponse {
    /// Expiry of the access token.
    ///
    /// Uses `validTill` when present and parseable, otherwise the token's own
    /// `exp` claim. `None` means the expiry is unknown.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if let Some(raw) = self.valid_till.as_deref() {
            match parse_valid_till(raw) {
                Some(instant) => return Some(instant),
                None => warn!(
                    target: "bim.token_store",
                    valid_till = %raw,
                    "Unparseable validTill, falling back to token claims"
                ),
            }
        }
        jwt::expiry_of(self.token.expose_secret())
    }
}

/// Parse a `validTill` timestamp into UTC.
///
/// Accepts RFC 3339 with an offset (`2025-01-01T12:00:00+01:00`, `...Z`) and
/// offset-less ISO-8601 (`2025-01-01T12:00:00.123`), which is taken as UTC.
#[must_use]
pub fn parse_valid_till(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// =============================================================================
// Token Store
// =============================================================================

#[derive(Default)]
struct TokenState {
    access_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    expires_at: Option<DateTime<Utc>>,
}

/// Single source of truth for the current token triple.
#[derive(Default)]
pub struct TokenStore {
    state: Mutex<TokenState>,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("TokenStore")
            .field("has_access_token", &state.access_token.is_some())
            .field("has_refresh_token", &state.refresh_token.is_some())
            .field("expires_at", &state.expires_at)
            .finish()
    }
}

impl TokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // The state is plain data that is always whole between writes, so a
    // panic in another holder cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace all three fields atomically.
    pub fn set_token(
        &self,
        access_token: SecretString,
        refresh_token: Option<SecretString>,
        expires_at: Option<DateTime<Utc>>,
    ) {
        let mut state = self.lock();
        state.access_token = Some(access_token);
        state.refresh_token = refresh_token;
        state.expires_at = expires_at;
    }

    /// Store a login/refresh response, deriving the expiry as described on
    /// [`TokenResponse::expires_at`].
    ///
    /// Returns the stored expiry. `None` means the token will be treated as
    /// expiring on every check.
    pub fn set_from_response(&self, response: TokenResponse) -> Option<DateTime<Utc>> {
        let expires_at = response.expires_at();
        if expires_at.is_none() {
            warn!(
                target: "bim.token_store",
                "Token expiry unknown; it will be renewed before every use"
            );
        }
        self.set_token(response.token, response.refresh_token, expires_at);
        debug!(target: "bim.token_store", expires_at = ?expires_at, "Token stored");
        expires_at
    }

    /// Current access token.
    #[must_use]
    pub fn access_token(&self) -> Option<SecretString> {
        self.lock().access_token.clone()
    }

    /// Current refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> Option<SecretString> {
        self.lock().refresh_token.clone()
    }

    /// Current expiry instant.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.lock().expires_at
    }

    /// Whether the access token is missing, has no known expiry, or expires
    /// within `margin` of `now`.
    ///
    /// Equivalent to `now >= expires_at - margin`.
    #[must_use]
    pub fn is_expiring(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        let state = self.lock();
        let (Some(_), Some(expires_at)) = (&state.access_token, state.expires_at) else {
            return true;
        };

        // A margin too large to represent is "always expiring"
        chrono::Duration::from_std(margin)
            .ok()
            .and_then(|margin| now.checked_add_signed(margin))
            .map_or(true, |deadline| deadline >= expires_at)
    }

    /// Reset all fields. Idempotent.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.access_token = None;
        state.refresh_token = None;
        state.expires_at = None;
    }

    /// Clear the store only if it still holds `rejected` as its access token.
    ///
    /// A token installed by a concurrent re-authentication is left alone.
    /// Returns whether the store was cleared.
    pub fn clear_if_current(&self, rejected: &SecretString) -> bool {
        let mut state = self.lock();
        let is_current = state
            .access_token
            .as_ref()
            .is_some_and(|current| same_secret(current, rejected));
        if is_current {
            state.access_token = None;
            state.refresh_token = None;
            state.expires_at = None;
        }
        is_current
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use chrono::TimeZone;

    const MARGIN: Duration = Duration::from_secs(300);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn jwt_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#).as_bytes());
        format!("{header}.{payload}.sig")
    }

    fn response(json: serde_json::Value) -> TokenResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_empty_store_is_expiring() {
        let store = TokenStore::new();
        assert!(store.is_expiring(MARGIN, t0()));
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
    }

    #[test]
    fn test_token_without_expiry_is_expiring() {
        let store = TokenStore::new();
        store.set_token(SecretString::from("opaque"), None, None);
        assert!(store.is_expiring(Duration::ZERO, t0()));
    }

    #[test]
    fn test_margin_boundary() {
        let store = TokenStore::new();
        let expires_at = t0() + chrono::Duration::seconds(3600);
        store.set_token(SecretString::from("access"), None, Some(expires_at));

        // Not expiring strictly before E - M
        assert!(!store.is_expiring(MARGIN, t0()));
        assert!(!store.is_expiring(MARGIN, t0() + chrono::Duration::seconds(3299)));

        // Expiring from E - M onward
        assert!(store.is_expiring(MARGIN, t0() + chrono::Duration::seconds(3300)));
        assert!(store.is_expiring(MARGIN, t0() + chrono::Duration::seconds(3600)));
        assert!(store.is_expiring(MARGIN, t0() + chrono::Duration::seconds(7200)));
    }

    #[test]
    fn test_margin_boundary_holds_for_many_pairs() {
        let store = TokenStore::new();
        for expiry_secs in [0_i64, 1, 59, 300, 301, 3600, 86_400] {
            for margin_secs in [0_u64, 1, 60, 300, 3600] {
                let expires_at = t0() + chrono::Duration::seconds(expiry_secs);
                store.set_token(SecretString::from("a"), None, Some(expires_at));
                let margin = Duration::from_secs(margin_secs);
                #[allow(clippy::cast_possible_wrap)]
                let threshold = expires_at - chrono::Duration::seconds(margin_secs as i64);

                for offset in [-2_i64, -1, 0, 1, 2] {
                    let now = threshold + chrono::Duration::seconds(offset);
                    assert_eq!(
                        store.is_expiring(margin, now),
                        now >= threshold,
                        "expiry={expiry_secs} margin={margin_secs} offset={offset}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_huge_margin_is_expiring() {
        let store = TokenStore::new();
        store.set_token(
            SecretString::from("a"),
            None,
            Some(t0() + chrono::Duration::days(365)),
        );
        assert!(store.is_expiring(Duration::from_secs(u64::MAX), t0()));
    }

    #[test]
    fn test_set_replaces_all_fields() {
        let store = TokenStore::new();
        store.set_token(
            SecretString::from("first"),
            Some(SecretString::from("refresh-1")),
            Some(t0()),
        );
        store.set_token(SecretString::from("second"), None, None);

        assert_eq!(store.access_token().unwrap().expose_secret(), "second");
        assert!(store.refresh_token().is_none());
        assert!(store.expires_at().is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = TokenStore::new();
        store.clear();
        store.clear();
        assert!(store.access_token().is_none());

        store.set_token(SecretString::from("a"), Some(SecretString::from("r")), Some(t0()));
        store.clear();
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
        assert!(store.expires_at().is_none());
        store.clear();
    }

    #[test]
    fn test_clear_if_current() {
        let store = TokenStore::new();
        store.set_token(SecretString::from("newer"), None, Some(t0()));

        assert!(!store.clear_if_current(&SecretString::from("older")));
        assert_eq!(store.access_token().unwrap().expose_secret(), "newer");

        assert!(store.clear_if_current(&SecretString::from("newer")));
        assert!(store.access_token().is_none());
    }

    #[test]
    fn test_set_from_response_prefers_valid_till() {
        let store = TokenStore::new();
        let expires_at = store.set_from_response(response(serde_json::json!({
            "token": jwt_with_exp(1),
            "refreshToken": "refresh",
            "validTill": "2025-03-01T13:00:00Z"
        })));

        assert_eq!(expires_at, Some(t0() + chrono::Duration::hours(1)));
        assert_eq!(store.refresh_token().unwrap().expose_secret(), "refresh");
    }

    #[test]
    fn test_set_from_response_falls_back_to_exp_claim() {
        let store = TokenStore::new();
        let exp = t0().timestamp() + 600;
        let expires_at = store.set_from_response(response(serde_json::json!({
            "token": jwt_with_exp(exp)
        })));

        assert_eq!(expires_at, DateTime::from_timestamp(exp, 0));
        assert!(!store.is_expiring(Duration::from_secs(60), t0()));
    }

    #[test]
    fn test_set_from_response_with_garbage_valid_till_uses_claim() {
        let store = TokenStore::new();
        let exp = t0().timestamp() + 600;
        let expires_at = store.set_from_response(response(serde_json::json!({
            "token": jwt_with_exp(exp),
            "validTill": "next tuesday"
        })));
        assert_eq!(expires_at, DateTime::from_timestamp(exp, 0));
    }

    #[test]
    fn test_set_from_response_opaque_token_has_no_expiry() {
        let store = TokenStore::new();
        let expires_at = store.set_from_response(response(serde_json::json!({
            "token": "opaque-session-token"
        })));

        assert!(expires_at.is_none());
        assert!(store.access_token().is_some());
        assert!(store.is_expiring(Duration::ZERO, t0()));
    }

    #[test]
    fn test_parse_valid_till_formats() {
        assert_eq!(parse_valid_till("2025-03-01T12:00:00Z"), Some(t0()));
        assert_eq!(parse_valid_till("2025-03-01T13:00:00+01:00"), Some(t0()));
        assert_eq!(parse_valid_till("2025-03-01T12:00:00"), Some(t0()));
        assert_eq!(
            parse_valid_till("2025-03-01T12:00:00.500"),
            Some(t0() + chrono::Duration::milliseconds(500))
        );
        assert!(parse_valid_till("").is_none());
        assert!(parse_valid_till("01.03.2025").is_none());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let store = TokenStore::new();
        store.set_token(
            SecretString::from("access-secret"),
            Some(SecretString::from("refresh-secret")),
            None,
        );
        let debug_str = format!("{store:?}");
        assert!(!debug_str.contains("access-secret"));
        assert!(!debug_str.contains("refresh-secret"));
        assert!(debug_str.contains("has_access_token: true"));

        let response = response(serde_json::json!({
            "token": "access-secret",
            "refreshToken": "refresh-secret"
        }));
        let debug_str = format!("{response:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("access-secret"));
        assert!(!debug_str.contains("refresh-secret"));
    }
}
