//! BIM Portal client configuration.
//!
//! Configuration is loaded from environment variables. The password is
//! redacted in Debug output.

use crate::auth::AuthConfig;
use crate::executor::ExecutorConfig;
use crate::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Default portal base URL.
pub const DEFAULT_BASE_URL: &str = "https://via.bund.de/bim";

/// Login endpoint path.
pub const LOGIN_PATH: &str = "/infrastruktur/api/v1/public/auth/login";

/// Default refresh endpoint path. Some deployments serve `/refresh` instead.
pub const REFRESH_PATH: &str = "/infrastruktur/api/v1/public/auth/refresh-token";

/// Logout endpoint path.
pub const LOGOUT_PATH: &str = "/infrastruktur/api/v1/public/auth/logout";

/// Default window before expiry in which a token counts as expiring.
pub const DEFAULT_TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of re-authentication retries after a 401/403.
pub const DEFAULT_AUTH_RETRY_LIMIT: u32 = 1;

/// Upper bound for `AUTH_RETRY_LIMIT`.
pub const MAX_AUTH_RETRY_LIMIT: u32 = 10;

/// Default directory for exported artifacts.
pub const DEFAULT_EXPORT_DIRECTORY: &str = "exports";

/// Portal login credentials.
#[derive(Clone)]
pub struct Credentials {
    /// Account e-mail, sent as `mail`.
    pub mail: String,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(mail: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            mail: mail.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("mail", &self.mail)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Portal base URL, without trailing slash.
    pub base_url: String,

    /// Login credentials; `None` means anonymous access.
    pub credentials: Option<Credentials>,

    /// Refresh endpoint path.
    pub refresh_path: String,

    /// Token refresh margin (from `TOKEN_REFRESH_MARGIN_MINUTES`).
    pub token_refresh_margin: Duration,

    /// Re-authentication retries after a 401/403.
    pub auth_retry_limit: u32,

    /// HTTP request timeout (from `REQUEST_TIMEOUT`, seconds).
    pub request_timeout: Duration,

    /// Turn non-2xx responses into `ClientError::UnexpectedStatus`.
    pub raise_on_unexpected_status: bool,

    /// Where `ExportWriter` puts files.
    pub export_directory: PathBuf,

    /// Project exported by the health check (from `BIM_PORTAL_EXPORT_GUID`).
    pub export_guid: Option<Uuid>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid base URL configuration: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid token refresh margin configuration: {0}")]
    InvalidRefreshMargin(String),

    #[error("Invalid auth retry limit configuration: {0}")]
    InvalidRetryLimit(String),

    #[error("Invalid request timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid boolean flag: {0}")]
    InvalidFlag(String),

    #[error("Invalid export GUID configuration: {0}")]
    InvalidExportGuid(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let base_url = vars
            .get("BIM_PORTAL_BASE_URL")
            .map_or(DEFAULT_BASE_URL, String::as_str)
            .trim_end_matches('/')
            .to_string();

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(format!(
                "BIM_PORTAL_BASE_URL must start with http:// or https://, got '{base_url}'"
            )));
        }

        let username = vars
            .get("BIM_PORTAL_USERNAME")
            .filter(|v| !v.trim().is_empty());
        let password = vars
            .get("BIM_PORTAL_PASSWORD")
            .filter(|v| !v.is_empty());

        let credentials = match (username, password) {
            (Some(mail), Some(password)) => Some(Credentials::new(mail.trim(), password.as_str())),
            (None, None) => None,
            _ => {
                warn!(
                    target: "bim.config",
                    "Only one of BIM_PORTAL_USERNAME/BIM_PORTAL_PASSWORD is set, using public access"
                );
                None
            }
        };

        let refresh_path = vars
            .get("BIM_PORTAL_REFRESH_PATH")
            .cloned()
            .unwrap_or_else(|| REFRESH_PATH.to_string());

        let token_refresh_margin = if let Some(value_str) = vars.get("TOKEN_REFRESH_MARGIN_MINUTES")
        {
            let minutes: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRefreshMargin(format!(
                    "TOKEN_REFRESH_MARGIN_MINUTES must be a non-negative integer, got '{value_str}': {e}"
                ))
            })?;
            Duration::from_secs(minutes.saturating_mul(60))
        } else {
            DEFAULT_TOKEN_REFRESH_MARGIN
        };

        let auth_retry_limit = if let Some(value_str) = vars.get("AUTH_RETRY_LIMIT") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRetryLimit(format!(
                    "AUTH_RETRY_LIMIT must be a non-negative integer, got '{value_str}': {e}"
                ))
            })?;

            if value > MAX_AUTH_RETRY_LIMIT {
                return Err(ConfigError::InvalidRetryLimit(format!(
                    "AUTH_RETRY_LIMIT must not exceed {MAX_AUTH_RETRY_LIMIT}, got {value}"
                )));
            }

            value
        } else {
            DEFAULT_AUTH_RETRY_LIMIT
        };

        let request_timeout = if let Some(value_str) = vars.get("REQUEST_TIMEOUT") {
            let seconds: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidTimeout(format!(
                    "REQUEST_TIMEOUT must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if seconds == 0 {
                return Err(ConfigError::InvalidTimeout(
                    "REQUEST_TIMEOUT must be at least 1 second".to_string(),
                ));
            }

            Duration::from_secs(seconds)
        } else {
            DEFAULT_REQUEST_TIMEOUT
        };

        let raise_on_unexpected_status = match vars.get("RAISE_ON_UNEXPECTED_STATUS") {
            Some(value) => parse_flag("RAISE_ON_UNEXPECTED_STATUS", value)?,
            None => false,
        };

        let export_directory = vars
            .get("EXPORT_DIRECTORY")
            .filter(|v| !v.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIRECTORY), PathBuf::from);

        let export_guid = match vars
            .get("BIM_PORTAL_EXPORT_GUID")
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
        {
            Some(value_str) => Some(Uuid::parse_str(value_str).map_err(|e| {
                ConfigError::InvalidExportGuid(format!(
                    "BIM_PORTAL_EXPORT_GUID must be a valid UUID, got '{value_str}': {e}"
                ))
            })?),
            None => None,
        };

        Ok(Config {
            base_url,
            credentials,
            refresh_path,
            token_refresh_margin,
            auth_retry_limit,
            request_timeout,
            raise_on_unexpected_status,
            export_directory,
            export_guid,
        })
    }

    /// Copy of this configuration without credentials, for public endpoints
    /// that must not depend on a working login.
    #[must_use]
    pub fn anonymous(&self) -> Self {
        Self {
            credentials: None,
            ..self.clone()
        }
    }

    /// Authenticator settings derived from this configuration.
    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        let config = AuthConfig::new(self.base_url.clone())
            .with_refresh_path(self.refresh_path.clone())
            .with_token_refresh_margin(self.token_refresh_margin)
            .with_http_timeout(self.request_timeout);

        match &self.credentials {
            Some(credentials) => config.with_credentials(credentials.clone()),
            None => config,
        }
    }

    /// Executor settings derived from this configuration.
    #[must_use]
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            base_url: self.base_url.clone(),
            auth_retry_limit: self.auth_retry_limit,
            raise_on_unexpected_status: self.raise_on_unexpected_status,
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidFlag(format!(
            "{name} must be true or false, got '{other}'"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::secret::ExposeSecret;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.credentials.is_none());
        assert_eq!(config.refresh_path, REFRESH_PATH);
        assert_eq!(config.token_refresh_margin, DEFAULT_TOKEN_REFRESH_MARGIN);
        assert_eq!(config.auth_retry_limit, DEFAULT_AUTH_RETRY_LIMIT);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(!config.raise_on_unexpected_status);
        assert_eq!(config.export_directory, PathBuf::from("exports"));
        assert!(config.export_guid.is_none());
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let config = Config::from_vars(&vars(&[
            ("BIM_PORTAL_BASE_URL", "http://localhost:8080/bim/"),
            ("BIM_PORTAL_USERNAME", "planer@example.org"),
            ("BIM_PORTAL_PASSWORD", "geheim"),
            ("BIM_PORTAL_REFRESH_PATH", "/infrastruktur/api/v1/public/auth/refresh"),
            ("TOKEN_REFRESH_MARGIN_MINUTES", "2"),
            ("AUTH_RETRY_LIMIT", "3"),
            ("REQUEST_TIMEOUT", "10"),
            ("RAISE_ON_UNEXPECTED_STATUS", "true"),
            ("EXPORT_DIRECTORY", "/tmp/bim-exports"),
        ]))
        .expect("Config should load successfully");

        assert_eq!(config.base_url, "http://localhost:8080/bim");
        let credentials = config.credentials.as_ref().unwrap();
        assert_eq!(credentials.mail, "planer@example.org");
        assert_eq!(credentials.password.expose_secret(), "geheim");
        assert_eq!(config.refresh_path, "/infrastruktur/api/v1/public/auth/refresh");
        assert_eq!(config.token_refresh_margin, Duration::from_secs(120));
        assert_eq!(config.auth_retry_limit, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(config.raise_on_unexpected_status);
        assert_eq!(config.export_directory, PathBuf::from("/tmp/bim-exports"));
    }

    #[test]
    fn test_partial_credentials_fall_back_to_anonymous() {
        let config = Config::from_vars(&vars(&[("BIM_PORTAL_USERNAME", "planer@example.org")]))
            .unwrap();
        assert!(config.credentials.is_none());

        let config = Config::from_vars(&vars(&[("BIM_PORTAL_PASSWORD", "geheim")])).unwrap();
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_base_url_rejects_non_http() {
        let result = Config::from_vars(&vars(&[("BIM_PORTAL_BASE_URL", "ftp://via.bund.de")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidBaseUrl(msg)) if msg.contains("must start with http"))
        );
    }

    #[test]
    fn test_retry_limit_bounds() {
        let config = Config::from_vars(&vars(&[("AUTH_RETRY_LIMIT", "0")])).unwrap();
        assert_eq!(config.auth_retry_limit, 0);

        let config = Config::from_vars(&vars(&[("AUTH_RETRY_LIMIT", "10")])).unwrap();
        assert_eq!(config.auth_retry_limit, 10);

        let result = Config::from_vars(&vars(&[("AUTH_RETRY_LIMIT", "11")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidRetryLimit(msg)) if msg.contains("must not exceed 10"))
        );

        let result = Config::from_vars(&vars(&[("AUTH_RETRY_LIMIT", "-1")]));
        assert!(matches!(result, Err(ConfigError::InvalidRetryLimit(_))));
    }

    #[test]
    fn test_request_timeout_rejects_zero() {
        let result = Config::from_vars(&vars(&[("REQUEST_TIMEOUT", "0")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidTimeout(msg)) if msg.contains("at least 1 second"))
        );
    }

    #[test]
    fn test_request_timeout_rejects_non_numeric() {
        let result = Config::from_vars(&vars(&[("REQUEST_TIMEOUT", "thirty")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidTimeout(msg)) if msg.contains("must be a valid positive integer"))
        );
    }

    #[test]
    fn test_refresh_margin_rejects_non_numeric() {
        let result = Config::from_vars(&vars(&[("TOKEN_REFRESH_MARGIN_MINUTES", "5m")]));
        assert!(matches!(result, Err(ConfigError::InvalidRefreshMargin(_))));
    }

    #[test]
    fn test_raise_flag_parsing() {
        for (raw, expected) in [("1", true), ("TRUE", true), ("no", false), ("0", false)] {
            let config =
                Config::from_vars(&vars(&[("RAISE_ON_UNEXPECTED_STATUS", raw)])).unwrap();
            assert_eq!(config.raise_on_unexpected_status, expected, "input {raw}");
        }

        let result = Config::from_vars(&vars(&[("RAISE_ON_UNEXPECTED_STATUS", "maybe")]));
        assert!(matches!(result, Err(ConfigError::InvalidFlag(_))));
    }

    #[test]
    fn test_export_guid_parsing() {
        let config = Config::from_vars(&vars(&[(
            "BIM_PORTAL_EXPORT_GUID",
            " 4f2b6a2e-1c3d-4e5f-8a9b-0c1d2e3f4a5b ",
        )]))
        .unwrap();
        assert_eq!(
            config.export_guid.unwrap().to_string(),
            "4f2b6a2e-1c3d-4e5f-8a9b-0c1d2e3f4a5b"
        );

        let config = Config::from_vars(&vars(&[("BIM_PORTAL_EXPORT_GUID", "")])).unwrap();
        assert!(config.export_guid.is_none());

        let result = Config::from_vars(&vars(&[("BIM_PORTAL_EXPORT_GUID", "project-1")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidExportGuid(msg)) if msg.contains("must be a valid UUID"))
        );
    }

    #[test]
    fn test_anonymous_drops_only_credentials() {
        let config = Config::from_vars(&vars(&[
            ("BIM_PORTAL_BASE_URL", "http://localhost:9000"),
            ("BIM_PORTAL_USERNAME", "planer@example.org"),
            ("BIM_PORTAL_PASSWORD", "geheim"),
            ("AUTH_RETRY_LIMIT", "4"),
        ]))
        .unwrap();

        let anonymous = config.anonymous();
        assert!(anonymous.credentials.is_none());
        assert!(anonymous.auth_config().credentials.is_none());
        assert_eq!(anonymous.base_url, config.base_url);
        assert_eq!(anonymous.auth_retry_limit, 4);
        assert!(config.credentials.is_some());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = Config::from_vars(&vars(&[
            ("BIM_PORTAL_USERNAME", "planer@example.org"),
            ("BIM_PORTAL_PASSWORD", "super-secret-password"),
        ]))
        .unwrap();

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("super-secret-password"));
        assert!(debug_str.contains("[REDACTED]"));
        assert!(debug_str.contains("planer@example.org"));
    }

    #[test]
    fn test_derived_configs() {
        let config = Config::from_vars(&vars(&[
            ("BIM_PORTAL_BASE_URL", "http://localhost:9000"),
            ("BIM_PORTAL_USERNAME", "planer@example.org"),
            ("BIM_PORTAL_PASSWORD", "geheim"),
            ("AUTH_RETRY_LIMIT", "2"),
            ("REQUEST_TIMEOUT", "7"),
        ]))
        .unwrap();

        let auth = config.auth_config();
        assert_eq!(auth.base_url, "http://localhost:9000");
        assert!(auth.credentials.is_some());
        assert_eq!(auth.http_timeout, Duration::from_secs(7));

        let executor = config.executor_config();
        assert_eq!(executor.base_url, "http://localhost:9000");
        assert_eq!(executor.auth_retry_limit, 2);
        assert!(!executor.raise_on_unexpected_status);
    }
}
