//! HTTP transport seam.
//!
//! [`AuthenticatedRequestExecutor`](crate::executor::AuthenticatedRequestExecutor)
//! talks to the network only through [`HttpTransport`], so its retry policy
//! can be driven by a scripted transport in tests. [`ReqwestTransport`] is the
//! production implementation.

use crate::error::ClientError;
use crate::secret::{ExposeSecret, SecretString};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default connection timeout for the HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP methods used by the portal API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// One outgoing request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Bearer token, attached as `Authorization: Bearer <token>` when present.
    pub bearer: Option<SecretString>,
    /// JSON body.
    pub body: Option<serde_json::Value>,
}

/// A complete response: status, headers and raw body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl ApiResponse {
    /// 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 401 or 403: the token was rejected.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        self.status == 401 || self.status == 403
    }

    /// Body as lossy UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Header value by (case-insensitive) name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Decode` if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// Transport-level failures. Never carries a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request timed out.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Any other failure while sending or reading the response.
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connection(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Sends a single request. Implementations must not retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| ClientError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        let mut builder = builder
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            debug!(target: "bim.transport", error = %e, url = %request.url, "HTTP request failed");
            TransportError::from(e)
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(TransportError::from)?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse {
            status,
            headers: HashMap::from([("content-type".to_string(), "application/json".to_string())]),
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn test_status_helpers() {
        assert!(response(200, "").is_success());
        assert!(response(204, "").is_success());
        assert!(!response(302, "").is_success());
        assert!(response(401, "").is_auth_rejection());
        assert!(response(403, "").is_auth_rejection());
        assert!(!response(404, "").is_auth_rejection());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = response(200, "");
        assert_eq!(resp.header("Content-Type"), Some("application/json"));
        assert_eq!(resp.header("x-missing"), None);
    }

    #[test]
    fn test_json_decode_error() {
        let resp = response(200, "not json");
        let result: Result<serde_json::Value, _> = resp.json();
        assert!(matches!(result, Err(ClientError::Decode(_))));
    }

    #[test]
    fn test_request_debug_redacts_bearer() {
        let request = ApiRequest {
            method: HttpMethod::Get,
            url: "https://portal.example/x".to_string(),
            bearer: Some(SecretString::from("bearer-secret")),
            body: None,
        };
        assert!(!format!("{request:?}").contains("bearer-secret"));
    }

    #[tokio::test]
    async fn test_reqwest_transport_sends_headers_and_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/aia/api/v1/public/loin"))
            .and(header("authorization", "Bearer tok-1"))
            .and(header("accept", "application/json"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({"searchString": "Wand"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let resp = transport
            .send(ApiRequest {
                method: HttpMethod::Post,
                url: format!("{}/aia/api/v1/public/loin", mock_server.uri()),
                bearer: Some(SecretString::from("tok-1")),
                body: Some(serde_json::json!({"searchString": "Wand"})),
            })
            .await
            .unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.text(), "[]");
    }

    #[tokio::test]
    async fn test_reqwest_transport_connection_error() {
        let transport = ReqwestTransport::new(Duration::from_secs(2)).unwrap();
        // Port 9 (discard) on localhost is not expected to be listening
        let result = transport
            .send(ApiRequest {
                method: HttpMethod::Get,
                url: "http://127.0.0.1:9/health".to_string(),
                bearer: None,
                body: None,
            })
            .await;

        assert!(result.is_err());
    }
}
