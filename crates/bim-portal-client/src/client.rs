//! Per-endpoint API over the authenticated executor.
//!
//! Result conventions follow the portal's public endpoints:
//!
//! | Operation | Non-2xx response |
//! |-----------|------------------|
//! | search / list | empty `Vec` |
//! | get by guid | `None` |
//! | export | `None` (anything but 200) |
//!
//! With `raise_on_unexpected_status` the executor turns status >= 400 into
//! an error before these conventions apply.

use crate::auth::Authenticator;
use crate::config::Config;
use crate::error::ClientError;
use crate::executor::AuthenticatedRequestExecutor;
use crate::models::{AiaRecord, AiaResource, ExportFormat, FilterGroup, Organisation, PropertyOrGroup};
use crate::transport::ApiResponse;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const ORGANISATION_PATH: &str = "/infrastruktur/api/v1/public/organisation";
const MY_ORGANISATION_PATH: &str = "/infrastruktur/api/v1/public/organisation/my";
const PROPERTY_PATH: &str = "/merkmale/api/v1/public/property";
const PROPERTY_GROUP_PATH: &str = "/merkmale/api/v1/public/propertygroup";
const PROPERTY_FILTER_PATH: &str = "/merkmale/api/v1/public/filter";
const AIA_FILTER_PATH: &str = "/aia/api/v1/public/filter";

/// Client for the BIM Portal resource endpoints.
#[derive(Debug, Clone)]
pub struct ResourceClient {
    executor: Arc<AuthenticatedRequestExecutor>,
}

impl ResourceClient {
    #[must_use]
    pub fn new(executor: Arc<AuthenticatedRequestExecutor>) -> Self {
        Self { executor }
    }

    /// Wire authenticator, executor and reqwest transport from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Auth` or `ClientError::Configuration` if an HTTP
    /// client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let authenticator = Arc::new(Authenticator::new(config.auth_config())?);
        let executor = AuthenticatedRequestExecutor::with_reqwest(
            config.executor_config(),
            authenticator,
            config.request_timeout,
        )?;
        Ok(Self::new(Arc::new(executor)))
    }

    #[must_use]
    pub fn executor(&self) -> &Arc<AuthenticatedRequestExecutor> {
        &self.executor
    }

    #[must_use]
    pub fn authenticator(&self) -> &Arc<Authenticator> {
        self.executor.authenticator()
    }

    // -------------------------------------------------------------------------
    // Generic helpers
    // -------------------------------------------------------------------------

    /// POST a search body and decode a list of records.
    ///
    /// # Errors
    ///
    /// Executor errors, or `ClientError::Decode` for an unexpected payload.
    pub async fn search<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Vec<T>, ClientError> {
        let response = self.executor.post(path, body).await?;
        decode_list(path, &response)
    }

    /// GET a list of records.
    ///
    /// # Errors
    ///
    /// Executor errors, or `ClientError::Decode` for an unexpected payload.
    pub async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ClientError> {
        let response = self.executor.get(path).await?;
        decode_list(path, &response)
    }

    /// GET a single record; `None` when the portal does not return one.
    ///
    /// # Errors
    ///
    /// Executor errors, or `ClientError::Decode` for an unexpected payload.
    pub async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ClientError> {
        let response = self.executor.get(path).await?;
        if !response.is_success() {
            debug!(target: "bim.client", path = %path, status = response.status, "Record not available");
            return Ok(None);
        }
        response.json().map(Some)
    }

    /// GET raw bytes; `None` unless the status is 200.
    ///
    /// # Errors
    ///
    /// Executor errors.
    pub async fn fetch_bytes(&self, path: &str) -> Result<Option<Bytes>, ClientError> {
        let response = self.executor.get(path).await?;
        if response.status != 200 {
            warn!(target: "bim.client", path = %path, status = response.status, "Download failed");
            return Ok(None);
        }
        Ok(Some(response.body))
    }

    // -------------------------------------------------------------------------
    // Organisations
    // -------------------------------------------------------------------------

    /// All organisations visible through the public API.
    ///
    /// # Errors
    ///
    /// See [`list`](Self::list).
    pub async fn organisations(&self) -> Result<Vec<Organisation>, ClientError> {
        self.list(ORGANISATION_PATH).await
    }

    /// Organisations the logged-in user belongs to.
    ///
    /// # Errors
    ///
    /// See [`list`](Self::list).
    pub async fn my_organisations(&self) -> Result<Vec<Organisation>, ClientError> {
        self.list(MY_ORGANISATION_PATH).await
    }

    // -------------------------------------------------------------------------
    // Properties (Merkmale)
    // -------------------------------------------------------------------------

    /// Search properties. Without a request body the portal is asked for
    /// `{"searchString": "a"}`, since it rejects an empty property search.
    ///
    /// # Errors
    ///
    /// See [`search`](Self::search).
    pub async fn search_properties(
        &self,
        request: Option<&serde_json::Value>,
    ) -> Result<Vec<PropertyOrGroup>, ClientError> {
        let default_body = serde_json::json!({"searchString": "a"});
        self.search(PROPERTY_PATH, request.unwrap_or(&default_body))
            .await
    }

    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn property(&self, guid: Uuid) -> Result<Option<PropertyOrGroup>, ClientError> {
        self.fetch(&format!("{PROPERTY_PATH}/{guid}")).await
    }

    /// # Errors
    ///
    /// See [`search`](Self::search).
    pub async fn search_property_groups(
        &self,
        request: Option<&serde_json::Value>,
    ) -> Result<Vec<PropertyOrGroup>, ClientError> {
        let default_body = serde_json::json!({});
        self.search(PROPERTY_GROUP_PATH, request.unwrap_or(&default_body))
            .await
    }

    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn property_group(&self, guid: Uuid) -> Result<Option<PropertyOrGroup>, ClientError> {
        self.fetch(&format!("{PROPERTY_GROUP_PATH}/{guid}")).await
    }

    /// # Errors
    ///
    /// See [`list`](Self::list).
    pub async fn property_filters(&self) -> Result<Vec<FilterGroup>, ClientError> {
        self.list(PROPERTY_FILTER_PATH).await
    }

    // -------------------------------------------------------------------------
    // AIA resources
    // -------------------------------------------------------------------------

    /// Search one AIA resource kind; `None` sends an empty filter.
    ///
    /// # Errors
    ///
    /// See [`search`](Self::search).
    #[instrument(skip_all, fields(kind = %kind))]
    pub async fn search_aia(
        &self,
        kind: AiaResource,
        request: Option<&serde_json::Value>,
    ) -> Result<Vec<AiaRecord>, ClientError> {
        let default_body = serde_json::json!({});
        self.search(&kind.collection_path(), request.unwrap_or(&default_body))
            .await
    }

    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn aia(&self, kind: AiaResource, guid: Uuid) -> Result<Option<AiaRecord>, ClientError> {
        self.fetch(&format!("{}/{guid}", kind.collection_path()))
            .await
    }

    /// Download an export of one AIA record.
    ///
    /// # Errors
    ///
    /// `ClientError::Configuration` if `kind` does not offer `format` (no
    /// request is sent), otherwise see [`fetch_bytes`](Self::fetch_bytes).
    #[instrument(skip_all, fields(kind = %kind, format = %format, guid = %guid))]
    pub async fn export(
        &self,
        kind: AiaResource,
        guid: Uuid,
        format: ExportFormat,
    ) -> Result<Option<Bytes>, ClientError> {
        if !kind.supports(format) {
            return Err(ClientError::Configuration(format!(
                "{kind} does not support export format {format}"
            )));
        }
        self.fetch_bytes(&format!("{}/{guid}/{format}", kind.collection_path()))
            .await
    }

    /// # Errors
    ///
    /// See [`list`](Self::list).
    pub async fn aia_filters(&self) -> Result<Vec<FilterGroup>, ClientError> {
        self.list(AIA_FILTER_PATH).await
    }
}

fn decode_list<T: DeserializeOwned>(path: &str, response: &ApiResponse) -> Result<Vec<T>, ClientError> {
    if !response.is_success() {
        warn!(target: "bim.client", path = %path, status = response.status, "Listing failed, returning no results");
        return Ok(Vec::new());
    }
    if response.body.is_empty() {
        return Ok(Vec::new());
    }
    response.json()
}
