//! Registry REST client.
//!
//! Thin wrapper over the document endpoints of one collection, with:
//! - HTTP client tuning (pooling, timeouts)
//! - Observability (tracing spans, metrics)
//!
//! No retries: a failed call is reported to the caller as-is.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, info_span, Instrument};

use crate::error::{RegistryError, RegistryResult};
use crate::metrics::record_request;
use crate::types::{Document, DocumentList, Query, UpdateRequest};

// =============================================================================
// Configuration
// =============================================================================

/// Registry client configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// API endpoint, e.g. `https://cloud.appwrite.io/v1`
    pub endpoint: String,
    pub project_id: String,
    pub api_key: String,
    pub database_id: String,
    pub collection_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

fn required_env(name: &str) -> RegistryResult<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RegistryError::config(format!("{name} must be set to access the job registry")))
}

impl RegistryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> RegistryResult<Self> {
        let timeout_secs: u64 = std::env::var("REGISTRY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let connect_timeout_secs: u64 = std::env::var("REGISTRY_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            endpoint: required_env("APPWRITE_ENDPOINT")?,
            project_id: required_env("APPWRITE_PROJECT_ID")?,
            api_key: required_env("APPWRITE_API_KEY")?,
            database_id: required_env("DATABASE_ID")?,
            collection_id: required_env("COLLECTION_ID")?,
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        })
    }
}

// =============================================================================
// Client
// =============================================================================

/// Document client bound to one collection.
#[derive(Clone)]
pub struct RegistryClient {
    http: Client,
    config: RegistryConfig,
    base_url: String,
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RegistryClient {
    /// Create a new registry client.
    pub fn new(config: RegistryConfig) -> RegistryResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "X-Appwrite-Project",
            HeaderValue::from_str(&config.project_id)
                .map_err(|_| RegistryError::config("APPWRITE_PROJECT_ID is not a valid header value"))?,
        );
        let mut key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| RegistryError::config("APPWRITE_API_KEY is not a valid header value"))?;
        key.set_sensitive(true);
        headers.insert("X-Appwrite-Key", key);

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .default_headers(headers)
            .user_agent(concat!("vcomp-registry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RegistryError::Network)?;

        let base_url = format!(
            "{}/databases/{}/collections/{}/documents",
            config.endpoint.trim_end_matches('/'),
            urlencoding::encode(&config.database_id),
            urlencoding::encode(&config.collection_id)
        );

        Ok(Self {
            http,
            config,
            base_url,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> RegistryResult<Self> {
        Self::new(RegistryConfig::from_env()?)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn document_url(&self, doc_id: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(doc_id))
    }

    // =========================================================================
    // Document operations
    // =========================================================================

    /// List documents matching `queries`.
    pub async fn list_documents(&self, queries: &[Query]) -> RegistryResult<DocumentList> {
        let params: Vec<(&str, &str)> = queries.iter().map(|q| ("queries[]", q.as_str())).collect();

        self.execute_request("list_documents", None, async {
            let response = self.http.get(&self.base_url).query(&params).send().await?;
            let status = response.status();

            if status.is_success() {
                Ok(response.json::<DocumentList>().await?)
            } else {
                Err(Self::handle_error_response(status, &self.base_url, response).await)
            }
        })
        .await
    }

    /// Get a document; `None` if it does not exist.
    pub async fn get_document(&self, doc_id: &str) -> RegistryResult<Option<Document>> {
        let url = self.document_url(doc_id);

        self.execute_request("get_document", Some(doc_id), async {
            let response = self.http.get(&url).send().await?;
            let status = response.status();

            match status {
                StatusCode::OK => Ok(Some(response.json::<Document>().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                _ => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Update a subset of a document's fields.
    pub async fn update_document(&self, doc_id: &str, data: &Map<String, Value>) -> RegistryResult<Document> {
        let url = self.document_url(doc_id);
        let body = UpdateRequest { data };

        self.execute_request("update_document", Some(doc_id), async {
            let response = self.http.patch(&url).json(&body).send().await?;
            let status = response.status();

            if status.is_success() {
                Ok(response.json::<Document>().await?)
            } else {
                Err(Self::handle_error_response(status, &url, response).await)
            }
        })
        .await
    }

    /// Cheap connectivity check: list a single document.
    pub async fn ping(&self) -> RegistryResult<()> {
        self.list_documents(&[Query::limit(1)]).await.map(|_| ())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn execute_request<T, F>(&self, operation: &str, doc_id: Option<&str>, fut: F) -> RegistryResult<T>
    where
        F: std::future::Future<Output = RegistryResult<T>>,
    {
        let span = if let Some(id) = doc_id {
            info_span!("registry_request", operation = %operation, collection = %self.config.collection_id, doc_id = %id)
        } else {
            info_span!("registry_request", operation = %operation, collection = %self.config.collection_id)
        };

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(0),
        };
        record_request(operation, status, latency_ms);
        debug!(operation, status, latency_ms, "Registry request finished");

        result
    }

    async fn handle_error_response(status: StatusCode, url: &str, response: reqwest::Response) -> RegistryError {
        let body = response.text().await.unwrap_or_default();
        RegistryError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}
