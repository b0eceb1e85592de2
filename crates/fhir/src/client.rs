//! FHIR client adapter.
//!
//! The sandbox talks to a remote FHIR server through two small capabilities:
//! - [`FhirConnector`] builds a client for a session context (`{patient, baseUrl}`)
//! - [`FhirClient`] performs `search` and `read` interactions and resolves to JSON
//!
//! Consumers only depend on the traits, so tests and alternative transports can substitute
//! their own implementation. [`HttpConnector`] / [`HttpFhirClient`] are the production
//! implementation over `reqwest`.

use crate::{Bundle, FhirError, FhirResult};
use async_trait::async_trait;
use cds_types::PatientId;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client timeout for FHIR requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const FHIR_JSON: &str = "application/fhir+json";

/// The `{patient, baseUrl}` pair a client is constructed from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FhirContext {
    patient: PatientId,
    base_url: Url,
}

impl FhirContext {
    /// Validates a patient id and FHIR base URL.
    ///
    /// The base URL must be absolute and use `http` or `https`. A trailing slash is ignored.
    pub fn new(patient: &str, base_url: &str) -> FhirResult<Self> {
        let patient = PatientId::new(patient)
            .map_err(|e| FhirError::InvalidInput(format!("patient: {e}")))?;

        let trimmed = base_url.trim().trim_end_matches('/');
        let base_url = Url::parse(trimmed)
            .map_err(|e| FhirError::InvalidUrl(format!("'{}': {}", trimmed, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(FhirError::InvalidUrl(format!(
                "URL must use http or https scheme, got: {}",
                base_url.scheme()
            )));
        }
        if base_url.cannot_be_a_base() {
            return Err(FhirError::InvalidUrl(format!("'{}' cannot be a base", trimmed)));
        }

        Ok(Self { patient, base_url })
    }

    pub fn patient(&self) -> &PatientId {
        &self.patient
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// A FHIR type-level search: `GET [base]/[type]?[params]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchQuery {
    pub resource_type: String,
    pub params: Vec<(String, String)>,
}

impl SearchQuery {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// `Condition?patient=<id>`, the search the sandbox issues for every context.
    pub fn conditions_for(patient: &PatientId) -> Self {
        Self::new("Condition").param("patient", patient.as_str())
    }
}

/// Async FHIR interactions used by the sandbox.
#[async_trait]
pub trait FhirClient: Send + Sync {
    /// Type-level search; resolves to the searchset bundle.
    async fn search(&self, query: &SearchQuery) -> FhirResult<Bundle>;

    /// Instance read; resolves to the resource JSON as sent by the server.
    async fn read(&self, resource_type: &str, id: &str) -> FhirResult<serde_json::Value>;
}

/// Builds a [`FhirClient`] for a session context.
pub trait FhirConnector: Send + Sync {
    fn connect(&self, context: &FhirContext) -> FhirResult<Arc<dyn FhirClient>>;
}

/// Connector producing [`HttpFhirClient`]s that share one connection pool.
#[derive(Clone, Debug)]
pub struct HttpConnector {
    http_client: reqwest::Client,
}

impl HttpConnector {
    pub fn new() -> FhirResult<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http_client })
    }
}

impl FhirConnector for HttpConnector {
    fn connect(&self, context: &FhirContext) -> FhirResult<Arc<dyn FhirClient>> {
        Ok(Arc::new(HttpFhirClient {
            http_client: self.http_client.clone(),
            base_url: context.base_url().clone(),
        }))
    }
}

/// FHIR REST client over HTTP.
#[derive(Clone, Debug)]
pub struct HttpFhirClient {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpFhirClient {
    /// `base_url` with `segments` appended to its path.
    fn endpoint(&self, segments: &[&str]) -> FhirResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FhirError::InvalidUrl(format!("'{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> FhirResult<serde_json::Value> {
        debug!("GET {}", url);
        let response = self
            .http_client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, FHIR_JSON)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FhirError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl FhirClient for HttpFhirClient {
    async fn search(&self, query: &SearchQuery) -> FhirResult<Bundle> {
        let mut url = self.endpoint(&[query.resource_type.as_str()])?;
        if !query.params.is_empty() {
            url.query_pairs_mut().extend_pairs(query.params.iter());
        }
        Bundle::from_json(self.get_json(url).await?)
    }

    async fn read(&self, resource_type: &str, id: &str) -> FhirResult<serde_json::Value> {
        let url = self.endpoint(&[resource_type, id])?;
        self.get_json(url).await
    }
}
