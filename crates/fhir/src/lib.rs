//! FHIR boundary support for the CDS sandbox.
//!
//! This crate provides:
//! - **wire models** for the few resources the sandbox reads (`Bundle`, `Condition`, `Patient`)
//! - the **client adapter**: an async [`FhirClient`] capability with `search` and `read`,
//!   built for a session by a [`FhirConnector`]
//! - an HTTP implementation of both over `reqwest`
//!
//! Resources are kept as close to the server's JSON as is practical. Unknown fields are
//! retained (flattened into `extra`) so that a resource handed back to a caller is the one the
//! server sent.

pub mod bundle;
pub mod client;
pub mod condition;
pub mod patient;

// Re-export facades
pub use client::{FhirClient, FhirConnector, FhirContext, HttpConnector, HttpFhirClient, SearchQuery};
pub use patient::Patient;

// Re-export public domain-level types
pub use bundle::{Bundle, BundleEntry};
pub use condition::{CodeableConcept, Coding, Condition};
pub use patient::{NameUse, PatientData};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid FHIR base URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("FHIR server returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("translation error: {0}")]
    Translation(String),

    #[error("expected resourceType '{expected}', got '{found}'")]
    UnexpectedResource { expected: String, found: String },
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

/// Deserializes `value` into `T`, reporting the path of the first mismatching field.
pub(crate) fn from_value_with_path<T>(what: &str, value: serde_json::Value) -> FhirResult<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_path_to_error::deserialize::<_, T>(value).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        FhirError::Translation(format!("{what} schema mismatch at {path}: {source}"))
    })
}
