//! Constants used throughout the CDS core crate.

/// Patient put in context when neither the query string nor configuration names one.
pub const DEFAULT_PATIENT_ID: &str = "1288992";

/// FHIR server used when neither the query string nor configuration names one.
pub const DEFAULT_FHIR_SERVICE_URL: &str = "http://hooks.smarthealthit.org:9080";

/// Default bind address of the REST host.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Query-string parameter naming the patient in context.
pub const QUERY_PATIENT_ID: &str = "patientId";

/// Query-string parameter naming the FHIR server base URL.
pub const QUERY_FHIR_SERVICE_URL: &str = "fhirServiceUrl";

/// Capacity of the fetch diagnostics broadcast channel.
pub const DIAGNOSTICS_CAPACITY: usize = 64;
