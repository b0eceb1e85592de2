//! Sandbox runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the session and the
//! REST host. Nothing in the core reads process-wide environment variables while handling a
//! request or a message; binaries collect raw values into [`ConfigValues`] and validate them
//! here.

use crate::constants::{DEFAULT_FHIR_SERVICE_URL, DEFAULT_PATIENT_ID, DEFAULT_REST_ADDR};
use crate::messaging::trust::normalise_origin;
use crate::{CoreError, CoreResult};
use cds_types::PatientId;
use fhir::FhirContext;
use std::net::SocketAddr;

/// Raw configuration values, typically read from `CDS_*` environment variables.
///
/// Empty or whitespace-only values are treated as absent.
#[derive(Clone, Debug, Default)]
pub struct ConfigValues {
    /// `CDS_PATIENT_ID`
    pub patient_id: Option<String>,
    /// `CDS_FHIR_SERVICE_URL`
    pub fhir_service_url: Option<String>,
    /// `CDS_TRUSTED_ORIGINS`, comma separated
    pub trusted_origins: Option<String>,
    /// `CDS_REST_ADDR`
    pub rest_addr: Option<String>,
}

impl ConfigValues {
    /// Reads the `CDS_*` variables from the process environment.
    ///
    /// Only call this from a binary's startup path.
    pub fn from_env() -> Self {
        Self {
            patient_id: std::env::var("CDS_PATIENT_ID").ok(),
            fhir_service_url: std::env::var("CDS_FHIR_SERVICE_URL").ok(),
            trusted_origins: std::env::var("CDS_TRUSTED_ORIGINS").ok(),
            rest_addr: std::env::var("CDS_REST_ADDR").ok(),
        }
    }
}

/// Sandbox configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct SandboxConfig {
    default_patient: PatientId,
    default_fhir_service_url: String,
    trusted_origins: Vec<String>,
    rest_addr: SocketAddr,
}

impl SandboxConfig {
    /// Create a new `SandboxConfig`.
    ///
    /// The FHIR URL must be an absolute http(s) URL and every trusted origin must be an absolute
    /// origin (`scheme://host[:port]`). Origins are stored in normalised form.
    pub fn new(
        default_patient: &str,
        default_fhir_service_url: &str,
        trusted_origins: Vec<String>,
        rest_addr: SocketAddr,
    ) -> CoreResult<Self> {
        let default_patient = PatientId::new(default_patient)
            .map_err(|e| CoreError::InvalidConfig(format!("default patient: {e}")))?;

        // Validates the URL with the same rules the FHIR client applies.
        FhirContext::new(default_patient.as_str(), default_fhir_service_url)
            .map_err(|e| CoreError::InvalidConfig(format!("default FHIR service URL: {e}")))?;

        let trusted_origins = trusted_origins
            .iter()
            .map(|o| normalise_origin(o))
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Self {
            default_patient,
            default_fhir_service_url: default_fhir_service_url.trim().to_string(),
            trusted_origins,
            rest_addr,
        })
    }

    /// Resolve configuration from raw values, falling back to built-in defaults.
    pub fn from_values(values: ConfigValues) -> CoreResult<Self> {
        fn present(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        let patient = present(values.patient_id).unwrap_or_else(|| DEFAULT_PATIENT_ID.into());
        let fhir_url =
            present(values.fhir_service_url).unwrap_or_else(|| DEFAULT_FHIR_SERVICE_URL.into());
        let trusted_origins = present(values.trusted_origins)
            .map(|list| parse_origin_list(&list))
            .unwrap_or_default();
        let rest_addr = present(values.rest_addr)
            .unwrap_or_else(|| DEFAULT_REST_ADDR.into())
            .parse::<SocketAddr>()
            .map_err(|e| CoreError::InvalidConfig(format!("REST address: {e}")))?;

        Self::new(&patient, &fhir_url, trusted_origins, rest_addr)
    }

    pub fn default_patient(&self) -> &PatientId {
        &self.default_patient
    }

    pub fn default_fhir_service_url(&self) -> &str {
        &self.default_fhir_service_url
    }

    /// Origins whose messages the message panel accepts. Empty means none are accepted.
    pub fn trusted_origins(&self) -> &[String] {
        &self.trusted_origins
    }

    pub fn rest_addr(&self) -> SocketAddr {
        self.rest_addr
    }
}

/// Split a comma separated origin list, dropping empty items.
pub fn parse_origin_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
