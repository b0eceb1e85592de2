//! FHIR `Patient` wire model and translation helpers.
//!
//! The sandbox only needs enough of a patient to confirm the server returned one and to show
//! who is in context. The wire model is lenient about unknown keys (servers send far more than
//! is modelled here) but strict about `resourceType` and the shape of the fields it does read.

use crate::{from_value_with_path, FhirError};
use cds_types::PatientId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Purpose of a human name.
///
/// Mirrors the FHIR `name-use` value set. Unrecognised wire codes are dropped rather than
/// rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameUse {
    /// The formal name registered in an official context
    Official,
    /// The name the person is known by day to day
    Usual,
    /// A temporary name, e.g. while a registration is pending
    Temp,
    /// An informal name
    Nickname,
    /// A name used to hide the person's identity
    Anonymous,
    /// A name no longer in use
    Old,
    /// A name used prior to changing it on marriage
    Maiden,
}

impl NameUse {
    fn from_wire(s: &str) -> Option<Self> {
        match s {
            "official" => Some(NameUse::Official),
            "usual" => Some(NameUse::Usual),
            "temp" => Some(NameUse::Temp),
            "nickname" => Some(NameUse::Nickname),
            "anonymous" => Some(NameUse::Anonymous),
            "old" => Some(NameUse::Old),
            "maiden" => Some(NameUse::Maiden),
            _ => None,
        }
    }
}

/// Domain-level carrier for patient data (flat structure).
///
/// The wire format supports multiple names; this keeps the official name if there is one,
/// otherwise the first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientData {
    /// Logical id of the resource on the FHIR server.
    pub id: PatientId,
    /// Purpose of the kept name, if the server stated one.
    pub use_type: Option<NameUse>,
    /// Family name (surname).
    pub family: Option<String>,
    /// Given names, in order.
    pub given: Vec<String>,
    /// ISO 8601 date (YYYY-MM-DD).
    pub birth_date: Option<String>,
    /// `meta.lastUpdated`, when present and a valid RFC 3339 instant.
    pub last_updated: Option<DateTime<Utc>>,
}

impl PatientData {
    /// Human-readable name for display.
    ///
    /// # Returns
    /// "Given Family" from whichever name parts are present, or the patient id when there are
    /// none.
    pub fn display_name(&self) -> String {
        let mut parts: Vec<&str> = self.given.iter().map(String::as_str).collect();
        if let Some(family) = self.family.as_deref() {
            parts.push(family);
        }
        if parts.is_empty() {
            self.id.to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// Patient resource operations.
pub struct Patient;

impl Patient {
    /// Parses a patient resource from server JSON.
    ///
    /// # Arguments
    /// * `value` - Resource body as returned by a FHIR `read`
    ///
    /// # Returns
    /// * `Ok(PatientData)` - The flattened patient, keeping the official name or else the first
    ///
    /// # Errors
    ///
    /// - [`FhirError::UnexpectedResource`] if `resourceType` is not `Patient`
    /// - [`FhirError::Translation`] if a modelled field has the wrong shape or `id` is not a
    ///   valid FHIR id
    pub fn from_json(value: serde_json::Value) -> Result<PatientData, FhirError> {
        let found = value
            .get("resourceType")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if found != "Patient" {
            return Err(FhirError::UnexpectedResource {
                expected: "Patient".into(),
                found: found.to_string(),
            });
        }

        let wire: PatientWire = from_value_with_path("Patient", value)?;
        wire_to_domain(wire)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct PatientWire {
    id: String,

    #[serde(default)]
    name: Vec<HumanNameWire>,

    #[serde(default)]
    birth_date: Option<String>,

    #[serde(default)]
    meta: Option<MetaWire>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct HumanNameWire {
    #[serde(rename = "use", default)]
    use_type: Option<String>,

    #[serde(default)]
    family: Option<String>,

    #[serde(default)]
    given: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetaWire {
    #[serde(default)]
    last_updated: Option<String>,
}

fn wire_to_domain(wire: PatientWire) -> Result<PatientData, FhirError> {
    let id = PatientId::new(&wire.id)
        .map_err(|e| FhirError::Translation(format!("Invalid patient ID: {e}")))?;

    let name = wire
        .name
        .iter()
        .find(|n| n.use_type.as_deref() == Some("official"))
        .or_else(|| wire.name.first());

    // An unparseable lastUpdated is dropped rather than failing the whole patient.
    let last_updated = wire
        .meta
        .and_then(|m| m.last_updated)
        .and_then(|s| s.parse::<DateTime<Utc>>().ok());

    Ok(PatientData {
        id,
        use_type: name
            .and_then(|n| n.use_type.as_deref())
            .and_then(NameUse::from_wire),
        family: name.and_then(|n| n.family.clone()),
        given: name.map(|n| n.given.clone()).unwrap_or_default(),
        birth_date: wire.birth_date,
        last_updated,
    })
}
