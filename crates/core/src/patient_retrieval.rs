//! Patient retrieval: the `Patient` resource in context plus its conditions.

use crate::CoreResult;
use cds_types::PatientId;
use fhir::{Bundle, FhirClient, Patient, PatientData, SearchQuery};
use tracing::{debug, warn};

/// A retrieved patient. `conditions` is `None` when the condition search failed.
#[derive(Clone, Debug)]
pub struct RetrievedPatient {
    pub patient: PatientData,
    pub conditions: Option<Bundle>,
}

/// Picks the patient to retrieve: an explicit id, then the access-token patient, then the
/// configured default. Blank candidates are skipped.
pub fn resolve_patient_id(
    explicit: Option<&str>,
    token_patient: Option<&str>,
    default: &PatientId,
) -> CoreResult<PatientId> {
    let chosen = [explicit, token_patient]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|id| !id.is_empty());

    match chosen {
        Some(id) => Ok(PatientId::new(id)?),
        None => Ok(default.clone()),
    }
}

/// Reads `Patient/<id>` and then searches `Condition?patient=<id>`.
///
/// A failed patient read, or a response that is not a `Patient`, is an error. A failed
/// condition search is logged and the patient is still returned.
pub async fn retrieve_patient(client: &dyn FhirClient, id: &PatientId) -> CoreResult<RetrievedPatient> {
    debug!("retrieving patient {}", id);
    let body = client.read("Patient", id.as_str()).await?;
    let patient = Patient::from_json(body)?;

    let conditions = match client.search(&SearchQuery::conditions_for(id)).await {
        Ok(bundle) => Some(bundle),
        Err(e) => {
            warn!("could not retrieve conditions for patient {}: {}", id, e);
            None
        }
    };

    Ok(RetrievedPatient {
        patient,
        conditions,
    })
}
