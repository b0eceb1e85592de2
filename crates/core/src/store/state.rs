//! Immutable store state.
//!
//! Every mutation of the store builds a new [`State`] and swaps it in; a snapshot handed out by
//! `Store::get_state` never changes afterwards. Equality is structural, which is what the store
//! uses to decide whether a fetch result is worth a change notification.

use crate::config::SandboxConfig;
use crate::constants::{QUERY_FHIR_SERVICE_URL, QUERY_PATIENT_ID};
use fhir::{BundleEntry, Condition};
use serde::{Deserialize, Serialize};

/// Conditions of the patient in context, in server order.
pub type ConditionList = Vec<BundleEntry<Condition>>;

/// Which patient and FHIR endpoint the session targets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub patient: String,
    pub base_url: String,
    #[serde(default)]
    pub mock: bool,
}

impl Default for Context {
    /// The context a store starts with before a session sets a real one: no patient, no
    /// server, flagged as mock.
    fn default() -> Self {
        Self {
            patient: String::new(),
            base_url: String::new(),
            mock: true,
        }
    }
}

impl Context {
    /// Builds the bootstrap context from a URL query string.
    ///
    /// Recognises `patientId` and `fhirServiceUrl`; a missing or empty parameter falls back to
    /// the configured default. A leading `?` is ignored. Other parameters are ignored.
    pub fn from_query_string(query: &str, config: &SandboxConfig) -> Self {
        let mut patient = None;
        let mut base_url = None;
        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                QUERY_PATIENT_ID => patient = Some(value.to_string()),
                QUERY_FHIR_SERVICE_URL => base_url = Some(value.to_string()),
                _ => {}
            }
        }

        Self {
            patient: patient.unwrap_or_else(|| config.default_patient().to_string()),
            base_url: base_url.unwrap_or_else(|| config.default_fhir_service_url().to_string()),
            mock: false,
        }
    }
}

/// URL-hash view of the selection, exchanged with the page's location hash.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The store's full state. All three fields are always present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub context: Context,
    pub conditions: ConditionList,
    pub selection: Option<String>,
}

impl State {
    /// A state targeting `context` with nothing loaded or selected yet.
    pub fn with_context(context: Context) -> Self {
        Self {
            context,
            conditions: Vec::new(),
            selection: None,
        }
    }

    /// The first condition whose primary coding matches the selection.
    pub fn selection_as_fhir(&self) -> Option<&Condition> {
        let selection = self.selection.as_deref()?;
        self.conditions
            .iter()
            .map(|entry| &entry.resource)
            .find(|condition| condition.primary_code() == Some(selection))
    }

    pub fn to_hash_state(&self) -> HashState {
        HashState {
            reason: self.selection.clone(),
        }
    }
}
