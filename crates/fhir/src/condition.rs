//! FHIR `Condition` wire model.
//!
//! Only the parts the sandbox reasons about are typed (`id`, `code.coding[].code`). Everything
//! else the server sends is kept in `extra` so a condition can be handed back unchanged.

use serde::{Deserialize, Serialize};

/// A `Condition` resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A FHIR `CodeableConcept`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A FHIR `Coding`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Condition {
    /// Code of the first coding, which is the one the sandbox selects conditions by.
    pub fn primary_code(&self) -> Option<&str> {
        self.code
            .as_ref()
            .and_then(|c| c.coding.first())
            .and_then(|c| c.code.as_deref())
    }

    /// Display text for the condition: the first coding's display, then `code.text`.
    pub fn display(&self) -> Option<&str> {
        let code = self.code.as_ref()?;
        code.coding
            .first()
            .and_then(|c| c.display.as_deref())
            .or(code.text.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn condition(value: serde_json::Value) -> Condition {
        serde_json::from_value(value).expect("valid condition")
    }

    #[test]
    fn primary_code_uses_first_coding_only() {
        let c = condition(json!({
            "resourceType": "Condition",
            "code": {"coding": [
                {"system": "http://snomed.info/sct", "code": "44054006", "display": "Diabetes"},
                {"system": "http://hl7.org/fhir/sid/icd-10", "code": "E11"}
            ]}
        }));

        assert_eq!(c.primary_code(), Some("44054006"));
        assert_eq!(c.display(), Some("Diabetes"));
    }

    #[test]
    fn missing_code_has_no_primary_code() {
        let c = condition(json!({"resourceType": "Condition", "id": "x"}));
        assert_eq!(c.primary_code(), None);
        assert_eq!(c.display(), None);

        let empty = condition(json!({"resourceType": "Condition", "code": {"text": "Asthma"}}));
        assert_eq!(empty.primary_code(), None);
        assert_eq!(empty.display(), Some("Asthma"));
    }

    #[test]
    fn unknown_fields_survive_serialisation() {
        let input = json!({
            "resourceType": "Condition",
            "id": "c1",
            "subject": {"reference": "Patient/123"},
            "code": {"coding": [{"code": "195967001", "userSelected": true}]}
        });
        let c = condition(input.clone());

        assert_eq!(serde_json::to_value(&c).expect("serialize"), input);
    }
}
