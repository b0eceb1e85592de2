//! SMART Web Messaging reply envelope.
//!
//! Wire format of a reply (keys are exact):
//!
//! ```json
//! {
//!   "messageId": "<fresh uuid>",
//!   "responseToMessageId": "<inbound messageId, or empty>",
//!   "payload": { ... }
//! }
//! ```
//!
//! The payload shape follows the inbound `messageType` prefix:
//! - `fhir.*` : `{"status": 200, "location": "<type>/<id>", "outcome": "Success"}`
//! - `ui.*`   : `{"success": true, "details": "..."}`
//! - other    : `{"success": false, "details": "..."}`

use cds_uuid::{MessageId, Uuid};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Family of an inbound message, chosen by `messageType` prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Fhir,
    Ui,
    Other,
}

impl MessageKind {
    /// Classifies any JSON value. Non-objects and objects without a string `messageType` are
    /// [`MessageKind::Other`].
    pub fn classify(data: &Value) -> Self {
        match message_type(data) {
            Some(t) if t.starts_with("fhir.") => Self::Fhir,
            Some(t) if t.starts_with("ui.") => Self::Ui,
            _ => Self::Other,
        }
    }
}

/// Reply payload. Serialises without a tag, as the bare object for its kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyPayload {
    Fhir {
        status: u16,
        location: String,
        outcome: String,
    },
    Ack {
        success: bool,
        details: String,
    },
}

/// Outbound reply envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    pub message_id: MessageId,
    pub response_to_message_id: String,
    pub payload: ReplyPayload,
}

impl ReplyEnvelope {
    /// Builds the reply to `data`. Never fails: malformed input gets the generic payload.
    pub fn reply_to(data: &Value) -> Self {
        Self {
            message_id: MessageId::new(),
            response_to_message_id: data
                .get("messageId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            payload: payload_for(data),
        }
    }
}

fn message_type(data: &Value) -> Option<&str> {
    data.get("messageType").and_then(Value::as_str)
}

fn payload_for(data: &Value) -> ReplyPayload {
    match MessageKind::classify(data) {
        MessageKind::Fhir => ReplyPayload::Fhir {
            status: 200,
            location: fhir_location(data),
            outcome: "Success".into(),
        },
        MessageKind::Ui => ReplyPayload::Ack {
            success: true,
            details: format!("{} acknowledged", message_type(data).unwrap_or_default()),
        },
        MessageKind::Other => ReplyPayload::Ack {
            success: false,
            details: match message_type(data) {
                Some(t) => format!("unsupported messageType '{t}'"),
                None => "missing messageType".into(),
            },
        },
    }
}

/// Location of the resource a `fhir.*` message refers to.
///
/// Uses `payload.location` when the app supplied one, otherwise `<resourceType>/<id>` from
/// `payload.resource`. A resource without an id is treated as newly created and is given one.
/// With neither present the location is empty.
fn fhir_location(data: &Value) -> String {
    let payload = data.get("payload");
    if let Some(location) = payload
        .and_then(|p| p.get("location"))
        .and_then(Value::as_str)
    {
        return location.to_string();
    }

    let Some(resource) = payload.and_then(|p| p.get("resource")) else {
        return String::new();
    };
    let Some(resource_type) = resource.get("resourceType").and_then(Value::as_str) else {
        return String::new();
    };
    match resource.get("id").and_then(Value::as_str) {
        Some(id) => format!("{resource_type}/{id}"),
        None => format!("{resource_type}/{}", Uuid::new_v4().simple()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_by_prefix() {
        assert_eq!(MessageKind::classify(&json!({"messageType": "fhir.read"})), MessageKind::Fhir);
        assert_eq!(MessageKind::classify(&json!({"messageType": "ui.done"})), MessageKind::Ui);
        assert_eq!(
            MessageKind::classify(&json!({"messageType": "scratchpad.create"})),
            MessageKind::Other
        );
        assert_eq!(MessageKind::classify(&json!({"messageType": "fhirish"})), MessageKind::Other);
        assert_eq!(MessageKind::classify(&json!({"messageType": 3})), MessageKind::Other);
        assert_eq!(MessageKind::classify(&json!("fhir.read")), MessageKind::Other);
        assert_eq!(MessageKind::classify(&Value::Null), MessageKind::Other);
    }

    #[test]
    fn fhir_reply_wire_format() {
        let reply = ReplyEnvelope::reply_to(&json!({
            "messageId": "m1",
            "messageType": "fhir.read",
            "payload": {"location": "Condition/123"}
        }));

        let wire = serde_json::to_value(&reply).expect("serialize");
        assert_eq!(wire["responseToMessageId"], json!("m1"));
        assert_eq!(
            wire["payload"],
            json!({"status": 200, "location": "Condition/123", "outcome": "Success"})
        );
        assert_eq!(wire["messageId"], json!(reply.message_id.to_string()));
        assert_eq!(wire.as_object().map(|o| o.len()), Some(3));
    }

    #[test]
    fn fhir_location_from_resource() {
        let reply = ReplyEnvelope::reply_to(&json!({
            "messageType": "fhir.update",
            "payload": {"resource": {"resourceType": "MedicationRequest", "id": "mr-1"}}
        }));
        assert_eq!(
            reply.payload,
            ReplyPayload::Fhir {
                status: 200,
                location: "MedicationRequest/mr-1".into(),
                outcome: "Success".into()
            }
        );
    }

    #[test]
    fn created_resource_gets_an_id() {
        let reply = ReplyEnvelope::reply_to(&json!({
            "messageType": "fhir.create",
            "payload": {"resource": {"resourceType": "ServiceRequest"}}
        }));
        match reply.payload {
            ReplyPayload::Fhir { location, .. } => {
                let id = location.strip_prefix("ServiceRequest/").expect("typed location");
                assert_eq!(id.len(), 32);
            }
            other => panic!("expected fhir payload, got {other:?}"),
        }
    }

    #[test]
    fn ui_reply_is_success() {
        let reply = ReplyEnvelope::reply_to(&json!({"messageId": "u1", "messageType": "ui.done"}));
        assert_eq!(
            serde_json::to_value(&reply.payload).expect("serialize"),
            json!({"success": true, "details": "ui.done acknowledged"})
        );
    }

    #[test]
    fn malformed_data_gets_generic_reply() {
        for data in [json!("just a string"), json!(42), json!([1, 2]), json!({"messageId": 7})] {
            let reply = ReplyEnvelope::reply_to(&data);
            assert_eq!(reply.response_to_message_id, "");
            assert_eq!(
                reply.payload,
                ReplyPayload::Ack {
                    success: false,
                    details: "missing messageType".into()
                }
            );
        }
    }

    #[test]
    fn unsupported_type_is_named_in_details() {
        let reply = ReplyEnvelope::reply_to(&json!({"messageId": "x", "messageType": "status.handshake"}));
        assert_eq!(reply.response_to_message_id, "x");
        assert!(matches!(
            reply.payload,
            ReplyPayload::Ack { success: false, ref details } if details.contains("status.handshake")
        ));
    }
}
