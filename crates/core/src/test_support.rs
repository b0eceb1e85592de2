//! In-memory FHIR server double for unit tests.

use async_trait::async_trait;
use fhir::{Bundle, FhirClient, FhirConnector, FhirContext, FhirError, FhirResult, SearchQuery};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Serves canned `Condition` searches and resource reads, keyed by patient / id.
#[derive(Default)]
pub(crate) struct FakeFhir {
    conditions: Mutex<HashMap<String, Result<Value, u16>>>,
    resources: Mutex<HashMap<(String, String), Result<Value, u16>>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    pub(crate) searches: Mutex<Vec<SearchQuery>>,
    pub(crate) connected: Mutex<Vec<FhirContext>>,
}

impl FakeFhir {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_conditions(&self, patient: &str, entries: Vec<Value>) {
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": entries.into_iter().map(|r| json!({"resource": r})).collect::<Vec<_>>()
        });
        self.conditions
            .lock()
            .unwrap()
            .insert(patient.to_string(), Ok(bundle));
    }

    pub(crate) fn fail_conditions(&self, patient: &str, status: u16) {
        self.conditions
            .lock()
            .unwrap()
            .insert(patient.to_string(), Err(status));
    }

    pub(crate) fn set_resource(&self, resource_type: &str, id: &str, body: Result<Value, u16>) {
        self.resources
            .lock()
            .unwrap()
            .insert((resource_type.to_string(), id.to_string()), body);
    }

    /// Holds searches for `patient` until a permit is added to the returned semaphore.
    pub(crate) fn gate(&self, patient: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates
            .lock()
            .unwrap()
            .insert(patient.to_string(), Arc::clone(&gate));
        gate
    }

    pub(crate) fn connector(self: &Arc<Self>) -> Arc<dyn FhirConnector> {
        Arc::new(FakeConnector(Arc::clone(self)))
    }

    pub(crate) fn search_count(&self) -> usize {
        self.searches.lock().unwrap().len()
    }
}

pub(crate) fn condition(id: &str, code: &str) -> Value {
    json!({
        "resourceType": "Condition",
        "id": id,
        "code": {"coding": [{"system": "http://snomed.info/sct", "code": code}]}
    })
}

struct FakeConnector(Arc<FakeFhir>);

impl FhirConnector for FakeConnector {
    fn connect(&self, context: &FhirContext) -> FhirResult<Arc<dyn FhirClient>> {
        self.0.connected.lock().unwrap().push(context.clone());
        Ok(Arc::clone(&self.0) as Arc<dyn FhirClient>)
    }
}

#[async_trait]
impl FhirClient for FakeFhir {
    async fn search(&self, query: &SearchQuery) -> FhirResult<Bundle> {
        self.searches.lock().unwrap().push(query.clone());
        let patient = query
            .params
            .iter()
            .find(|(k, _)| k == "patient")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();

        let gate = self.gates.lock().unwrap().get(&patient).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate open").forget();
        }

        let canned = self.conditions.lock().unwrap().get(&patient).cloned();
        match canned {
            Some(Ok(bundle)) => Bundle::from_json(bundle),
            Some(Err(status)) => Err(FhirError::Status {
                status,
                url: format!("fake:///Condition?patient={patient}"),
            }),
            None => Bundle::from_json(json!({"resourceType": "Bundle", "type": "searchset"})),
        }
    }

    async fn read(&self, resource_type: &str, id: &str) -> FhirResult<Value> {
        let canned = self
            .resources
            .lock()
            .unwrap()
            .get(&(resource_type.to_string(), id.to_string()))
            .cloned();
        match canned {
            Some(Ok(body)) => Ok(body),
            Some(Err(status)) => Err(FhirError::Status {
                status,
                url: format!("fake:///{resource_type}/{id}"),
            }),
            None => Err(FhirError::Status {
                status: 404,
                url: format!("fake:///{resource_type}/{id}"),
            }),
        }
    }
}
