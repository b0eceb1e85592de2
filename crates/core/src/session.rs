//! A sandbox session: one store and one message panel sharing a configuration.
//!
//! There is no process-wide store. Whoever hosts the sandbox (the REST server, the CLI, a test)
//! creates a [`Session`], bootstraps it from a URL query string and closes it when done.

use crate::config::SandboxConfig;
use crate::messaging::{MessagePanel, OriginAllowList};
use crate::patient_retrieval::{self, RetrievedPatient};
use crate::store::{Context, State, Store};
use crate::CoreResult;
use fhir::{FhirConnector, FhirContext};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Session {
    config: SandboxConfig,
    connector: Arc<dyn FhirConnector>,
    store: Store,
    panel: Arc<MessagePanel>,
}

impl Session {
    /// Builds a session whose message panel trusts exactly `config.trusted_origins()`.
    pub fn from_config(config: SandboxConfig, connector: Arc<dyn FhirConnector>) -> CoreResult<Self> {
        let allow_list = OriginAllowList::new(config.trusted_origins())?;
        if allow_list.is_empty() {
            warn!("no trusted origins configured; every inbound message will be rejected");
        }

        Ok(Self {
            store: Store::new(State::default(), Arc::clone(&connector)),
            panel: Arc::new(MessagePanel::new(Arc::new(allow_list))),
            config,
            connector,
        })
    }

    /// Seeds the context from a URL query string (`patientId`, `fhirServiceUrl`) and starts the
    /// condition fetch.
    pub fn bootstrap(&self, query: &str) -> JoinHandle<()> {
        let context = Context::from_query_string(query, &self.config);
        info!("bootstrapping session for patient {}", context.patient);
        self.store.set_context(context)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn panel(&self) -> &Arc<MessagePanel> {
        &self.panel
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Retrieves a patient from the FHIR server in the current context.
    ///
    /// The patient is `explicit`, else `token_patient`, else the configured default.
    pub async fn retrieve_patient(
        &self,
        explicit: Option<&str>,
        token_patient: Option<&str>,
    ) -> CoreResult<RetrievedPatient> {
        let id = patient_retrieval::resolve_patient_id(
            explicit,
            token_patient,
            self.config.default_patient(),
        )?;
        let base_url = self.store.get_state().context.base_url.clone();
        let base_url = if base_url.is_empty() {
            self.config.default_fhir_service_url().to_string()
        } else {
            base_url
        };

        let client = self.connector.connect(&FhirContext::new(id.as_str(), &base_url)?)?;
        patient_retrieval::retrieve_patient(client.as_ref(), &id).await
    }

    /// Ends the session: aborts any in-flight fetch and drops every observer.
    ///
    /// Other handles to a shared session see the closed state. Closing twice is harmless.
    pub fn close(&self) {
        self.store.shutdown();
        self.panel.clear();
        info!("session closed");
    }
}
