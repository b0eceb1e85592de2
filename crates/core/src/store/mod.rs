//! FHIR-backed state store.
//!
//! The store owns one immutable [`State`] snapshot at a time. `set_context` swaps in a new
//! context and schedules a `Condition` search for the patient on the Tokio runtime; when the
//! search resolves the result is reconciled against the current snapshot and subscribers are
//! told only if something actually changed. Selection actions are reduced synchronously.
//!
//! Change notification carries no payload. Subscribers read what they need through
//! [`Store::get_state`] and [`Store::get_selection_as_fhir`].
//!
//! Fetch failures never reach subscribers and never put the store into an error state. They
//! are logged and published on the diagnostics channel ([`Store::subscribe_diagnostics`]).

mod action;
mod state;

pub use action::Action;
pub use state::{ConditionList, Context, HashState, State};

use crate::constants::DIAGNOSTICS_CAPACITY;
use crate::listeners::{ListenerId, Listeners};
use fhir::{Condition, FhirConnector, FhirContext, FhirResult, SearchQuery};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// Result of one condition fetch, published on the diagnostics channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Conditions were loaded. `changed` is false when they equalled what was already held.
    Loaded {
        patient: String,
        conditions: usize,
        changed: bool,
    },
    /// The fetch failed; state was left untouched.
    Failed { patient: String, error: String },
    /// The context changed while the fetch was in flight; the result was dropped.
    Stale { patient: String },
}

struct Snapshot {
    state: Arc<State>,
    /// Bumped by every `set_context`; a fetch only applies if it still matches.
    generation: u64,
    /// Fetch task of the current generation. Changes together with `generation`.
    in_flight: Option<AbortHandle>,
}

struct StoreInner {
    snapshot: Mutex<Snapshot>,
    connector: Arc<dyn FhirConnector>,
    listeners: Listeners,
    diagnostics: broadcast::Sender<FetchOutcome>,
}

/// Session-owned state container. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.get_state())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Creates a store holding `initial` that builds FHIR clients with `connector`.
    pub fn new(initial: State, connector: Arc<dyn FhirConnector>) -> Self {
        let (diagnostics, _) = broadcast::channel(DIAGNOSTICS_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                snapshot: Mutex::new(Snapshot {
                    state: Arc::new(initial),
                    generation: 0,
                    in_flight: None,
                }),
                connector,
                listeners: Listeners::default(),
                diagnostics,
            }),
        }
    }

    /// Replaces the context wholesale and schedules a condition search for its patient.
    ///
    /// Returns immediately. The returned handle completes once the fetch result has been
    /// applied (or dropped); awaiting it is optional. Any fetch still in flight for an earlier
    /// context is aborted.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn set_context(&self, context: Context) -> JoinHandle<()> {
        info!(
            "FHIR context set: patient={} baseUrl={}",
            context.patient, context.base_url
        );

        // One critical section: a fetch must never outlive the context it was started for.
        let mut snapshot = self.inner.lock_snapshot();
        snapshot.generation += 1;
        let generation = snapshot.generation;
        snapshot.state = Arc::new(State {
            context: context.clone(),
            ..(*snapshot.state).clone()
        });

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let outcome = inner.fetch_conditions(generation, &context).await;
            // No receivers is the normal case outside tests.
            let _ = inner.diagnostics.send(outcome);
        });

        if let Some(previous) = snapshot.in_flight.replace(handle.abort_handle()) {
            previous.abort();
        }
        drop(snapshot);

        handle
    }

    /// Current immutable snapshot.
    pub fn get_state(&self) -> Arc<State> {
        Arc::clone(&self.inner.lock_snapshot().state)
    }

    /// The selected condition as a FHIR resource, if conditions are loaded, a selection is made
    /// and some condition's primary coding matches it.
    pub fn get_selection_as_fhir(&self) -> Option<Condition> {
        self.get_state().selection_as_fhir().cloned()
    }

    /// The hash state to publish to the page location (`reason` = selection).
    pub fn get_state_to_publish(&self) -> HashState {
        self.get_state().to_hash_state()
    }

    /// Reduces `action`, emitting a change where the action calls for one.
    pub fn dispatch(&self, action: Action) {
        let changed = match action {
            Action::PickCondition { selection } => {
                self.inner.update(|state| State {
                    selection,
                    ..state.clone()
                });
                true
            }
            Action::NewHashState { hash } => match hash.reason {
                Some(reason) => {
                    self.inner.update(|state| State {
                        selection: Some(reason),
                        ..state.clone()
                    });
                    true
                }
                None => false,
            },
        };

        if changed {
            self.inner.listeners.notify();
        }
    }

    pub fn add_change_listener(&self, callback: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.inner.listeners.add(callback)
    }

    /// Returns false if `id` was not registered.
    pub fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Subscribes to fetch outcomes. Outcomes published before subscribing are not replayed.
    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<FetchOutcome> {
        self.inner.diagnostics.subscribe()
    }

    /// Aborts any in-flight fetch and drops every change listener.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.lock_snapshot().in_flight.take() {
            handle.abort();
        }
        self.inner.listeners.clear();
    }
}

impl StoreInner {
    fn lock_snapshot(&self) -> std::sync::MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Swaps in `f(current)` as the new state.
    fn update(&self, f: impl FnOnce(&State) -> State) {
        let mut snapshot = self.lock_snapshot();
        let next = f(snapshot.state.as_ref());
        snapshot.state = Arc::new(next);
    }

    async fn fetch_conditions(&self, generation: u64, context: &Context) -> FetchOutcome {
        let patient = context.patient.clone();
        debug!("fetching conditions for patient {}", patient);

        match self.load_conditions(context).await {
            Ok(conditions) => self.apply_conditions(generation, patient, conditions),
            Err(e) if self.is_superseded(generation) => {
                debug!(
                    "dropping stale condition fetch failure for patient {}: {}",
                    patient, e
                );
                FetchOutcome::Stale { patient }
            }
            Err(e) => {
                warn!("Error fetching conditions for patient {}: {}", patient, e);
                FetchOutcome::Failed {
                    patient,
                    error: e.to_string(),
                }
            }
        }
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.lock_snapshot().generation != generation
    }

    async fn load_conditions(&self, context: &Context) -> FhirResult<ConditionList> {
        let fhir_context = FhirContext::new(&context.patient, &context.base_url)?;
        let client = self.connector.connect(&fhir_context)?;
        let bundle = client
            .search(&SearchQuery::conditions_for(fhir_context.patient()))
            .await?;
        bundle.entries_as::<Condition>()
    }

    fn apply_conditions(
        &self,
        generation: u64,
        patient: String,
        conditions: ConditionList,
    ) -> FetchOutcome {
        let count = conditions.len();
        let changed = {
            let mut snapshot = self.lock_snapshot();
            if snapshot.generation != generation {
                debug!("dropping stale condition fetch for patient {}", patient);
                return FetchOutcome::Stale { patient };
            }

            let next = State {
                conditions,
                ..(*snapshot.state).clone()
            };
            let changed = next != *snapshot.state;
            if changed {
                snapshot.state = Arc::new(next);
            }
            changed
        };

        if changed {
            self.listeners.notify();
        }

        FetchOutcome::Loaded {
            patient,
            conditions: count,
            changed,
        }
    }
}
