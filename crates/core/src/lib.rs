//! # CDS Core
//!
//! Session logic of the CDS sandbox:
//! - [`store`]: FHIR-backed state store (context, conditions, selection)
//! - [`messaging`]: SMART Web Messaging reply protocol with origin validation
//! - [`patient_retrieval`]: patient + conditions lookup
//! - [`session`]: ties a store and a message panel to one configuration
//!
//! **No transport concerns**: HTTP hosting lives in `api-rest`, the command line in `cli`.

pub mod config;
pub mod constants;
pub mod listeners;
pub mod messaging;
pub mod patient_retrieval;
pub mod session;
pub mod store;

mod error;
#[cfg(test)]
mod test_support;

pub use config::{ConfigValues, SandboxConfig};
pub use error::{CoreError, CoreResult};
pub use listeners::ListenerId;
pub use messaging::{
    Disposition, MessageEvent, MessagePanel, MessageSource, OriginAllowList, ReplyEnvelope,
    ReplyPayload, TrustPolicy,
};
pub use session::Session;
pub use store::{Action, Context, FetchOutcome, HashState, State, Store};
