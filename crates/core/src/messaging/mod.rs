//! Cross-frame messaging protocol (SMART Web Messaging, EHR side).
//!
//! An embedded app posts messages to the sandbox. For each inbound event the
//! [`MessagePanel`]:
//! 1. checks the sender origin against its [`TrustPolicy`]; untrusted events are logged and
//!    dropped without a reply
//! 2. stores the message data as the latest message (replacing the previous one) and notifies
//!    observers
//! 3. classifies `messageType` and builds a [`ReplyEnvelope`]
//! 4. posts the reply back to the event's source, targeted at the event's origin
//!
//! Handling is synchronous: the reply has been posted by the time `handle_message` returns.

pub mod envelope;
pub mod trust;

pub use envelope::{MessageKind, ReplyEnvelope, ReplyPayload};
pub use trust::{OriginAllowList, TrustPolicy};

use crate::listeners::{ListenerId, Listeners};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// The window that posted a message; replies are posted back through it.
pub trait MessageSource: Send + Sync {
    fn post_message(&self, message: &ReplyEnvelope, target_origin: &str);
}

/// One inbound `message` event.
pub struct MessageEvent<'a> {
    pub origin: &'a str,
    pub data: Value,
    pub source: &'a dyn MessageSource,
}

/// What the panel did with an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// The origin was not trusted. Nothing was stored and no reply was sent.
    Rejected,
    /// The message was stored and this reply was posted.
    Replied(ReplyEnvelope),
}

/// EHR-side endpoint of the messaging protocol.
pub struct MessagePanel {
    trust: Arc<dyn TrustPolicy>,
    latest: Mutex<Option<Value>>,
    listeners: Listeners,
}

impl std::fmt::Debug for MessagePanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePanel")
            .field("latest", &self.latest_message())
            .finish_non_exhaustive()
    }
}

impl MessagePanel {
    pub fn new(trust: Arc<dyn TrustPolicy>) -> Self {
        Self {
            trust,
            latest: Mutex::new(None),
            listeners: Listeners::default(),
        }
    }

    /// Processes one inbound event. Exactly one reply is posted for a trusted origin; none
    /// otherwise.
    pub fn handle_message(&self, event: MessageEvent<'_>) -> Disposition {
        if !self.trust.is_trusted_origin(event.origin) {
            warn!("received message for unsupported origin: {}", event.origin);
            return Disposition::Rejected;
        }

        let reply = ReplyEnvelope::reply_to(&event.data);
        debug!(
            "message from {} ({:?}), replying as {}",
            event.origin,
            MessageKind::classify(&event.data),
            reply.message_id
        );

        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(event.data);
        self.listeners.notify();

        event.source.post_message(&reply, event.origin);
        Disposition::Replied(reply)
    }

    /// Data of the most recently accepted message.
    pub fn latest_message(&self) -> Option<Value> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn add_message_listener(&self, callback: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.listeners.add(callback)
    }

    /// Returns false if `id` was not registered.
    pub fn remove_message_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Drops every observer and the stored message.
    pub fn clear(&self) {
        self.listeners.clear();
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
