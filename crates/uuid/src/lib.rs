//! Message identifier utilities.
//!
//! SMART Web Messaging correlates replies with requests through string identifiers. Every
//! envelope the sandbox sends carries a fresh identifier, and the identifier of the message it
//! answers is echoed back verbatim.
//!
//! This crate provides:
//! - [`MessageId`], a wrapper that *guarantees* the canonical form once constructed.
//!
//! ## Canonical form
//! - Hyphenated, lowercase RFC 4122 text (36 characters)
//! - Example: `550e8400-e29b-41d4-a716-446655440000`
//!
//! Notes:
//! - This is the same value you would get from `Uuid::new_v4().hyphenated().to_string()`.
//! - Identifiers received from embedded apps are *not* parsed into [`MessageId`]; they are
//!   opaque strings and are echoed as-is. Use [`MessageId::parse`] only where a value must be
//!   one the sandbox could have issued.

mod service;

// Re-export public types
pub use service::{MessageId, Uuid};

/// Error type for message identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for message identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
