//! SkipMesh Core Protocol Implementation
//!
//! This crate provides the foundational types for the SkipMesh peer-to-peer
//! relay: the hop-limited envelope wire format, the bounded relay buffer used
//! as a rebroadcast window, and the sealed-envelope cryptography that decides
//! whether an inbound message is addressed to this node.
//!
//! Everything here is synchronous, in-memory state; orchestration lives in
//! `skipmesh-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod buffer;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use buffer::{BufferEntry, RelayBuffer};
pub use config::RelayConfig;
pub use crypto::{Identity, OpenedMessage, SealError};
pub use envelope::Envelope;
pub use types::{PeerId, PublicKey, Timestamp, Ttl};

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Core error types for the SkipMesh relay.
///
/// "Not addressed to self" is deliberately not an error: [`Identity::open`]
/// returns an `Option` because a failed decryption is the expected routing
/// signal for relayed traffic, not a fault.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("seal failed: {0}")]
    Seal(#[from] SealError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("transport send failed: {0}")]
    Transport(String),
}

impl RelayError {
    /// Convenience constructor for envelope decode failures
    pub fn invalid_envelope(reason: impl Into<String>) -> Self {
        Self::InvalidEnvelope(reason.into())
    }
}

pub type Result<T> = core::result::Result<T, RelayError>;
