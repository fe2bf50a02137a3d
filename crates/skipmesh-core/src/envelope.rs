//! Envelope wire format
//!
//! The envelope is the unit exchanged between peers: an opaque encrypted
//! payload plus a remaining hop count. The binary layout is a small tagged
//! record and must round-trip losslessly.

use serde::{Deserialize, Serialize};

use crate::types::Ttl;
use crate::{RelayError, Result};

// ----------------------------------------------------------------------------
// Wire Constants
// ----------------------------------------------------------------------------

/// Wire format version
pub const WIRE_VERSION: u8 = 1;

/// Fixed header size: version (1) + TTL (1) + payload length (4)
pub const HEADER_SIZE: usize = 6;

// ----------------------------------------------------------------------------
// Envelope
// ----------------------------------------------------------------------------

/// The wire-level relay unit: opaque ciphertext plus a hop budget.
///
/// The payload is immutable once created; only the TTL changes as the
/// envelope is forwarded. Deduplication identity is byte-equality of the
/// payload, see [`Envelope::same_payload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    payload: Vec<u8>,
    ttl: Ttl,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(payload: Vec<u8>, ttl: Ttl) -> Self {
        Self { payload, ttl }
    }

    /// Get the encrypted payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the remaining hop count
    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    /// Consume one hop for forwarding.
    ///
    /// Returns `None` when the hop budget is exhausted (the decremented TTL
    /// would be 0): such an envelope must be dropped, not buffered or
    /// forwarded. An envelope that arrives at 0 may still be offered for
    /// self-decryption before this is called.
    pub fn decrement_ttl(self) -> Option<Self> {
        match self.ttl.decrement() {
            Some(ttl) if ttl.is_live() => Some(Self { ttl, ..self }),
            _ => None,
        }
    }

    /// Deduplication identity: byte-equality of ciphertext payloads.
    ///
    /// TTL is excluded on purpose; the same message seen at different hop
    /// counts is still the same message.
    pub fn same_payload(&self, other: &Envelope) -> bool {
        self.payload == other.payload
    }

    /// Serialize to wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        bytes.push(WIRE_VERSION);
        bytes.push(self.ttl.value());
        bytes.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Deserialize from wire bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(RelayError::invalid_envelope("envelope too short"));
        }

        let version = bytes[0];
        if version != WIRE_VERSION {
            return Err(RelayError::invalid_envelope("unsupported wire version"));
        }

        let ttl = Ttl::new(bytes[1]);

        let length_bytes: [u8; 4] = bytes[2..6]
            .try_into()
            .map_err(|_| RelayError::invalid_envelope("invalid payload length"))?;
        let payload_length = u32::from_be_bytes(length_bytes) as usize;

        if bytes.len() != HEADER_SIZE + payload_length {
            return Err(RelayError::invalid_envelope("payload length mismatch"));
        }

        Ok(Self {
            payload: bytes[HEADER_SIZE..].to_vec(),
            ttl,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
