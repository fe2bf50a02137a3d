//! Relay configuration
//!
//! Consolidates the tunables of the relay core in one place, with the
//! defaults taken from the protocol: a 20-entry rebroadcast window and a
//! 10-hop budget.

use serde::{Deserialize, Serialize};

use crate::types::Ttl;
use crate::{RelayError, Result};

// ----------------------------------------------------------------------------
// Relay Configuration
// ----------------------------------------------------------------------------

/// Configuration for a relay node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Maximum number of envelopes held in the relay buffer
    pub buffer_capacity: usize,
    /// Hop budget assigned to freshly originated envelopes
    pub default_ttl: Ttl,
    /// Buffer size of the application delivery channel
    pub delivery_queue_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 20,
            default_ttl: Ttl::DEFAULT,
            delivery_queue_size: 64,
        }
    }
}

impl RelayConfig {
    /// Create a configuration with a small buffer for tests
    pub fn testing() -> Self {
        Self {
            buffer_capacity: 4,
            default_ttl: Ttl::new(3),
            delivery_queue_size: 16,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(RelayError::InvalidConfig(
                "buffer_capacity must be at least 1".into(),
            ));
        }
        if !self.default_ttl.is_live() {
            return Err(RelayError::InvalidConfig(
                "default_ttl must be at least 1".into(),
            ));
        }
        if self.delivery_queue_size == 0 {
            return Err(RelayError::InvalidConfig(
                "delivery_queue_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
