//! Transport abstraction
//!
//! The discovery/byte-delivery layer is an external collaborator: it
//! advertises local presence, browses for peers, and moves raw bytes between
//! connected peers. This module defines the consumed interface and the event
//! channel through which the transport reports discovery, connectivity, and
//! inbound data.

use async_trait::async_trait;
use tokio::sync::mpsc;

use skipmesh_core::{PeerId, Result};

// ----------------------------------------------------------------------------
// Peer Connectivity State
// ----------------------------------------------------------------------------

/// Transport-reported connectivity state of a peer.
///
/// Legal transitions: `NotConnected -> Connecting -> Connected`, with a
/// back-edge to `NotConnected` from either of the other two (attempt failed
/// or peer disconnected). The transport may report a disconnect at any time,
/// including mid-replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// No connection to the peer
    NotConnected,
    /// Connection attempt in progress
    Connecting,
    /// Actively connected; eligible for broadcast and replay
    Connected,
}

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Events emitted by the transport layer
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A nearby peer was discovered while browsing
    PeerDiscovered(PeerId),
    /// A peer's connectivity state changed
    PeerStateChanged(PeerId, PeerState),
    /// Raw bytes arrived from a connected peer
    DataReceived(PeerId, Vec<u8>),
}

/// Sending half of the transport event channel, held by the transport
pub type EventSender = mpsc::Sender<TransportEvent>;

/// Receiving half of the transport event channel, consumed by the node loop
pub type EventReceiver = mpsc::Receiver<TransportEvent>;

/// Create the transport event channel
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Consumed interface of the mesh transport collaborator.
///
/// Implementations deliver their events through the channel created with
/// [`event_channel`]; per-peer send failures are reported via `Err` and are
/// independent of other peers.
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Begin broadcasting local presence
    async fn start_advertising(&self) -> Result<()>;

    /// Begin browsing for nearby peers
    async fn start_browsing(&self) -> Result<()>;

    /// Invite a discovered peer to connect
    async fn invite(&self, peer: PeerId) -> Result<()>;

    /// Send raw bytes to a connected peer
    async fn send_bytes(&self, peer: PeerId, bytes: &[u8]) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Recording Transport (for testing)
// ----------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use skipmesh_core::RelayError;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Transport double that records every call and can be told to fail
    /// sends toward specific peers
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub(crate) sent: Mutex<Vec<(PeerId, Vec<u8>)>>,
        pub(crate) invited: Mutex<Vec<PeerId>>,
        attempts: Mutex<usize>,
        failing: Mutex<HashSet<PeerId>>,
    }

    impl RecordingTransport {
        pub(crate) fn sent(&self) -> Vec<(PeerId, Vec<u8>)> {
            self.sent.lock().unwrap().clone()
        }

        /// Total `send_bytes` calls, failed ones included
        pub(crate) fn attempts(&self) -> usize {
            *self.attempts.lock().unwrap()
        }

        pub(crate) fn fail_sends_to(&self, peer: PeerId) {
            self.failing.lock().unwrap().insert(peer);
        }

        /// Wait for the given number of send attempts; sends run in detached
        /// tasks, so tests poll rather than observe them synchronously
        pub(crate) async fn wait_for_attempts(&self, count: usize) {
            for _ in 0..500 {
                if self.attempts() >= count {
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            }
            panic!("timed out waiting for {count} send attempts");
        }
    }

    #[async_trait]
    impl MeshTransport for RecordingTransport {
        async fn start_advertising(&self) -> Result<()> {
            Ok(())
        }

        async fn start_browsing(&self) -> Result<()> {
            Ok(())
        }

        async fn invite(&self, peer: PeerId) -> Result<()> {
            self.invited.lock().unwrap().push(peer);
            Ok(())
        }

        async fn send_bytes(&self, peer: PeerId, bytes: &[u8]) -> Result<()> {
            *self.attempts.lock().unwrap() += 1;
            if self.failing.lock().unwrap().contains(&peer) {
                return Err(RelayError::Transport("peer unreachable".into()));
            }
            self.sent.lock().unwrap().push((peer, bytes.to_vec()));
            Ok(())
        }
    }
}
