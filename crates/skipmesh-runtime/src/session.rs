//! Session management
//!
//! Owns the per-peer connectivity table driven by transport events. On
//! discovery it immediately invites the peer (re-discovery of a previously
//! failed peer is a fresh attempt; there is no backoff). On a transition
//! into `Connected` it replays the full relay buffer to that peer, exactly
//! once per connection instance: a spurious repeated `Connected` report
//! without an intervening disconnect does not replay again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use smallvec::SmallVec;
use tracing::{debug, info, warn};

use skipmesh_core::{Envelope, PeerId, RelayBuffer};

use crate::transport::{MeshTransport, PeerState};

// ----------------------------------------------------------------------------
// Peer Session
// ----------------------------------------------------------------------------

/// Per-peer connectivity record
#[derive(Debug)]
struct PeerSession {
    state: PeerState,
    /// Set when the buffer has been replayed for the current connection
    /// instance; cleared on disconnect.
    replayed: bool,
}

impl PeerSession {
    fn new() -> Self {
        Self {
            state: PeerState::NotConnected,
            replayed: false,
        }
    }
}

// ----------------------------------------------------------------------------
// Session Manager
// ----------------------------------------------------------------------------

/// Owns the peer connectivity table and the broadcast set
pub struct SessionManager {
    transport: Arc<dyn MeshTransport>,
    buffer: Arc<Mutex<RelayBuffer>>,
    peers: HashMap<PeerId, PeerSession>,
}

impl SessionManager {
    /// Create a new session manager over a transport and the shared buffer
    pub fn new(transport: Arc<dyn MeshTransport>, buffer: Arc<Mutex<RelayBuffer>>) -> Self {
        Self {
            transport,
            buffer,
            peers: HashMap::new(),
        }
    }

    /// Handle a discovery event: invite the peer without waiting for
    /// application input
    pub async fn peer_discovered(&mut self, peer: PeerId) {
        let session = self.peers.entry(peer).or_insert_with(PeerSession::new);
        if session.state == PeerState::Connected {
            return;
        }
        session.state = PeerState::Connecting;

        debug!(%peer, "inviting discovered peer");
        if let Err(e) = self.transport.invite(peer).await {
            warn!(%peer, error = %e, "invite failed");
            if let Some(session) = self.peers.get_mut(&peer) {
                session.state = PeerState::NotConnected;
            }
        }
    }

    /// Handle a transport-reported connectivity change
    pub fn peer_state_changed(&mut self, peer: PeerId, state: PeerState) {
        let session = self.peers.entry(peer).or_insert_with(PeerSession::new);
        let needs_replay = match state {
            PeerState::Connected => {
                session.state = PeerState::Connected;
                if session.replayed {
                    false
                } else {
                    session.replayed = true;
                    true
                }
            }
            PeerState::Connecting => {
                session.state = PeerState::Connecting;
                false
            }
            PeerState::NotConnected => {
                session.state = PeerState::NotConnected;
                session.replayed = false;
                false
            }
        };

        if needs_replay {
            self.replay(peer);
        }
    }

    /// Send the envelope to every currently connected peer, fire-and-forget.
    ///
    /// Each peer gets its own detached send task: a slow or failed peer
    /// neither delays the other peers' copies nor stalls the caller's event
    /// loop. Failures are logged inside the task. The origin peer of a
    /// forwarded envelope is not excluded; the echo is suppressed on receipt
    /// by the duplicate check.
    pub fn broadcast(&self, envelope: &Envelope) {
        let bytes: Arc<[u8]> = envelope.to_bytes().into();
        for peer in self.connected_peers() {
            let transport = Arc::clone(&self.transport);
            let bytes = Arc::clone(&bytes);
            tokio::spawn(async move {
                if let Err(e) = transport.send_bytes(peer, &bytes).await {
                    warn!(%peer, error = %e, "broadcast send failed");
                }
            });
        }
    }

    /// Peers currently in the `Connected` state
    pub fn connected_peers(&self) -> SmallVec<[PeerId; 8]> {
        self.peers
            .iter()
            .filter(|(_, session)| session.state == PeerState::Connected)
            .map(|(peer, _)| *peer)
            .collect()
    }

    /// Replay the full buffer to a newly connected peer, in buffer order.
    ///
    /// The transmission runs in a detached task so a slow peer cannot stall
    /// the event loop; per-envelope failures do not abort the remaining
    /// replay.
    fn replay(&self, peer: PeerId) {
        // Snapshot under the lock, transmit from the task; the lock is never
        // held across an await.
        let snapshot = {
            let buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
            buffer.snapshot()
        };
        if snapshot.is_empty() {
            return;
        }

        info!(%peer, count = snapshot.len(), "replaying buffer to new peer");
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            for envelope in &snapshot {
                if let Err(e) = transport.send_bytes(peer, &envelope.to_bytes()).await {
                    warn!(%peer, error = %e, "replay send failed");
                }
            }
        });
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
