//! Relay engine
//!
//! The decision logic of the flooding protocol. Every inbound envelope ends
//! one of four ways: delivered to the application (it was sealed for this
//! node), rebuffered and rebroadcast (a fresh relay with hop budget left),
//! or dropped for TTL exhaustion or duplication. Every outbound send is
//! sealed, wrapped with the default hop budget, buffered, and broadcast.
//!
//! The relay buffer is the single shared critical section: append, contains,
//! and snapshot run under one mutex, and the lock is never held across an
//! await.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

use skipmesh_core::{
    Envelope, Identity, PeerId, PublicKey, RelayBuffer, RelayConfig, Result, Timestamp,
};

use crate::session::SessionManager;
use crate::transport::{MeshTransport, TransportEvent};

// ----------------------------------------------------------------------------
// Application Delivery
// ----------------------------------------------------------------------------

/// A message recovered from a self-addressed envelope, handed to the
/// application through the single delivery channel
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The decrypted message body
    pub plaintext: Vec<u8>,
    /// The sender's public identity key
    pub sender: PublicKey,
    /// Origin timestamp claimed and signed by the sender
    pub sent_at: Timestamp,
}

/// Receiving half of the delivery channel.
///
/// The single registered consumer: application state is only ever updated
/// from whatever context drains this receiver, never from relay internals.
pub type DeliveryReceiver = mpsc::Receiver<Delivery>;

// ----------------------------------------------------------------------------
// Relay Engine
// ----------------------------------------------------------------------------

/// Owns the relay buffer, the local identity, and the session manager, and
/// applies the send/receive decision logic
pub struct RelayEngine {
    identity: Identity,
    config: RelayConfig,
    buffer: Arc<Mutex<RelayBuffer>>,
    sessions: SessionManager,
    delivery_tx: mpsc::Sender<Delivery>,
}

impl RelayEngine {
    /// Create an engine over a transport, returning the delivery receiver
    /// for the application
    pub fn new(
        identity: Identity,
        config: RelayConfig,
        transport: Arc<dyn MeshTransport>,
    ) -> (Self, DeliveryReceiver) {
        let buffer = Arc::new(Mutex::new(RelayBuffer::new(config.buffer_capacity)));
        let sessions = SessionManager::new(transport, buffer.clone());
        let (delivery_tx, delivery_rx) = mpsc::channel(config.delivery_queue_size);

        let engine = Self {
            identity,
            config,
            buffer,
            sessions,
            delivery_tx,
        };
        (engine, delivery_rx)
    }

    /// The local node's addressable public key
    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    /// Current relay buffer occupancy
    pub fn buffer_len(&self) -> usize {
        self.lock_buffer().len()
    }

    /// Dispatch one transport event
    pub async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerDiscovered(peer) => {
                self.sessions.peer_discovered(peer).await;
            }
            TransportEvent::PeerStateChanged(peer, state) => {
                self.sessions.peer_state_changed(peer, state);
            }
            TransportEvent::DataReceived(peer, bytes) => {
                self.receive(peer, &bytes);
            }
        }
    }

    /// Originate a message: seal, wrap, buffer, broadcast.
    ///
    /// A seal failure aborts the send; nothing is buffered or transmitted.
    /// Self-originated envelopes are always freshly appended, with no
    /// duplicate check.
    pub fn send(&mut self, plaintext: &[u8], recipient: &PublicKey) -> Result<()> {
        let payload = self.identity.seal(plaintext, recipient)?;
        let envelope = Envelope::new(payload, self.config.default_ttl);

        {
            let mut buffer = self.lock_buffer();
            buffer.append(envelope.clone());
        }

        self.sessions.broadcast(&envelope);
        Ok(())
    }

    /// Process raw inbound bytes from a peer: deliver, forward, or drop
    fn receive(&mut self, from: PeerId, bytes: &[u8]) {
        let envelope = match Envelope::from_bytes(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(%from, error = %e, "dropping undeserializable message");
                return;
            }
        };

        // The central branch point: a failed open is the routing signal that
        // this node is a relay, not the recipient. An envelope at TTL 0 is
        // still offered for self-decryption before it dies.
        if let Some(opened) = self.identity.open(envelope.payload()) {
            self.deliver(opened);
            return;
        }

        let forwarded = match envelope.decrement_ttl() {
            Some(forwarded) => forwarded,
            None => {
                trace!(%from, "dropping envelope, hop budget exhausted");
                return;
            }
        };

        let fresh = {
            let mut buffer = self.lock_buffer();
            if buffer.contains(&forwarded) {
                false
            } else {
                buffer.append(forwarded.clone());
                true
            }
        };
        if !fresh {
            trace!(%from, "suppressing duplicate envelope");
            return;
        }

        self.sessions.broadcast(&forwarded);
    }

    /// Hand a self-addressed message to the application without blocking the
    /// relay path
    fn deliver(&self, opened: skipmesh_core::OpenedMessage) {
        let delivery = Delivery {
            plaintext: opened.plaintext,
            sender: opened.sender,
            sent_at: opened.sent_at,
        };
        match self.delivery_tx.try_send(delivery) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("delivery queue full, dropping inbound message");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("delivery receiver dropped, discarding inbound message");
            }
        }
    }

    fn lock_buffer(&self) -> MutexGuard<'_, RelayBuffer> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::RecordingTransport;
    use crate::transport::PeerState;
    use skipmesh_core::Ttl;

    fn peer(id: u8) -> PeerId {
        PeerId::new([id, 0, 0, 0, 0, 0, 0, 0])
    }

    async fn engine_with_peers(
        config: RelayConfig,
        peers: &[PeerId],
    ) -> (RelayEngine, DeliveryReceiver, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let (mut engine, delivery_rx) =
            RelayEngine::new(Identity::generate(), config, transport.clone());
        for &p in peers {
            engine
                .handle_event(TransportEvent::PeerStateChanged(p, PeerState::Connected))
                .await;
        }
        (engine, delivery_rx, transport)
    }

    #[tokio::test]
    async fn test_send_buffers_and_broadcasts() {
        let (mut engine, _rx, transport) =
            engine_with_peers(RelayConfig::default(), &[peer(1), peer(2)]).await;
        let recipient = Identity::generate();

        engine.send(b"hi", &recipient.public_key()).unwrap();
        transport.wait_for_attempts(2).await;

        assert_eq!(engine.buffer_len(), 1);
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);

        // Every transmitted copy carries the full default hop budget and
        // opens under the recipient's key
        for (_, bytes) in &sent {
            let envelope = Envelope::from_bytes(bytes).unwrap();
            assert_eq!(envelope.ttl(), Ttl::DEFAULT);
            let opened = recipient.open(envelope.payload()).unwrap();
            assert_eq!(opened.plaintext, b"hi");
        }
    }

    #[tokio::test]
    async fn test_send_failure_buffers_nothing() {
        let (mut engine, _rx, transport) =
            engine_with_peers(RelayConfig::default(), &[peer(1)]).await;

        // Degenerate recipient key makes the seal fail
        let result = engine.send(b"hi", &PublicKey::new([0u8; 32]));
        assert!(result.is_err());
        assert_eq!(engine.buffer_len(), 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_self_addressed_delivers_without_forwarding() {
        let transport = Arc::new(RecordingTransport::default());
        let identity = Identity::generate();
        let public_key = identity.public_key();
        let (mut engine, mut delivery_rx) =
            RelayEngine::new(identity, RelayConfig::default(), transport.clone());
        engine
            .handle_event(TransportEvent::PeerStateChanged(peer(1), PeerState::Connected))
            .await;

        let sender = Identity::generate();
        let payload = sender.seal(b"hi", &public_key).unwrap();
        let bytes = Envelope::new(payload, Ttl::DEFAULT).to_bytes();
        engine
            .handle_event(TransportEvent::DataReceived(peer(1), bytes))
            .await;

        let delivery = delivery_rx.recv().await.unwrap();
        assert_eq!(delivery.plaintext, b"hi");
        assert_eq!(delivery.sender, sender.public_key());

        // Terminal at the recipient: no buffer entry, no rebroadcast
        assert_eq!(engine.buffer_len(), 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_relay_decrements_and_rebroadcasts() {
        let (mut engine, _rx, transport) =
            engine_with_peers(RelayConfig::default(), &[peer(1), peer(2)]).await;

        let sender = Identity::generate();
        let elsewhere = Identity::generate();
        let payload = sender.seal(b"hi", &elsewhere.public_key()).unwrap();
        let bytes = Envelope::new(payload, Ttl::new(10)).to_bytes();

        engine
            .handle_event(TransportEvent::DataReceived(peer(1), bytes))
            .await;
        transport.wait_for_attempts(2).await;

        assert_eq!(engine.buffer_len(), 1);
        let sent = transport.sent();
        // Broadcast once per connected peer, origin peer included
        assert_eq!(sent.len(), 2);
        for (_, out) in &sent {
            assert_eq!(Envelope::from_bytes(out).unwrap().ttl().value(), 9);
        }
    }

    #[tokio::test]
    async fn test_exhausted_hop_budget_drops() {
        let (mut engine, _rx, transport) =
            engine_with_peers(RelayConfig::default(), &[peer(1)]).await;

        let sender = Identity::generate();
        let elsewhere = Identity::generate();
        let payload = sender.seal(b"hi", &elsewhere.public_key()).unwrap();

        for ttl in [0u8, 1] {
            let bytes = Envelope::new(payload.clone(), Ttl::new(ttl)).to_bytes();
            engine
                .handle_event(TransportEvent::DataReceived(peer(1), bytes))
                .await;
        }

        assert_eq!(engine.buffer_len(), 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_envelope_floods_once() {
        let (mut engine, _rx, transport) =
            engine_with_peers(RelayConfig::default(), &[peer(1), peer(2)]).await;

        let sender = Identity::generate();
        let elsewhere = Identity::generate();
        let payload = sender.seal(b"hi", &elsewhere.public_key()).unwrap();
        let bytes = Envelope::new(payload, Ttl::new(10)).to_bytes();

        engine
            .handle_event(TransportEvent::DataReceived(peer(1), bytes.clone()))
            .await;
        // Echo of the same ciphertext, e.g. flooded back by a neighbor
        engine
            .handle_event(TransportEvent::DataReceived(peer(2), bytes))
            .await;

        transport.wait_for_attempts(2).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(engine.buffer_len(), 1);
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_bytes_are_dropped() {
        let (mut engine, _rx, transport) =
            engine_with_peers(RelayConfig::default(), &[peer(1)]).await;

        engine
            .handle_event(TransportEvent::DataReceived(peer(1), vec![0xff; 3]))
            .await;

        assert_eq!(engine.buffer_len(), 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_buffer_eviction_under_relay_load() {
        let config = RelayConfig {
            buffer_capacity: 2,
            ..RelayConfig::default()
        };
        let (mut engine, _rx, _transport) = engine_with_peers(config, &[]).await;

        let sender = Identity::generate();
        let elsewhere = Identity::generate();
        for text in [b"a".as_slice(), b"b", b"c"] {
            let payload = sender.seal(text, &elsewhere.public_key()).unwrap();
            let bytes = Envelope::new(payload, Ttl::new(10)).to_bytes();
            engine
                .handle_event(TransportEvent::DataReceived(peer(1), bytes))
                .await;
        }

        assert_eq!(engine.buffer_len(), 2);
    }
}
