//! Node assembly
//!
//! [`MeshNode`] is the one-per-process relay instance: explicitly
//! constructed at startup with a generated-or-loaded identity, explicitly
//! owned by the embedding application, and torn down on exit without
//! persisting buffer contents. It starts the transport, spawns the event
//! loop that feeds transport events into the relay engine, and exposes the
//! application-facing send handle.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use skipmesh_core::{Identity, PublicKey, RelayConfig, RelayError, Result};

use crate::engine::{DeliveryReceiver, RelayEngine};
use crate::transport::{EventReceiver, MeshTransport};

// ----------------------------------------------------------------------------
// Node Commands
// ----------------------------------------------------------------------------

/// Application requests routed into the relay loop
#[derive(Debug)]
enum NodeCommand {
    Send {
        plaintext: Vec<u8>,
        recipient: PublicKey,
    },
}

/// Buffer size of the command channel; application sends are infrequent
const COMMAND_QUEUE_SIZE: usize = 32;

// ----------------------------------------------------------------------------
// Mesh Node
// ----------------------------------------------------------------------------

/// A running relay node: event loop handle plus the application-facing API
pub struct MeshNode {
    public_key: PublicKey,
    command_tx: mpsc::Sender<NodeCommand>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MeshNode {
    /// Start a relay node over the given transport.
    ///
    /// Begins advertising and browsing, then spawns the event loop. Returns
    /// the node handle and the delivery receiver; the application drains the
    /// receiver from its own single context.
    pub async fn start(
        config: RelayConfig,
        identity: Identity,
        transport: Arc<dyn MeshTransport>,
        mut events: EventReceiver,
    ) -> Result<(Self, DeliveryReceiver)> {
        config.validate()?;

        transport.start_advertising().await?;
        transport.start_browsing().await?;

        let public_key = identity.public_key();
        let (mut engine, delivery_rx) = RelayEngine::new(identity, config, transport);
        let (command_tx, mut command_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(%public_key, "relay node started");

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => engine.handle_event(event).await,
                        None => {
                            debug!("transport event channel closed, stopping relay loop");
                            break;
                        }
                    },
                    command = command_rx.recv() => match command {
                        Some(NodeCommand::Send { plaintext, recipient }) => {
                            // A failed seal aborts that single send; nothing
                            // is buffered or transmitted for it.
                            if let Err(e) = engine.send(&plaintext, &recipient) {
                                warn!(error = %e, "send aborted");
                            }
                        }
                        None => break,
                    },
                    _ = shutdown_rx.changed() => {
                        debug!("relay node shutting down");
                        break;
                    }
                }
            }
        });

        let node = Self {
            public_key,
            command_tx,
            shutdown_tx,
            task,
        };
        Ok((node, delivery_rx))
    }

    /// The local node's addressable public key
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Queue a message for sealing and flooding toward the recipient
    pub async fn send(&self, plaintext: Vec<u8>, recipient: PublicKey) -> Result<()> {
        self.command_tx
            .send(NodeCommand::Send {
                plaintext,
                recipient,
            })
            .await
            .map_err(|_| RelayError::Transport("relay loop stopped".into()))
    }

    /// Stop the event loop. Buffer contents are discarded, not persisted.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}
