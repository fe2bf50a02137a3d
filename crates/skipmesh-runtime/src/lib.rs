//! SkipMesh runtime engine and orchestration
//!
//! Wires the pure protocol state from `skipmesh-core` to a transport: the
//! session manager owns the per-peer connectivity state machine and replays
//! the relay buffer to newly connected peers, the relay engine makes the
//! deliver/forward/drop decision for every inbound envelope, and [`MeshNode`]
//! assembles the two into a single explicitly owned instance per process.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod engine;
pub mod node;
pub mod session;
pub mod transport;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use engine::{Delivery, DeliveryReceiver, RelayEngine};
pub use node::MeshNode;
pub use session::SessionManager;
pub use transport::{
    event_channel, EventReceiver, EventSender, MeshTransport, PeerState, TransportEvent,
};
