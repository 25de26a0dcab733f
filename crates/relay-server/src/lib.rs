//! WebSocket signaling relay.
//!
//! Accepts any number of signaling clients, decodes their envelopes and
//! forwards offer/answer/candidate messages between the offerer and the
//! answerer registered in the same room. The relay keeps no history: a
//! message whose target slot is empty is dropped.

mod connection;
mod handler;
mod registry;
mod relay;
mod router;
mod server;

pub use connection::{PeerConnection, PeerSender, SendError};
pub use handler::{Handler, HandlerFuture};
pub use registry::{ConnId, Registry};
pub use relay::Relay;
pub use router::{Delivery, Outbound, route};
pub use server::{RelayServer, ServerConfig};

/// Per-connection send buffer capacity.
///
/// Signaling traffic is a handful of messages per negotiation; the buffer
/// only absorbs candidate bursts while a slow client drains.
pub const SEND_BUFFER_SIZE: usize = 256;

/// Errors produced by the relay server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("server already running")]
    AlreadyRunning,
}
