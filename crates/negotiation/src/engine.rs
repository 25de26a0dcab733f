//! The connection engine seam.
//!
//! The engine owns ICE, DTLS and SCTP; negotiation only ever sees opaque
//! descriptions and candidates.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

/// A boxed future returned by engine operations.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

/// Failure reported by the connection engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Which side of the exchange a description belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A session description; `sdp` is whatever the engine produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: Value,
}

impl SessionDescription {
    pub fn offer(sdp: Value) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp,
        }
    }

    pub fn answer(sdp: Value) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp,
        }
    }
}

/// An opaque network-reachability descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct IceCandidate(pub Value);

/// Peer connection capability consumed by the negotiator.
///
/// Local candidates and the opened channel are not returned from these
/// calls; the engine posts them to the peer's event queue as
/// [`PeerEvent::LocalCandidate`](crate::PeerEvent::LocalCandidate) and
/// [`PeerEvent::ChannelOpened`](crate::PeerEvent::ChannelOpened).
pub trait ConnectionEngine: Send + Sync + 'static {
    /// The direct channel handed over once open.
    type Channel: Send + 'static;

    /// Creates the data channel the offerer will send on.
    fn create_data_channel(&self, label: String) -> EngineFuture<'_, ()>;

    fn create_offer(&self) -> EngineFuture<'_, SessionDescription>;

    fn create_answer(&self) -> EngineFuture<'_, SessionDescription>;

    fn set_local_description(&self, description: SessionDescription) -> EngineFuture<'_, ()>;

    fn set_remote_description(&self, description: SessionDescription) -> EngineFuture<'_, ()>;

    fn add_ice_candidate(&self, candidate: IceCandidate) -> EngineFuture<'_, ()>;
}
