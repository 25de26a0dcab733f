//! Peer negotiation for Dropline.
//!
//! A [`Negotiator`] drives an external [`ConnectionEngine`] through the
//! offer/answer/candidate exchange, using a [`SignalingPipe`] (normally a
//! [`WsPipe`] to the relay) to reach the other peer. Everything that
//! happens asynchronously (pipe open and close, incoming envelopes, local
//! candidates, the direct channel opening) arrives as a [`PeerEvent`] on
//! one queue, so a peer never handles two events at once.

mod engine;
mod negotiator;
mod pipe;
mod ws_pipe;

pub use engine::{
    ConnectionEngine, EngineError, EngineFuture, IceCandidate, SdpKind, SessionDescription,
};
pub use negotiator::{NegotiationState, Negotiator, Role};
pub use pipe::{PipeError, SignalingPipe};
pub use ws_pipe::WsPipe;

use dropline_protocol::Envelope;

/// Label of the data channel the offerer opens.
pub const DATA_CHANNEL_LABEL: &str = "dropline";

/// Capacity of a peer's event queue.
pub const EVENT_QUEUE_SIZE: usize = 64;

/// Everything a negotiating peer reacts to.
#[derive(Debug)]
pub enum PeerEvent<C> {
    /// The signaling pipe is connected.
    SignalingOpened,
    /// An envelope arrived over the signaling pipe.
    Signal(Envelope),
    /// The signaling pipe closed.
    SignalingClosed,
    /// The engine discovered a local candidate; `None` ends gathering.
    LocalCandidate(Option<IceCandidate>),
    /// The engine reports the direct channel open.
    ChannelOpened(C),
}

/// Errors that end a negotiation.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("connection engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("signaling pipe error: {0}")]
    Pipe(#[from] PipeError),

    #[error("signaling pipe closed before the channel opened")]
    SignalingClosed,

    #[error("event queue closed")]
    EventsClosed,

    #[error("negotiation aborted")]
    Aborted,
}
