use dropline_protocol::{Envelope, ProtocolError};

/// Errors from a signaling pipe.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("pipe closed")]
    Closed,
}

/// Outbound half of the signaling transport.
///
/// Inbound traffic and open/close notifications are delivered as
/// [`PeerEvent`](crate::PeerEvent)s by whoever owns the transport.
pub trait SignalingPipe: Send + Sync {
    fn send(&self, envelope: &Envelope) -> Result<(), PipeError>;
}
