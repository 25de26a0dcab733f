//! Handler trait for processing signaling frames.
//!
//! The connection pumps own framing, keepalive and limits; the handler
//! owns what a frame means.

use std::future::Future;
use std::pin::Pin;

use crate::connection::PeerSender;
use crate::registry::ConnId;

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Trait for handling frames from signaling clients.
pub trait Handler: Send + Sync + 'static {
    /// Called for every text frame, and for binary frames holding UTF-8.
    ///
    /// Frames from one connection are delivered sequentially.
    fn on_text(&self, peer: PeerSender, text: String) -> HandlerFuture<'_>;

    /// Called once after the connection's read pump has stopped.
    fn on_disconnected(&self, conn_id: ConnId) -> HandlerFuture<'_> {
        let _ = conn_id;
        Box::pin(async {})
    }
}
