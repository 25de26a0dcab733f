//! The relay handler: decodes envelopes and applies the routing table.

use dropline_protocol::{Envelope, SignalType};
use tokio::sync::Mutex;

use crate::connection::PeerSender;
use crate::handler::{Handler, HandlerFuture};
use crate::registry::{ConnId, Registry};
use crate::router::{self, Outbound};

/// Signaling relay state, created once per server.
#[derive(Default)]
pub struct Relay {
    registry: Mutex<Registry<PeerSender>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rooms with at least one registered endpoint.
    pub async fn room_count(&self) -> usize {
        self.registry.lock().await.room_count()
    }

    /// Connection id of the answerer registered in `room`, if any.
    pub async fn answerer_in(&self, room: &str) -> Option<ConnId> {
        self.registry
            .lock()
            .await
            .current_answerer(room)
            .map(PeerSender::id)
    }

    /// Connection id of the offerer registered in `room`, if any.
    pub async fn offerer_in(&self, room: &str) -> Option<ConnId> {
        self.registry
            .lock()
            .await
            .current_offerer(room)
            .map(PeerSender::id)
    }

    /// Handles one frame from `peer`.
    pub async fn dispatch(&self, peer: &PeerSender, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(conn_id = peer.id(), "dropping malformed envelope: {e}");
                return;
            }
        };

        let delivery = {
            let mut registry = self.registry.lock().await;
            router::route(&mut registry, peer.id(), peer, &envelope)
        };

        let room = envelope.room_key();
        match &envelope.signal_type {
            SignalType::RegisterAnswerer => {
                tracing::info!(conn_id = peer.id(), room, "recorded new answerer");
            }
            SignalType::Offer => {
                tracing::info!(conn_id = peer.id(), room, "recorded new offerer and offer");
            }
            SignalType::Other(t) => {
                tracing::debug!(conn_id = peer.id(), msg_type = %t, "ignoring unknown envelope type");
            }
            _ => {}
        }

        let Some(delivery) = delivery else {
            if !matches!(
                envelope.signal_type,
                SignalType::RegisterAnswerer | SignalType::Other(_)
            ) {
                tracing::debug!(
                    conn_id = peer.id(),
                    room,
                    msg_type = %envelope.signal_type,
                    "no counterpart registered, dropping"
                );
            }
            return;
        };

        let json = match delivery.payload {
            Outbound::Verbatim => text.to_owned(),
            Outbound::Rewritten(env) => match env.encode() {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("failed to encode relayed envelope: {e}");
                    return;
                }
            },
        };

        if delivery.target.send_text(json).is_ok() {
            tracing::info!(
                from = peer.id(),
                to = delivery.target.id(),
                room,
                msg_type = %envelope.signal_type,
                "forwarded envelope"
            );
        }
    }

    /// Clears the slots held by a departed connection.
    pub async fn disconnect(&self, conn_id: ConnId) {
        let cleared = self.registry.lock().await.unregister(conn_id);
        if cleared > 0 {
            tracing::info!(conn_id, cleared, "cleared registry slots of departed client");
        }
    }
}

impl Handler for Relay {
    fn on_text(&self, peer: PeerSender, text: String) -> HandlerFuture<'_> {
        Box::pin(async move { self.dispatch(&peer, &text).await })
    }

    fn on_disconnected(&self, conn_id: ConnId) -> HandlerFuture<'_> {
        Box::pin(self.disconnect(conn_id))
    }
}
