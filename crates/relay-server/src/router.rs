//! Routing table for signaling envelopes.

use dropline_protocol::{Envelope, SignalType};

use crate::registry::{ConnId, Registry};

/// What gets written to the target connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// The sender's original frame, byte for byte.
    Verbatim,
    /// A relay-built envelope.
    Rewritten(Envelope),
}

/// A forwarding decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<H> {
    pub target: H,
    pub payload: Outbound,
}

/// Applies the routing table to one envelope received from `from`.
///
/// | received          | side effect                    | forward to |
/// |-------------------|--------------------------------|------------|
/// | `registerAnswerer`| answerer slot = sender         | -          |
/// | `offer`           | offerer slot = sender, record  | answerer   |
/// | `answer`          | -                              | offerer    |
/// | `ICE-offerer`     | -                              | answerer (as `ICE`) |
/// | `ICE-answerer`    | -                              | offerer (as `ICE`)  |
///
/// Returns `None` when nothing is forwarded, including when the target
/// slot is empty. Unknown types are ignored.
pub fn route<H: Clone>(
    registry: &mut Registry<H>,
    from: ConnId,
    sender: &H,
    envelope: &Envelope,
) -> Option<Delivery<H>> {
    let room = envelope.room_key();

    match &envelope.signal_type {
        SignalType::RegisterAnswerer => {
            registry.register_answerer(room, from, sender.clone());
            None
        }
        SignalType::Offer => {
            registry.register_offerer(room, from, sender.clone());
            registry.record_offer(room, envelope.sdp.clone());
            deliver(registry.current_answerer(room), Outbound::Verbatim)
        }
        SignalType::Answer => deliver(registry.current_offerer(room), Outbound::Verbatim),
        SignalType::IceOfferer => deliver(
            registry.current_answerer(room),
            Outbound::Rewritten(relayed_candidate(envelope)),
        ),
        SignalType::IceAnswerer => deliver(
            registry.current_offerer(room),
            Outbound::Rewritten(relayed_candidate(envelope)),
        ),
        SignalType::Ice | SignalType::Other(_) => None,
    }
}

fn deliver<H: Clone>(target: Option<&H>, payload: Outbound) -> Option<Delivery<H>> {
    target.map(|t| Delivery {
        target: t.clone(),
        payload,
    })
}

fn relayed_candidate(envelope: &Envelope) -> Envelope {
    Envelope {
        signal_type: SignalType::Ice,
        room: None,
        sdp: None,
        candidate: envelope.candidate.clone(),
    }
}
