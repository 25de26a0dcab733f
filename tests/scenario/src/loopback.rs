//! In-process stand-ins for a peer connection engine and its data channel.
//!
//! Two [`LoopbackEngine`]s share a [`Link`]. Each emits one local candidate
//! when its local description is set, and the link opens a pair of
//! in-memory channels once both sides hold a remote description and at
//! least one remote candidate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};
use tokio::sync::mpsc;

use dropline_negotiation::{
    ConnectionEngine, EngineError, EngineFuture, IceCandidate, PeerEvent, Role,
    SessionDescription,
};
use dropline_transfer::{ChannelEvent, ChannelFuture, DataChannel, TransferError};

fn slot(role: Role) -> usize {
    match role {
        Role::Offerer => 0,
        Role::Answerer => 1,
    }
}

/// Sending half of an in-memory ordered channel.
#[derive(Clone)]
pub struct MemoryChannel {
    open: Arc<AtomicBool>,
    peer: mpsc::UnboundedSender<ChannelEvent>,
}

impl MemoryChannel {
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.peer.send(ChannelEvent::Closed);
        }
    }

    fn push(&self, event: ChannelEvent) -> Result<(), TransferError> {
        if !self.is_open() {
            return Err(TransferError::ChannelClosed);
        }
        self.peer
            .send(event)
            .map_err(|_| TransferError::ChannelClosed)
    }
}

impl DataChannel for MemoryChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.peer.is_closed()
    }

    fn send_text(&self, text: String) -> ChannelFuture<'_> {
        let res = self.push(ChannelEvent::Text(text));
        Box::pin(async move { res })
    }

    fn send_binary(&self, data: Vec<u8>) -> ChannelFuture<'_> {
        let res = self.push(ChannelEvent::Binary(data));
        Box::pin(async move { res })
    }
}

/// One side of an open channel.
pub struct Endpoint {
    pub outgoing: MemoryChannel,
    pub incoming: mpsc::UnboundedReceiver<ChannelEvent>,
}

fn endpoint_pair() -> (Endpoint, Endpoint) {
    let open = Arc::new(AtomicBool::new(true));
    let (to_offerer, offerer_inbox) = mpsc::unbounded_channel();
    let (to_answerer, answerer_inbox) = mpsc::unbounded_channel();
    let offerer = Endpoint {
        outgoing: MemoryChannel {
            open: open.clone(),
            peer: to_answerer,
        },
        incoming: offerer_inbox,
    };
    let answerer = Endpoint {
        outgoing: MemoryChannel {
            open,
            peer: to_offerer,
        },
        incoming: answerer_inbox,
    };
    (offerer, answerer)
}

#[derive(Default)]
struct LinkState {
    events: [Option<mpsc::Sender<PeerEvent<Endpoint>>>; 2],
    remote_description: [Option<Value>; 2],
    remote_candidates: [Vec<Value>; 2],
    opened: bool,
}

impl LinkState {
    fn maybe_open(&mut self) {
        let ready = self.remote_description.iter().all(Option::is_some)
            && self.remote_candidates.iter().all(|c| !c.is_empty());
        if self.opened || !ready {
            return;
        }
        self.opened = true;

        let (offerer, answerer) = endpoint_pair();
        for (events, endpoint) in self.events.iter().zip([offerer, answerer]) {
            if let Some(events) = events {
                let _ = events.try_send(PeerEvent::ChannelOpened(endpoint));
            }
        }
    }
}

/// The simulated network path between two engines.
pub struct Link {
    tag: String,
    state: Mutex<LinkState>,
}

impl Link {
    /// `tag` is embedded in every description this link's engines create.
    pub fn new(tag: &str) -> Arc<Self> {
        Arc::new(Self {
            tag: tag.to_string(),
            state: Mutex::new(LinkState::default()),
        })
    }

    pub fn engine(
        self: &Arc<Self>,
        role: Role,
        events: mpsc::Sender<PeerEvent<Endpoint>>,
    ) -> Arc<LoopbackEngine> {
        self.lock().events[slot(role)] = Some(events);
        Arc::new(LoopbackEngine {
            role,
            link: Arc::clone(self),
        })
    }

    /// The description `role` received from its peer.
    pub fn remote_description(&self, role: Role) -> Option<Value> {
        self.lock().remote_description[slot(role)].clone()
    }

    pub fn remote_candidates(&self, role: Role) -> Vec<Value> {
        self.lock().remote_candidates[slot(role)].clone()
    }

    pub fn is_open(&self) -> bool {
        self.lock().opened
    }

    fn description(&self, role: Role) -> Value {
        let kind = match role {
            Role::Offerer => "offer",
            Role::Answerer => "answer",
        };
        json!({"type": kind, "sdp": format!("v=0 {kind} {}", self.tag)})
    }

    fn candidate(&self, role: Role) -> Value {
        json!({
            "candidate": format!("candidate:{} 1 udp 2122260223 127.0.0.1 5000{} typ host", self.tag, slot(role)),
            "sdpMid": "0",
            "sdpMLineIndex": 0,
        })
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct LoopbackEngine {
    role: Role,
    link: Arc<Link>,
}

impl ConnectionEngine for LoopbackEngine {
    type Channel = Endpoint;

    fn create_data_channel(&self, _label: String) -> EngineFuture<'_, ()> {
        let res = match self.role {
            Role::Offerer => Ok(()),
            Role::Answerer => Err(EngineError::new("answerer does not create the channel")),
        };
        Box::pin(async move { res })
    }

    fn create_offer(&self) -> EngineFuture<'_, SessionDescription> {
        let offer = SessionDescription::offer(self.link.description(Role::Offerer));
        Box::pin(async move { Ok(offer) })
    }

    fn create_answer(&self) -> EngineFuture<'_, SessionDescription> {
        let res = match self.link.remote_description(self.role) {
            Some(_) => Ok(SessionDescription::answer(
                self.link.description(Role::Answerer),
            )),
            None => Err(EngineError::new("no remote offer")),
        };
        Box::pin(async move { res })
    }

    fn set_local_description(&self, _description: SessionDescription) -> EngineFuture<'_, ()> {
        let state = self.link.lock();
        if let Some(events) = &state.events[slot(self.role)] {
            let candidate = IceCandidate(self.link.candidate(self.role));
            let _ = events.try_send(PeerEvent::LocalCandidate(Some(candidate)));
            let _ = events.try_send(PeerEvent::LocalCandidate(None));
        }
        Box::pin(async { Ok(()) })
    }

    fn set_remote_description(&self, description: SessionDescription) -> EngineFuture<'_, ()> {
        let mut state = self.link.lock();
        state.remote_description[slot(self.role)] = Some(description.sdp);
        state.maybe_open();
        Box::pin(async { Ok(()) })
    }

    fn add_ice_candidate(&self, candidate: IceCandidate) -> EngineFuture<'_, ()> {
        let mut state = self.link.lock();
        state.remote_candidates[slot(self.role)].push(candidate.0);
        state.maybe_open();
        Box::pin(async { Ok(()) })
    }
}
