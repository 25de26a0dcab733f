//! Offerer/answerer state machine.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dropline_protocol::{Envelope, SignalType};

use crate::engine::{ConnectionEngine, IceCandidate, SessionDescription};
use crate::pipe::SignalingPipe;
use crate::{DATA_CHANNEL_LABEL, NegotiationError, PeerEvent};

/// Which side of the exchange a peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the data channel and the offer; sends the file.
    Offerer,
    /// Registers with the relay and answers; receives the file.
    Answerer,
}

impl Role {
    /// Wraps a local candidate in the envelope type the relay expects
    /// from this role.
    fn candidate_envelope(self, candidate: IceCandidate) -> Envelope {
        match self {
            Role::Offerer => Envelope::ice_offerer(candidate.0),
            Role::Answerer => Envelope::ice_answerer(candidate.0),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Offerer => f.write_str("offerer"),
            Role::Answerer => f.write_str("answerer"),
        }
    }
}

/// Negotiation progress of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    SignalingConnected,
    DescriptionExchanged,
    IceExchanging,
    ChannelOpen,
    Failed,
}

impl NegotiationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, NegotiationState::ChannelOpen | NegotiationState::Failed)
    }
}

/// Drives one peer's side of the offer/answer/candidate exchange.
///
/// Events are handled strictly one at a time. Candidates flow in both
/// directions as soon as they exist; nothing waits for gathering to
/// finish.
pub struct Negotiator<E: ConnectionEngine, P: SignalingPipe> {
    role: Role,
    room: Option<String>,
    engine: Arc<E>,
    pipe: P,
    state: NegotiationState,
}

impl<E: ConnectionEngine, P: SignalingPipe> Negotiator<E, P> {
    pub fn new(role: Role, engine: Arc<E>, pipe: P) -> Self {
        Self {
            role,
            room: None,
            engine,
            pipe,
            state: NegotiationState::Idle,
        }
    }

    /// Tags every outgoing envelope with `room`.
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn pipe(&self) -> &P {
        &self.pipe
    }

    /// Handles a single event.
    ///
    /// Returns the channel once the engine reports it open. Any error moves
    /// the negotiator to [`NegotiationState::Failed`]; events arriving
    /// after a terminal state are dropped.
    pub async fn handle(
        &mut self,
        event: PeerEvent<E::Channel>,
    ) -> Result<Option<E::Channel>, NegotiationError> {
        if self.state.is_terminal() {
            debug!(role = %self.role, state = ?self.state, "dropping event after negotiation ended");
            return Ok(None);
        }

        let result = self.apply(event).await;
        if let Err(e) = &result {
            warn!(role = %self.role, "negotiation failed: {e}");
            self.state = NegotiationState::Failed;
        }
        result
    }

    /// Consumes events until the channel opens, the queue or pipe closes,
    /// or `cancel` fires.
    pub async fn run(
        &mut self,
        events: &mut mpsc::Receiver<PeerEvent<E::Channel>>,
        cancel: &CancellationToken,
    ) -> Result<E::Channel, NegotiationError> {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => None,
                ev = events.recv() => match ev {
                    Some(ev) => Some(ev),
                    None => {
                        self.state = NegotiationState::Failed;
                        return Err(NegotiationError::EventsClosed);
                    }
                },
            };
            let Some(event) = event else {
                self.state = NegotiationState::Failed;
                return Err(NegotiationError::Aborted);
            };

            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                res = self.handle(event) => Some(res),
            };
            match outcome {
                None => {
                    self.state = NegotiationState::Failed;
                    return Err(NegotiationError::Aborted);
                }
                Some(res) => {
                    if let Some(channel) = res? {
                        return Ok(channel);
                    }
                }
            }
        }
    }

    async fn apply(
        &mut self,
        event: PeerEvent<E::Channel>,
    ) -> Result<Option<E::Channel>, NegotiationError> {
        match event {
            PeerEvent::SignalingOpened => self.on_signaling_opened().await?,
            PeerEvent::Signal(envelope) => self.on_signal(envelope).await?,
            PeerEvent::LocalCandidate(Some(candidate)) => {
                self.send(self.role.candidate_envelope(candidate))?;
                self.candidates_flowing();
            }
            PeerEvent::LocalCandidate(None) => {
                debug!(role = %self.role, "local candidate gathering complete");
            }
            PeerEvent::ChannelOpened(channel) => {
                info!(role = %self.role, "data channel open");
                self.state = NegotiationState::ChannelOpen;
                return Ok(Some(channel));
            }
            PeerEvent::SignalingClosed => return Err(NegotiationError::SignalingClosed),
        }
        Ok(None)
    }

    async fn on_signaling_opened(&mut self) -> Result<(), NegotiationError> {
        if self.state != NegotiationState::Idle {
            warn!(role = %self.role, state = ?self.state, "signaling opened twice, ignoring");
            return Ok(());
        }
        self.state = NegotiationState::SignalingConnected;
        info!(role = %self.role, room = ?self.room, "signaling connected");

        match self.role {
            Role::Answerer => self.send(Envelope::register_answerer())?,
            Role::Offerer => {
                self.engine
                    .create_data_channel(DATA_CHANNEL_LABEL.to_string())
                    .await?;
                let offer = self.engine.create_offer().await?;
                self.engine.set_local_description(offer.clone()).await?;
                self.send(Envelope::offer(offer.sdp))?;
                debug!("offer sent");
            }
        }
        Ok(())
    }

    async fn on_signal(&mut self, envelope: Envelope) -> Result<(), NegotiationError> {
        match (&envelope.signal_type, self.role) {
            (SignalType::Offer, Role::Answerer) => self.on_remote_offer(envelope).await,
            (SignalType::Answer, Role::Offerer) => self.on_remote_answer(envelope).await,
            (SignalType::Ice, _) => {
                self.on_remote_candidate(envelope).await;
                Ok(())
            }
            (other, role) => {
                debug!(%role, signal_type = %other, "ignoring envelope not meant for this role");
                Ok(())
            }
        }
    }

    async fn on_remote_offer(&mut self, envelope: Envelope) -> Result<(), NegotiationError> {
        if self.state != NegotiationState::SignalingConnected {
            warn!(state = ?self.state, "unexpected offer, ignoring");
            return Ok(());
        }
        let Some(sdp) = envelope.sdp else {
            warn!("offer without sdp, ignoring");
            return Ok(());
        };

        self.engine
            .set_remote_description(SessionDescription::offer(sdp))
            .await?;
        let answer = self.engine.create_answer().await?;
        self.engine.set_local_description(answer.clone()).await?;
        self.send(Envelope::answer(answer.sdp))?;
        self.state = NegotiationState::DescriptionExchanged;
        debug!("answer sent");
        Ok(())
    }

    async fn on_remote_answer(&mut self, envelope: Envelope) -> Result<(), NegotiationError> {
        if self.state != NegotiationState::SignalingConnected {
            warn!(state = ?self.state, "unexpected answer, ignoring");
            return Ok(());
        }
        let Some(sdp) = envelope.sdp else {
            warn!("answer without sdp, ignoring");
            return Ok(());
        };

        self.engine
            .set_remote_description(SessionDescription::answer(sdp))
            .await?;
        self.state = NegotiationState::DescriptionExchanged;
        debug!("answer applied");
        Ok(())
    }

    /// A rejected remote candidate is not fatal; others may still work.
    async fn on_remote_candidate(&mut self, envelope: Envelope) {
        let Some(candidate) = envelope.candidate else {
            warn!("ICE envelope without candidate, ignoring");
            return;
        };
        match self.engine.add_ice_candidate(IceCandidate(candidate)).await {
            Ok(()) => self.candidates_flowing(),
            Err(e) => warn!(role = %self.role, "failed to add remote candidate: {e}"),
        }
    }

    fn candidates_flowing(&mut self) {
        if self.state == NegotiationState::DescriptionExchanged {
            self.state = NegotiationState::IceExchanging;
        }
    }

    fn send(&self, envelope: Envelope) -> Result<(), NegotiationError> {
        let envelope = envelope.in_room(self.room.clone());
        self.pipe.send(&envelope)?;
        Ok(())
    }
}
