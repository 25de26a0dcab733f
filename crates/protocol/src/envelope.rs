use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;
use crate::constants::{DEFAULT_ROOM, SignalType};

/// Envelope for all signaling communication.
///
/// Session descriptions and candidates are opaque to everything except the
/// connection engine, so they are carried as raw JSON values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Value>,
}

impl Envelope {
    fn bare(signal_type: SignalType) -> Self {
        Self {
            signal_type,
            room: None,
            sdp: None,
            candidate: None,
        }
    }

    /// `{type: "registerAnswerer"}`
    pub fn register_answerer() -> Self {
        Self::bare(SignalType::RegisterAnswerer)
    }

    /// `{type: "offer", sdp}`
    pub fn offer(sdp: Value) -> Self {
        Self {
            sdp: Some(sdp),
            ..Self::bare(SignalType::Offer)
        }
    }

    /// `{type: "answer", sdp}`
    pub fn answer(sdp: Value) -> Self {
        Self {
            sdp: Some(sdp),
            ..Self::bare(SignalType::Answer)
        }
    }

    /// `{type: "ICE-offerer", candidate}`
    pub fn ice_offerer(candidate: Value) -> Self {
        Self::with_candidate(SignalType::IceOfferer, candidate)
    }

    /// `{type: "ICE-answerer", candidate}`
    pub fn ice_answerer(candidate: Value) -> Self {
        Self::with_candidate(SignalType::IceAnswerer, candidate)
    }

    /// `{type: "ICE", candidate}`; only ever produced by the relay.
    pub fn ice(candidate: Value) -> Self {
        Self::with_candidate(SignalType::Ice, candidate)
    }

    fn with_candidate(signal_type: SignalType, candidate: Value) -> Self {
        Self {
            candidate: Some(candidate),
            ..Self::bare(signal_type)
        }
    }

    /// Scopes the envelope to a room.
    pub fn in_room(mut self, room: Option<String>) -> Self {
        self.room = room;
        self
    }

    /// Room key used by the relay registry.
    pub fn room_key(&self) -> &str {
        self.room.as_deref().unwrap_or(DEFAULT_ROOM)
    }

    /// Decodes an envelope from a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decodes an envelope from a binary frame holding UTF-8 JSON.
    pub fn decode_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(data).map_err(|_| ProtocolError::InvalidUtf8)?;
        Self::decode(text)
    }

    /// Encodes the envelope as a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
