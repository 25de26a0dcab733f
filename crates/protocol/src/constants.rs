use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum size of one file chunk on the direct channel (16 KiB).
///
/// Matches the largest message size every data channel implementation
/// delivers without fragmentation.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Default TCP port for the signaling relay.
pub const DEFAULT_RELAY_PORT: u16 = 8085;

/// WebSocket subprotocol requested by signaling clients.
pub const SIGNALING_SUBPROTOCOL: &str = "json";

/// Room used when an envelope carries no `room` field.
pub const DEFAULT_ROOM: &str = "";

/// Maximum signaling message size in bytes (1 MiB).
///
/// Session descriptions are a few KiB; anything near this limit is garbage.
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// How often the relay pings each signaling client.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(20);

/// Read deadline: a client silent for this long is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// Signaling envelope type identifier.
///
/// Unknown identifiers decode to [`SignalType::Other`] so newer clients
/// can talk to an older relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SignalType {
    RegisterAnswerer,
    Offer,
    Answer,
    IceOfferer,
    IceAnswerer,
    Ice,
    Other(String),
}

impl SignalType {
    /// Returns the wire identifier.
    pub fn as_str(&self) -> &str {
        match self {
            Self::RegisterAnswerer => "registerAnswerer",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceOfferer => "ICE-offerer",
            Self::IceAnswerer => "ICE-answerer",
            Self::Ice => "ICE",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for SignalType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "registerAnswerer" => Self::RegisterAnswerer,
            "offer" => Self::Offer,
            "answer" => Self::Answer,
            "ICE-offerer" => Self::IceOfferer,
            "ICE-answerer" => Self::IceAnswerer,
            "ICE" => Self::Ice,
            _ => Self::Other(s),
        }
    }
}

impl From<SignalType> for String {
    fn from(t: SignalType) -> Self {
        match t {
            SignalType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
