pub mod channel;
pub mod constants;
pub mod envelope;

// Re-export primary types for convenience.
pub use channel::{ChannelMessage, FileMetadata};
pub use constants::SignalType;
pub use envelope::Envelope;

/// Errors produced while encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not valid UTF-8")]
    InvalidUtf8,
}
