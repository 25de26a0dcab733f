//! Chunked file transfer over a direct data channel.
//!
//! The sender emits one `file-metadata` text message followed by the file's
//! bytes as binary messages of at most [`CHUNK_SIZE`] bytes, in offset
//! order. The receiver accumulates chunks into a buffer sized from the
//! metadata and hands out a [`ReceivedFile`] once every byte has arrived.
//! The channel is assumed reliable and ordered.

mod progress;
mod receiver;
mod sender;
mod source;
mod validation;

use std::future::Future;
use std::pin::Pin;

pub use dropline_protocol::constants::CHUNK_SIZE;
pub use progress::{ProgressCallback, SpeedCalculator, TransferProgress};
pub use receiver::{FileReceiver, ReceivedFile, Reassembler, ReceiverConfig};
pub use sender::{SendOptions, chunk_ranges, send_file};
pub use source::{ChunkSource, FileSource, SourceFuture};
pub use validation::validate_file_name;

/// Largest file a receiver accepts by default: 2 GiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Number of chunk reads the sender keeps in flight by default.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// A boxed future returned by [`DataChannel`] sends.
pub type ChannelFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + 'a>>;

/// An open direct channel between the two peers.
pub trait DataChannel: Send + Sync {
    fn is_open(&self) -> bool;

    fn send_text(&self, text: String) -> ChannelFuture<'_>;

    fn send_binary(&self, data: Vec<u8>) -> ChannelFuture<'_>;
}

/// What the receiving side of a channel observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Text(String),
    Binary(Vec<u8>),
    Closed,
}

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] dropline_protocol::ProtocolError),

    #[error("data channel is not open")]
    ChannelClosed,

    #[error("chunk received with no transfer in progress")]
    NoActiveTransfer,

    #[error("{name}: received {received} bytes, metadata declared {declared}")]
    Overflow {
        name: String,
        declared: u64,
        received: u64,
    },

    #[error("{name}: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { name: String, size: u64, limit: u64 },

    #[error("invalid file name: {0}")]
    InvalidName(String),
}
