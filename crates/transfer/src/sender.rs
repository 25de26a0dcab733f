use futures_util::{StreamExt, stream};
use tracing::{debug, info};

use dropline_protocol::ChannelMessage;
use dropline_protocol::constants::CHUNK_SIZE;

use crate::progress::{ProgressCallback, ProgressReporter};
use crate::source::ChunkSource;
use crate::{DEFAULT_MAX_IN_FLIGHT, DataChannel, TransferError};

/// Sender tuning.
#[derive(Clone)]
pub struct SendOptions {
    /// Largest binary message, in bytes. Capped at [`CHUNK_SIZE`].
    pub chunk_size: usize,
    /// Chunk reads prepared ahead of the one being sent.
    pub max_in_flight: usize,
    pub progress: Option<ProgressCallback>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            progress: None,
        }
    }
}

/// `(offset, len)` of every chunk of a `size`-byte file, in order.
pub fn chunk_ranges(size: u64, chunk_size: usize) -> impl Iterator<Item = (u64, usize)> {
    let step = chunk_size.max(1);
    (0..size)
        .step_by(step)
        .map(move |offset| (offset, (size - offset).min(step as u64) as usize))
}

/// Sends `source` over `channel` as `name`.
///
/// Nothing is sent unless the channel is open. Reads run ahead of the
/// sends, but chunks always leave in offset order. Returns the number of
/// payload bytes sent.
pub async fn send_file<C, S>(
    channel: &C,
    name: &str,
    source: &S,
    options: &SendOptions,
) -> Result<u64, TransferError>
where
    C: DataChannel + ?Sized,
    S: ChunkSource + ?Sized,
{
    if !channel.is_open() {
        return Err(TransferError::ChannelClosed);
    }

    let size = source.len();
    let metadata = ChannelMessage::file_metadata(name, size).encode()?;
    channel.send_text(metadata).await?;
    info!(name, size, "sending file");

    let mut progress = options
        .progress
        .clone()
        .map(|callback| ProgressReporter::new(name, size, callback));

    let chunk_size = options.chunk_size.clamp(1, CHUNK_SIZE);
    let mut chunks = stream::iter(chunk_ranges(size, chunk_size))
        .map(|(offset, len)| source.read_at(offset, len))
        .buffered(options.max_in_flight.max(1));

    let mut sent = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        let len = chunk.len() as u64;
        channel.send_binary(chunk).await?;
        sent += len;
        if let Some(progress) = progress.as_mut() {
            progress.advance(len);
        }
    }

    debug!(name, sent, "file sent");
    Ok(sent)
}
