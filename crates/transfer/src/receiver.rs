//! Receiver-side reassembly.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use dropline_protocol::{ChannelMessage, FileMetadata};

use crate::progress::{ProgressCallback, ProgressReporter};
use crate::validation::validate_file_name;
use crate::{ChannelEvent, DEFAULT_MAX_FILE_SIZE, TransferError};

/// Receiver limits.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Metadata declaring more than this is refused before allocating.
    pub max_file_size: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// A completely received file. Immutable and cheap to clone.
#[derive(Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    name: String,
    data: Arc<[u8]>,
}

impl ReceivedFile {
    /// The name the sender declared. Not validated; see [`save_to`](Self::save_to).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Writes the file into `dir` under its declared name.
    ///
    /// The name must be a plain file name; anything that could escape `dir`
    /// is refused.
    pub async fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf, TransferError> {
        validate_file_name(&self.name)?;
        let path = dir.as_ref().join(&self.name);
        tokio::fs::write(&path, &self.data).await?;
        info!(path = %path.display(), bytes = self.data.len(), "saved received file");
        Ok(path)
    }
}

impl fmt::Debug for ReceivedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedFile")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish()
    }
}

struct Assembly {
    name: String,
    declared: u64,
    buffer: Vec<u8>,
}

impl Assembly {
    fn seal(self) -> ReceivedFile {
        ReceivedFile {
            name: self.name,
            data: self.buffer.into(),
        }
    }
}

/// Accumulates one transfer at a time.
///
/// Chunks are appended in arrival order; the channel delivers them in
/// order. At most one buffer is held.
pub struct Reassembler {
    config: ReceiverConfig,
    active: Option<Assembly>,
}

impl Reassembler {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    /// Starts a transfer, silently dropping any incomplete one.
    ///
    /// A zero-byte file completes immediately.
    pub fn begin(&mut self, metadata: FileMetadata) -> Result<Option<ReceivedFile>, TransferError> {
        if let Some(prev) = self.active.take() {
            debug!(
                name = %prev.name,
                received = prev.buffer.len(),
                declared = prev.declared,
                "new metadata replaces incomplete transfer"
            );
        }

        let FileMetadata { name, size } = metadata;
        if size > self.config.max_file_size {
            return Err(TransferError::TooLarge {
                name,
                size,
                limit: self.config.max_file_size,
            });
        }

        let capacity = usize::try_from(size).map_err(|_| TransferError::TooLarge {
            name: name.clone(),
            size,
            limit: usize::MAX as u64,
        })?;
        let mut buffer = Vec::new();
        if buffer.try_reserve_exact(capacity).is_err() {
            return Err(TransferError::TooLarge {
                name,
                size,
                limit: self.config.max_file_size,
            });
        }

        let assembly = Assembly {
            name,
            declared: size,
            buffer,
        };
        if size == 0 {
            return Ok(Some(assembly.seal()));
        }
        self.active = Some(assembly);
        Ok(None)
    }

    /// Appends a chunk; returns the file once every declared byte is in.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Option<ReceivedFile>, TransferError> {
        let Some(assembly) = self.active.as_mut() else {
            return Err(TransferError::NoActiveTransfer);
        };

        let received = assembly.buffer.len() as u64 + chunk.len() as u64;
        if received > assembly.declared {
            let Some(assembly) = self.active.take() else {
                return Err(TransferError::NoActiveTransfer);
            };
            return Err(TransferError::Overflow {
                name: assembly.name,
                declared: assembly.declared,
                received,
            });
        }

        assembly.buffer.extend_from_slice(chunk);
        if received < assembly.declared {
            return Ok(None);
        }
        Ok(self.active.take().map(Assembly::seal))
    }

    /// Drops the transfer in progress. Returns whether there was one.
    pub fn abort(&mut self) -> bool {
        self.active.take().is_some()
    }

    pub fn is_receiving(&self) -> bool {
        self.active.is_some()
    }

    /// `(received, declared)` for the transfer in progress.
    pub fn progress(&self) -> Option<(u64, u64)> {
        self.active
            .as_ref()
            .map(|a| (a.buffer.len() as u64, a.declared))
    }
}

type CompletionHandler = Box<dyn FnMut(ReceivedFile) + Send>;

/// Turns channel traffic into completed files.
pub struct FileReceiver {
    reassembler: Reassembler,
    on_complete: CompletionHandler,
    progress_callback: Option<ProgressCallback>,
    progress: Option<ProgressReporter>,
}

impl FileReceiver {
    pub fn new(
        config: ReceiverConfig,
        on_complete: impl FnMut(ReceivedFile) + Send + 'static,
    ) -> Self {
        Self {
            reassembler: Reassembler::new(config),
            on_complete: Box::new(on_complete),
            progress_callback: None,
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn is_receiving(&self) -> bool {
        self.reassembler.is_receiving()
    }

    /// Dispatches one channel event.
    pub fn handle(&mut self, event: ChannelEvent) -> Result<(), TransferError> {
        match event {
            ChannelEvent::Text(text) => self.on_text(&text),
            ChannelEvent::Binary(data) => self.on_binary(&data),
            ChannelEvent::Closed => {
                self.on_closed();
                Ok(())
            }
        }
    }

    pub fn on_text(&mut self, text: &str) -> Result<(), TransferError> {
        let ChannelMessage::FileMetadata(metadata) = ChannelMessage::decode(text)?;
        info!(name = %metadata.name, size = metadata.size, "incoming file");

        self.progress = self
            .progress_callback
            .clone()
            .map(|cb| ProgressReporter::new(&metadata.name, metadata.size, cb));

        match self.reassembler.begin(metadata) {
            Ok(Some(file)) => {
                self.complete(file);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.progress = None;
                Err(e)
            }
        }
    }

    pub fn on_binary(&mut self, chunk: &[u8]) -> Result<(), TransferError> {
        match self.reassembler.push_chunk(chunk) {
            Ok(done) => {
                if let Some(progress) = self.progress.as_mut() {
                    progress.advance(chunk.len() as u64);
                }
                if let Some(file) = done {
                    self.complete(file);
                }
                Ok(())
            }
            Err(e) => {
                warn!("transfer failed: {e}");
                self.progress = None;
                Err(e)
            }
        }
    }

    /// The channel went away; any partial transfer is dropped.
    pub fn on_closed(&mut self) {
        if let Some((received, declared)) = self.reassembler.progress() {
            warn!(received, declared, "channel closed mid-transfer, discarding");
        }
        self.reassembler.abort();
        self.progress = None;
    }

    fn complete(&mut self, file: ReceivedFile) {
        info!(name = %file.name(), bytes = file.len(), "file received");
        self.progress = None;
        (self.on_complete)(file);
    }
}
