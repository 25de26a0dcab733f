//! Application messages exchanged over the direct channel.
//!
//! Only the transfer header travels as JSON text; file chunks are raw
//! binary messages with no envelope.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Metadata announcing one file transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
}

/// JSON text message on the direct channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelMessage {
    #[serde(rename = "file-metadata")]
    FileMetadata(FileMetadata),
}

impl ChannelMessage {
    pub fn file_metadata(name: impl Into<String>, size: u64) -> Self {
        Self::FileMetadata(FileMetadata {
            name: name.into(),
            size,
        })
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
