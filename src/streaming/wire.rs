//! Wire format for published frames
//!
//! # TCP Framing
//!
//! Every frame sent to a subscriber is length-prefixed:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ JSON or MessagePack      │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! - **Length field**: payload size only, network byte order
//! - **Maximum message size**: 1MB (1,048,576 bytes)
//!
//! ## Wire Formats
//!
//! ### JSON (Default)
//! Human-readable, easy to consume from Python or a shell with `jq`.
//!
//! ### MessagePack
//! Compact binary encoding with the same field names, for high event rates.

use crate::core::types::Frame;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Largest payload accepted by [`Serializer::decode_frame`]
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Supported wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// JSON format - human-readable for debugging
    #[default]
    Json,
    /// MessagePack with named fields
    #[serde(rename = "msgpack", alias = "messagepack")]
    MessagePack,
}

/// Serializer that can handle both formats
#[derive(Debug, Clone)]
pub struct Serializer {
    format: WireFormat,
}

impl Serializer {
    /// Create a new serializer for the given format
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Serialize a frame to payload bytes
    pub fn serialize(&self, frame: &Frame) -> Result<Vec<u8>> {
        match self.format {
            WireFormat::Json => Ok(serde_json::to_vec(frame)?),
            WireFormat::MessagePack => Ok(rmp_serde::to_vec_named(frame)?),
        }
    }

    /// Deserialize payload bytes to a frame
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Frame> {
        match self.format {
            WireFormat::Json => Ok(serde_json::from_slice(bytes)?),
            WireFormat::MessagePack => {
                rmp_serde::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Serialize a frame into `buffer` behind its length prefix.
    ///
    /// `buffer` is cleared first so callers can reuse one allocation.
    pub fn encode_frame(&self, frame: &Frame, buffer: &mut Vec<u8>) -> Result<()> {
        let payload = self.serialize(frame)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(Error::Serialization(format!(
                "frame {} encodes to {} bytes, limit {}",
                frame.unique_id,
                payload.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        buffer.clear();
        buffer.reserve(4 + payload.len());
        buffer.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buffer.extend_from_slice(&payload);
        Ok(())
    }

    /// Decode one length-prefixed frame from the start of `bytes`.
    ///
    /// Returns the frame and the number of bytes consumed, or `None` when
    /// `bytes` does not yet hold a complete message.
    pub fn decode_frame(&self, bytes: &[u8]) -> Result<Option<(Frame, usize)>> {
        if bytes.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(Error::InvalidResponse(format!(
                "message length {} exceeds {}",
                len, MAX_MESSAGE_SIZE
            )));
        }
        if bytes.len() < 4 + len {
            return Ok(None);
        }
        let frame = self.deserialize(&bytes[4..4 + len])?;
        Ok(Some((frame, 4 + len)))
    }
}

/// Create a serializer for the given wire format
pub fn create_serializer(format: WireFormat) -> Serializer {
    Serializer::new(format)
}
