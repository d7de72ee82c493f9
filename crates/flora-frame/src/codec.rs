use bytes::{Buf, BufMut, Bytes, BytesMut};
use flora_caps::Caps;

use crate::command::{command_name, Command};
use crate::error::{FrameError, Result};

/// Frame header: magic (2) + length (4) + command (2) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "FL" (0x46 0x4c).
pub const MAGIC: [u8; 2] = [b'F', b'L'];

/// Default maximum payload size: 32 KiB, the client's default receive buffer.
pub const DEFAULT_MAX_PAYLOAD: usize = 32 * 1024;

/// A framed protocol command.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Command ID, see [`crate::command`].
    pub command: u16,
    /// Serialized Caps body.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(command: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// Serialize `body` as the payload of a `command` frame.
    pub fn from_caps(command: u16, body: &Caps) -> Result<Self> {
        Ok(Self::new(command, body.serialize()?))
    }

    /// Decoded command, if the ID is known.
    pub fn kind(&self) -> Option<Command> {
        Command::from_id(self.command)
    }

    pub fn command_name(&self) -> &'static str {
        command_name(self.command)
    }

    /// Parse the payload. The returned Caps shares the frame's buffer.
    pub fn caps(&self) -> Result<Caps> {
        Ok(Caps::parse_bytes(self.payload.clone())?)
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────┬─────────────────────┐
/// │ Magic (2B)   │ Length    │ Command  │ Payload             │
/// │ 0x46 0x4c    │ (4B LE)   │ (2B LE)  │ (serialized Caps)   │
/// │ "FL"         │           │          │                     │
/// └──────────────┴───────────┴──────────┴─────────────────────┘
/// ```
pub fn encode_frame(command: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_u16_le(command);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. An oversized
/// length is rejected as soon as the header arrives.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    let command = u16::from_le_bytes([src[6], src[7]]);

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { command, payload }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes, both directions. Default: 32 KiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
