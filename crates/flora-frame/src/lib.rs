//! Length-prefixed framing of flora protocol commands.
//!
//! Every message on the wire is framed with:
//! - A 2-byte magic number ("FL") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 2-byte little-endian command ID
//!
//! The payload is one serialized [`flora_caps::Caps`]. Frames longer than
//! the configured maximum are rejected in both directions.

pub mod codec;
pub mod command;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use command::{command_name, Command};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use async_codec::FloraCodec;
