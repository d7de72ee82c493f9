use std::time::Duration;

use flora_frame::FrameConfig;

/// Default receive buffer: 32 KiB.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 32 * 1024;

/// Smallest receive buffer a client will use.
pub const MIN_RECV_BUFFER_SIZE: usize = 4096;

/// Protocol version sent in the AUTH handshake.
pub const PROTOCOL_VERSION: i32 = 1;

/// Client engine configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Largest frame payload accepted or sent, in bytes. Values below
    /// [`MIN_RECV_BUFFER_SIZE`] are raised to it.
    pub recv_buffer_size: usize,
    /// How long to wait for the broker's AUTH_RESULT.
    pub auth_timeout: Duration,
    /// Timeout for each blocking write; `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
    /// Protocol version announced to the broker.
    pub protocol_version: i32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            auth_timeout: Duration::from_secs(5),
            write_timeout: Some(Duration::from_secs(5)),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

impl ClientConfig {
    /// The receive buffer size actually used.
    pub fn effective_recv_buffer_size(&self) -> usize {
        self.recv_buffer_size.max(MIN_RECV_BUFFER_SIZE)
    }

    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.effective_recv_buffer_size(),
            read_timeout: Some(self.auth_timeout),
            write_timeout: self.write_timeout,
        }
    }
}
