use flora_caps::CapsError;
use flora_frame::FrameError;
use flora_transport::TransportError;

/// Result code for a successful client operation.
pub const SUCCESS: i32 = 0;

/// Errors returned by client operations.
///
/// Each variant maps onto a stable numeric result code via [`ClientError::code`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The broker rejected the handshake, or did not answer in time.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Bad argument, or an operation not allowed in the current state.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Not connected, or the connection was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// The deadline elapsed before the operation completed.
    #[error("timed out")]
    Timeout,

    /// Nobody is subscribed to the requested topic.
    #[error("no target for '{0}'")]
    NoTarget(String),
}

impl ClientError {
    /// Numeric result code for this error.
    pub fn code(&self) -> i32 {
        match self {
            ClientError::Auth(_) => -1,
            ClientError::InvalidParam(_) => -2,
            ClientError::Connection(_) => -3,
            ClientError::Timeout => -4,
            ClientError::NoTarget(_) => -5,
        }
    }

    pub(crate) fn not_connected() -> Self {
        ClientError::Connection("not connected".to_string())
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidUri { .. }
            | TransportError::UnsupportedScheme(_)
            | TransportError::PathTooLong { .. } => ClientError::InvalidParam(err.to_string()),
            other => ClientError::Connection(other.to_string()),
        }
    }
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::PayloadTooLarge { size, max } => ClientError::InvalidParam(format!(
                "message of {size} bytes exceeds the {max} byte buffer"
            )),
            FrameError::Caps(caps) => caps.into(),
            other => ClientError::Connection(other.to_string()),
        }
    }
}

impl From<CapsError> for ClientError {
    fn from(err: CapsError) -> Self {
        ClientError::InvalidParam(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
