use flora_caps::CapsError;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x464c \"FL\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The frame body is not a valid Caps buffer.
    #[error("frame payload is not valid caps: {0}")]
    Caps(#[from] CapsError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

impl From<flora_transport::TransportError> for FrameError {
    fn from(err: flora_transport::TransportError) -> Self {
        use flora_transport::TransportError as T;
        match err {
            T::Io(io) | T::Accept(io) => FrameError::Io(io),
            T::Bind { source, .. } | T::Connect { source, .. } => FrameError::Io(source),
            other => FrameError::Io(std::io::Error::other(other.to_string())),
        }
    }
}
