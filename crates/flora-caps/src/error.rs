use crate::value::ValueType;

/// Result code for a successful Caps operation.
pub const SUCCESS: i32 = 0;

/// Errors returned by Caps reads, writes and parsing.
///
/// Each variant maps onto a stable numeric result code via [`CapsError::code`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapsError {
    /// Bad argument, or a container that was never written or attached.
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    /// Serialized input is not a well-formed Caps buffer.
    #[error("malformed caps data: {0}")]
    Malformed(String),

    /// The container is being written; it cannot be read.
    #[error("caps is write-only")]
    WriteOnly,

    /// The container is being read; it cannot be written.
    #[error("caps is read-only")]
    ReadOnly,

    /// The next entry has a different type than the one requested.
    #[error("incorrect type: expected {expected}, found {found}")]
    IncorrectType {
        expected: ValueType,
        found: ValueType,
    },

    /// Every entry has already been read.
    #[error("end of object")]
    EndOfObject,
}

impl CapsError {
    /// Numeric result code for this error.
    pub fn code(&self) -> i32 {
        match self {
            CapsError::InvalidParam(_) | CapsError::Malformed(_) => -1,
            CapsError::WriteOnly => -4,
            CapsError::ReadOnly => -5,
            CapsError::IncorrectType { .. } => -6,
            CapsError::EndOfObject => -7,
        }
    }
}

pub type Result<T> = std::result::Result<T, CapsError>;
