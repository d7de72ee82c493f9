use std::fmt;

use flora_caps::CapsError;
use flora_client::ClientError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn client_error(context: &str, err: ClientError) -> CliError {
    let code = match err {
        ClientError::Auth(_) => PERMISSION_DENIED,
        ClientError::InvalidParam(_) => DATA_INVALID,
        ClientError::Connection(_) => TRANSPORT_ERROR,
        ClientError::Timeout => TIMEOUT,
        ClientError::NoTarget(_) => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn caps_error(context: &str, err: CapsError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}
