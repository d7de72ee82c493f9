//! Byte-stream transports for the flora message bus.
//!
//! A broker is addressed by a URI:
//! - `unix:/run/flora.sock` or `unix:///run/flora.sock` (Unix domain socket)
//! - `tcp://127.0.0.1:2517/` (TCP)
//!
//! An optional `#fragment` carries the client's identity tag, which the
//! client engine sends during authentication.
//!
//! This is the lowest layer of flora. Everything else builds on top of the
//! [`IpcStream`] type provided here.

pub mod error;
pub mod stream;
pub mod uri;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::IpcStream;
pub use uri::{BrokerUri, Endpoint};

#[cfg(unix)]
pub use uds::UnixDomainSocket;

/// Open a stream to the broker named by `uri`.
pub fn connect(uri: &BrokerUri) -> Result<IpcStream> {
    match &uri.endpoint {
        #[cfg(unix)]
        Endpoint::Unix(path) => UnixDomainSocket::connect(path),
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(TransportError::UnsupportedScheme("unix".to_string())),
        Endpoint::Tcp { host, port } => IpcStream::connect_tcp(host, *port),
    }
}
