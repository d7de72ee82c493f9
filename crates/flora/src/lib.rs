//! flora: a client for the flora message bus.
//!
//! Applications exchange typed [`caps::Caps`] messages through a broker:
//! broadcast posts, topic subscriptions, and requests answered by every
//! subscribed peer.
//!
//! # Crate Structure
//!
//! - [`transport`]: broker URIs and byte-stream transports (UDS, TCP)
//! - [`caps`]: the Caps binary container
//! - [`frame`]: protocol framing and command IDs
//! - [`client`]: the client engine and the reconnecting agent

/// Re-export transport types.
pub mod transport {
    pub use flora_transport::*;
}

/// Re-export the Caps codec.
pub mod caps {
    pub use flora_caps::*;
}

/// Re-export frame types.
pub mod frame {
    pub use flora_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use flora_client::*;
}

pub use flora_caps::Caps;
pub use flora_client::{
    Agent, AgentConfig, Client, ClientCallback, ClientConfig, ClientError, GetResponse, MsgClass,
    Reply, Response,
};
