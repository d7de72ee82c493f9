//! flora message-bus client.
//!
//! A [`Client`] holds one authenticated connection to a broker and offers
//! fire-and-forget posts, topic subscriptions and blocking request/reply
//! with fan-in. Inbound events arrive on a dedicated receive thread through
//! a [`ClientCallback`]. [`Agent`] wraps a client with automatic reconnect
//! and per-topic handlers.
//!
//! Result codes: `Success` 0, [`ClientError::code`] -1 to -5.

pub mod agent;
pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod message;
pub mod pending;
pub mod subscription;

pub use agent::{Agent, AgentConfig, MethodHandler, PostHandler};
pub use callback::{ClientCallback, NoopCallback};
pub use client::{Client, ConnectionState, GetResponse};
pub use config::{ClientConfig, DEFAULT_RECV_BUFFER_SIZE, MIN_RECV_BUFFER_SIZE, PROTOCOL_VERSION};
pub use error::{ClientError, Result, SUCCESS};
pub use message::{Message, MsgClass, Reply, Response};
